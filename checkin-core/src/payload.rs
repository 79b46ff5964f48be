//! Decoded-payload grammar.
//!
//! Badges encode `id : <digits>` and, optionally, `status : <token>`
//! anywhere in the decoded text, e.g. `"id : 1, status : approved"`.
//! Whitespace around the colon is free; field order is free; anything
//! else in the text is ignored.

use checkin_model::ParticipantId;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static ID_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"id\s*:\s*([0-9]+)").expect("id field regex should compile"));

static STATUS_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"status\s*:\s*([A-Za-z0-9_-]+)")
        .expect("status field regex should compile")
});

/// The status token a badge uses to assert approval on its own.
pub const APPROVED_TOKEN: &str = "approved";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload has no `id :` field")]
    MissingId,

    #[error("participant id `{0}` does not fit in 64 bits")]
    IdOutOfRange(String),
}

/// Typed result of parsing one decoded string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPayload {
    pub id: ParticipantId,
    pub status: Option<String>,
}

impl ScanPayload {
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let digits = ID_FIELD
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .ok_or(PayloadError::MissingId)?
            .as_str();

        let id = digits
            .parse::<u64>()
            .map(ParticipantId::new)
            .map_err(|_| PayloadError::IdOutOfRange(digits.to_string()))?;

        let status = STATUS_FIELD
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        Ok(Self { id, status })
    }

    /// True when the badge itself carries the literal `approved` token.
    pub fn asserts_approval(&self) -> bool {
        self.status.as_deref() == Some(APPROVED_TOKEN)
    }
}

impl std::str::FromStr for ScanPayload {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
