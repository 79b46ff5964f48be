use std::fmt::{self, Display};

/// Errors produced by model constructors and parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    UnknownRole(String),
    UnknownStatus(String),
    InvalidId(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownRole(raw) => write!(f, "unknown role: {raw}"),
            ModelError::UnknownStatus(raw) => {
                write!(f, "unknown participant status: {raw}")
            }
            ModelError::InvalidId(raw) => {
                write!(f, "invalid participant id: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
