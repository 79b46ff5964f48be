//! Pause between decisions so the operator can read the outcome.

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

/// Single-slot timer. While armed, decoded input is ignored.
#[derive(Debug, Clone)]
pub struct ScanCooldown {
    period: Duration,
    until: Option<Instant>,
}

impl ScanCooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            until: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start (or restart) the cooldown from now.
    pub fn arm(&mut self) {
        self.until = Some(Instant::now() + self.period);
    }

    pub fn is_cooling(&self) -> bool {
        self.until.is_some_and(|until| Instant::now() < until)
    }

    pub fn remaining(&self) -> Duration {
        self.until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    /// Resolves when the cooldown ends; immediately if not armed.
    pub async fn elapsed(&self) {
        if let Some(until) = self.until {
            tokio::time::sleep_until(until).await;
        }
    }

    pub fn disarm(&mut self) {
        self.until = None;
    }
}

impl Default for ScanCooldown {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
