//! Core data model definitions shared across the check-in crates.
#![allow(missing_docs)]

pub mod error;
pub mod ids;
pub mod participant;
pub mod scan;

pub use error::{ModelError, Result as ModelResult};
pub use ids::ParticipantId;
pub use participant::{Participant, ParticipantStatus, Role};
pub use scan::ScanRecord;
