//! # Check-in Core
//!
//! Engine for an event check-in terminal that keeps admitting people while
//! the network comes and goes.
//!
//! ## Overview
//!
//! - **Roster cache**: local mirror of the participant roster, refreshed from
//!   the authority and persisted for offline starts
//! - **Scan validation**: ordered checks turning a decoded badge string into
//!   a [`ScanDecision`]
//! - **Pending sync**: durable queue of local check-ins the authority has not
//!   acknowledged
//! - **Dispatch**: immediate and periodic delivery of pending check-ins,
//!   gated on connectivity
//! - **Stats**: checked-in and pending counters for display
//!
//! ## Architecture
//!
//! - [`engine`]: the [`CheckinEngine`] façade owning all local state
//! - [`state`]: `cacache`-backed bucket store
//! - [`remote`]: the [`RosterAuthority`] trait and its HTTP implementation
//! - [`dispatch`]: [`SyncDispatcher`], producing reports the engine applies
//! - `testing` (feature `testing`): an in-memory authority for tests
//!
//! ## Examples
//!
//! ```no_run
//! use checkin_core::{
//!     CheckinEngine, HttpRosterAuthority, RemoteEndpoints, ScanDecision, StateStore,
//! };
//!
//! async fn admit_one(endpoints: RemoteEndpoints) -> checkin_core::Result<()> {
//!     let store = StateStore::open("./checkin-state")?;
//!     let authority = HttpRosterAuthority::new(endpoints)?;
//!
//!     let mut engine = CheckinEngine::open(store);
//!     engine.load_roster(&authority).await?;
//!
//!     if let ScanDecision::Accepted(participant) = engine.process_scan("{id:42, status: approved}")? {
//!         println!("Welcome {}!", participant.name);
//!     }
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]

/// Online/offline flag and reachability probing
pub mod connectivity;

/// Post-decision input cooldown
pub mod cooldown;

/// Pending check-in delivery
pub mod dispatch;

/// The engine façade
pub mod engine;

/// Error types
pub mod error;

/// Accepted scans
pub mod ledger;

/// Badge payload parsing
pub mod payload;

/// Pending-sync queue
pub mod queue;

/// Roster authority abstraction and HTTP client
pub mod remote;

/// Local roster mirror
pub mod roster;

/// Persistent bucket store
pub mod state;

pub mod stats;

/// In-memory roster authority and fixtures
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub mod validator;

pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use cooldown::ScanCooldown;
pub use dispatch::{
    DispatchEvent, DispatchOutcome, DispatchPolicy, DispatchReport, DispatchTrigger, SweepSummary,
    SyncDispatcher,
};
pub use engine::{CheckinEngine, InvariantViolation};
pub use error::{CheckinError, Result};
pub use payload::{PayloadError, ScanPayload};
pub use remote::{
    HttpRosterAuthority, MarkAttendedMethod, RemoteEndpoints, RemoteError, RosterAuthority,
};
pub use roster::{RosterCache, RosterLoad, RosterSource};
pub use state::{Bucket, StateStore};
pub use stats::CheckinStats;
pub use validator::{CheckedInVia, ScanDecision, ScanRejection};
