//! Persisted local state.
//!
//! Everything the terminal remembers across restarts lives in one `cacache`
//! directory, split into three independently loadable buckets. Bucket
//! absence (never written, or wiped by an operator reset) is reported
//! separately from an empty bucket so callers can tell "first run" from
//! "nothing pending".

pub mod store;

pub use store::*;
