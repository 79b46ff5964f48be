use std::{
    fmt,
    path::{Path, PathBuf},
};

use cacache::Integrity;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::{CheckinError, Result};

const ENTRY_SCHEMA_VERSION: u32 = 1;

/// Entry files live in their own directory; `cacache::clear_sync` only
/// removes directories under the root.
const ENTRY_DIR: &str = "entries";

/// One logical slice of persisted terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Last full participant list, as loaded from the authority and
    /// advanced by local check-ins.
    Roster,
    /// Ids accepted at this terminal, with acceptance time.
    Scanned,
    /// Ids checked in locally but not yet acknowledged remotely.
    Pending,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Roster, Bucket::Scanned, Bucket::Pending];

    /// Stable bucket name used in logs.
    pub fn key(&self) -> &'static str {
        match self {
            Bucket::Roster => "checkin/v1/roster",
            Bucket::Scanned => "checkin/v1/scanned",
            Bucket::Pending => "checkin/v1/pending",
        }
    }

    /// Entry file naming the blob that currently holds the bucket. Versioned
    /// so a format change can live next to the old entries instead of
    /// misreading them.
    fn entry_file(&self) -> &'static str {
        match self {
            Bucket::Roster => "roster.v1.json",
            Bucket::Scanned => "scanned.v1.json",
            Bucket::Pending => "pending.v1.json",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Root directory for the terminal's state cache.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StateRoot(PathBuf);

impl StateRoot {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    fn entry_dir(&self) -> PathBuf {
        self.0.join(ENTRY_DIR)
    }

    fn entry_path(&self, bucket: Bucket) -> PathBuf {
        self.entry_dir().join(bucket.entry_file())
    }
}

impl fmt::Debug for StateRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateRoot").field(&self.0).finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketEntryFile {
    schema_version: u32,
    integrity: String,
    byte_len: u64,
}

/// Handle over the persisted buckets.
///
/// Bucket contents are stored in `cacache` hash-only mode; a small entry
/// file per bucket records the integrity of the live blob and is replaced
/// atomically. A save therefore leaves exactly one blob per distinct bucket
/// value on disk. Cloning is cheap; every clone talks to the same directory.
/// All I/O is blocking so a load-modify-save sequence never yields to the
/// scheduler halfway through.
#[derive(Clone, Debug)]
pub struct StateStore {
    root: StateRoot,
}

impl StateStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = StateRoot::new(root.into());
        std::fs::create_dir_all(root.entry_dir())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &StateRoot {
        &self.root
    }

    /// Read a bucket. `Ok(None)` means the bucket has never been written.
    pub fn load<T: DeserializeOwned>(&self, bucket: Bucket) -> Result<Option<T>> {
        let Some(integrity) = self.read_entry(bucket)? else {
            return Ok(None);
        };

        let bytes = cacache::read_hash_sync(self.root.as_path(), &integrity)
            .map_err(|err| map_cacache_error("read", bucket, err))?;

        let value = serde_json::from_slice(&bytes)?;
        Ok(Some(value))
    }

    /// Like [`StateStore::load`], but a corrupt bucket is logged and treated
    /// as absent instead of failing startup.
    pub fn load_or_absent<T: DeserializeOwned>(&self, bucket: Bucket) -> Option<T> {
        match self.load(bucket) {
            Ok(value) => value,
            Err(err) => {
                warn!(%bucket, error = %err, "discarding unreadable state bucket");
                None
            }
        }
    }

    /// Replace a bucket's contents as a unit. The blob it replaces is
    /// removed unless another bucket still points at the same bytes.
    pub fn save<T: Serialize>(&self, bucket: Bucket, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let previous = self.integrity(bucket);

        let integrity = cacache::write_hash_sync(self.root.as_path(), &bytes)
            .map_err(|err| map_cacache_error("write", bucket, err))?;

        let entry = BucketEntryFile {
            schema_version: ENTRY_SCHEMA_VERSION,
            integrity: integrity.to_string(),
            byte_len: bytes.len() as u64,
        };
        write_atomic(&self.root.entry_path(bucket), &serde_json::to_vec(&entry)?)?;

        if let Some(previous) = previous
            && previous != integrity
        {
            self.release_blob(bucket, &previous);
        }

        debug!(%bucket, bytes = bytes.len(), %integrity, "state bucket saved");
        Ok(())
    }

    pub fn clear_bucket(&self, bucket: Bucket) -> Result<()> {
        let previous = self.integrity(bucket);
        match std::fs::remove_file(self.root.entry_path(bucket)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        if let Some(previous) = previous {
            self.release_blob(bucket, &previous);
        }
        Ok(())
    }

    /// Operator reset: drop every bucket. The next startup behaves like a
    /// first run.
    pub fn reset(&self) -> Result<()> {
        cacache::clear_sync(self.root.as_path()).map_err(|err| {
            CheckinError::Storage(format!("cacache clear failed: {err}"))
        })?;
        std::fs::create_dir_all(self.root.entry_dir())?;
        Ok(())
    }

    /// Content hash the bucket currently points at, if it has been written.
    pub fn integrity(&self, bucket: Bucket) -> Option<Integrity> {
        self.read_entry(bucket).ok().flatten()
    }

    fn read_entry(&self, bucket: Bucket) -> Result<Option<Integrity>> {
        let bytes = match std::fs::read(self.root.entry_path(bucket)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let entry: BucketEntryFile = serde_json::from_slice(&bytes)?;
        if entry.schema_version != ENTRY_SCHEMA_VERSION {
            return Err(CheckinError::Storage(format!(
                "{bucket}: unsupported entry schema {}",
                entry.schema_version
            )));
        }
        let integrity = entry.integrity.parse::<Integrity>().map_err(|err| {
            CheckinError::Storage(format!("{bucket}: bad integrity in entry file ({err})"))
        })?;
        Ok(Some(integrity))
    }

    /// Remove a blob no bucket points at any more. Identical values in two
    /// buckets share a blob, so the other buckets are consulted first.
    fn release_blob(&self, released_by: Bucket, integrity: &Integrity) {
        let shared = Bucket::ALL
            .into_iter()
            .filter(|other| *other != released_by)
            .any(|other| self.integrity(other).as_ref() == Some(integrity));
        if shared {
            return;
        }

        if let Err(err) = cacache::remove_hash_sync(self.root.as_path(), integrity) {
            warn!(bucket = %released_by, %integrity, error = %err, "failed to remove stale state blob");
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|v| v.to_str()).unwrap_or("entry")
    ));
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(tmp_path, path)?;
    Ok(())
}

fn map_cacache_error(op: &str, bucket: Bucket, err: cacache::Error) -> CheckinError {
    match err {
        cacache::Error::EntryNotFound(_, _) => {
            CheckinError::Storage(format!("{op} {bucket}: blob not found"))
        }
        cacache::Error::IntegrityError(err) => CheckinError::Storage(format!(
            "{op} {bucket}: integrity check failed ({err})"
        )),
        cacache::Error::SizeMismatch(wanted, actual) => CheckinError::Storage(
            format!("{op} {bucket}: size mismatch, wanted={wanted}, actual={actual}"),
        ),
        cacache::Error::IoError(_, msg) => {
            CheckinError::Storage(format!("{op} {bucket}: I/O error: {msg}"))
        }
        cacache::Error::SerdeError(_, msg) => {
            CheckinError::Storage(format!("{op} {bucket}: index serde error: {msg}"))
        }
    }
}
