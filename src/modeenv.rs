//! The persisted mode environment ("modeenv") and its store.
//!
//! The modeenv is a single JSON record holding the current/try base and the
//! set of kernels the system trusts. It is only ever replaced atomically, so a
//! reader sees either the old or the new record, never a torn one.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::types::BootStatus;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no modeenv at {0}")]
    NotFound(PathBuf),
    #[error("I/O error during '{operation}' on {path}: {source}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("modeenv is malformed: {0}")]
    Malformed(String),
    #[error("modeenv (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io(source: io::Error, operation: &'static str, path: &Path) -> Self {
        StoreError::Io { path: path.to_path_buf(), operation, source }
    }
}

/// The persisted record.
///
/// `try_base` is non-empty exactly when `base_status` is `Try` or `Trying`.
/// Keys this crate does not own are carried in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Modeenv {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub try_base: String,
    #[serde(default)]
    pub base_status: BootStatus,
    #[serde(default)]
    pub current_kernels: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Modeenv {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, StoreError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Appends `filename` to `current_kernels` unless already present.
    /// Returns whether the list changed.
    pub fn trust_kernel(&mut self, filename: &str) -> bool {
        if self.current_kernels.iter().any(|k| k == filename) {
            return false;
        }
        self.current_kernels.push(filename.to_string());
        true
    }

    pub fn trusts_kernel(&self, filename: &str) -> bool {
        self.current_kernels.iter().any(|k| k == filename)
    }
}

/// Where the modeenv lives. Implementations must make `write` atomic.
pub trait ModeenvStore: Send + Sync + std::fmt::Debug {
    fn read(&self) -> Result<Modeenv, StoreError>;
    fn write(&self, modeenv: &Modeenv) -> Result<(), StoreError>;
}

/// JSON file, replaced through a temp file in the same directory.
#[derive(Debug, Clone)]
pub struct FileModeenvStore {
    path: PathBuf,
}

impl FileModeenvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModeenvStore for FileModeenvStore {
    fn read(&self) -> Result<Modeenv, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()))
            }
            Err(err) => return Err(StoreError::io(err, "read", &self.path)),
        };
        Modeenv::from_slice(&bytes)
    }

    fn write(&self, modeenv: &Modeenv) -> Result<(), StoreError> {
        let payload = modeenv.to_vec()?;
        atomic_write(&self.path, &payload)
    }
}

/// Writes `contents` to a temp file next to `path`, syncs it, renames it over
/// `path` and syncs the directory so the rename itself survives power loss.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::io(e, "create_dir_all", parent))?;

    let mut temp_file =
        NamedTempFile::new_in(parent).map_err(|e| StoreError::io(e, "create_temp_file", parent))?;
    temp_file
        .write_all(contents)
        .map_err(|e| StoreError::io(e, "write_temp_file", temp_file.path()))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| StoreError::io(e, "sync_temp_file", path))?;
    temp_file.persist(path).map_err(|e| StoreError::io(e.error, "persist_temp_file", path))?;
    sync_dir(parent).map_err(|e| StoreError::io(e, "sync_dir", parent))
}

/// Flushes directory entries (renames, new links) in `dir` to disk.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

// --- Load-once cache -------------------------------------------------------

#[derive(Debug, Clone)]
struct Tracked {
    working: Modeenv,
    // What is known to be on disk, used to skip no-op writes.
    persisted: Modeenv,
}

/// Reads the modeenv at most once and writes it back only when the in-memory
/// copy differs from what was last read or written.
///
/// Both boot targets compose one of these; a commit plan takes over whichever
/// was loaded first so kernel and base changes land in a single write.
#[derive(Debug, Clone)]
pub struct ModeenvCache {
    store: Arc<dyn ModeenvStore>,
    state: Option<Tracked>,
}

impl ModeenvCache {
    pub fn new(store: Arc<dyn ModeenvStore>) -> Self {
        Self { store, state: None }
    }

    /// Loads on first call, then returns the cached working copy.
    pub fn load(&mut self) -> Result<&mut Modeenv, StoreError> {
        let tracked = match self.state {
            Some(ref mut tracked) => tracked,
            None => {
                let record = self.store.read()?;
                tracing::debug!(kernels = record.current_kernels.len(), base = %record.base, "loaded modeenv");
                self.state.insert(Tracked { working: record.clone(), persisted: record })
            }
        };
        Ok(&mut tracked.working)
    }

    /// Persists the working copy if it changed. Returns whether a write was
    /// issued.
    pub fn write_if_changed(&mut self) -> Result<bool, StoreError> {
        let Some(tracked) = self.state.as_mut() else {
            return Ok(false);
        };
        if tracked.working == tracked.persisted {
            return Ok(false);
        }
        self.store.write(&tracked.working)?;
        tracked.persisted = tracked.working.clone();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_survive_a_rewrite() {
        let raw = br#"{"mode":"run","base":"core20_1.snap","base_status":"","current_kernels":["pc-kernel_1.snap"]}"#;
        let mut m = Modeenv::from_slice(raw).unwrap();
        assert_eq!(m.base_status, BootStatus::Default);
        assert_eq!(m.extra.get("mode"), Some(&serde_json::Value::String("run".into())));

        m.base = "core20_2.snap".into();
        let again = Modeenv::from_slice(&m.to_vec().unwrap()).unwrap();
        assert_eq!(again.extra, m.extra);
        assert_eq!(again.base, "core20_2.snap");
    }

    #[test]
    fn rejects_unknown_base_status() {
        let raw = br#"{"base":"core20_1.snap","base_status":"maybe"}"#;
        assert!(matches!(Modeenv::from_slice(raw), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn trust_kernel_is_an_ordered_set() {
        let mut m = Modeenv::default();
        assert!(m.trust_kernel("pc-kernel_1.snap"));
        assert!(m.trust_kernel("pc-kernel_2.snap"));
        assert!(!m.trust_kernel("pc-kernel_1.snap"));
        assert_eq!(m.current_kernels, vec!["pc-kernel_1.snap", "pc-kernel_2.snap"]);
    }

    #[test]
    fn file_store_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModeenvStore::new(dir.path().join("nested").join("modeenv.json"));
        assert!(matches!(store.read(), Err(StoreError::NotFound(_))));

        let m = Modeenv {
            base: "core20_1.snap".into(),
            current_kernels: vec!["pc-kernel_1.snap".into()],
            ..Modeenv::default()
        };
        store.write(&m).unwrap();
        assert_eq!(store.read().unwrap(), m);
        // Only the record itself remains, the temp file was renamed over it.
        let entries = fs::read_dir(store.path().parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_reports_unsyncable_parent() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).unwrap();
        assert!(sync_dir(&dir.path().join("missing")).is_err());

        // A parent that is a file cannot hold the record.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let err = atomic_write(&blocker.join("modeenv.json"), b"{}").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "unexpected error: {err}");
    }
}
