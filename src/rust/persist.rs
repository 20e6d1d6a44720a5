//! Crash-safe file writes and per-path exclusive locks shared by the store and
//! the artifact manager. Locks come in two layers: an in-process mutex per
//! path and an OS file lock on a sidecar file for other processes.

use std::collections::HashMap;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fd_lock::RwLock;
use lazy_static::lazy_static;
use tempfile::NamedTempFile;

lazy_static! {
    static ref PATH_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

/// Returns the lock guarding `path`. Every handle on the same path in this
/// process receives the same mutex.
pub(crate) fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    // A poisoned registry only means another thread panicked while inserting.
    let mut locks = PATH_LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(key).or_default())
}

/// Opens the sidecar `<path>.lock` file, creating it if needed. Holding its
/// write guard excludes writers in other processes; [`path_lock`] only
/// covers threads of this one.
pub(crate) fn file_lock(path: &Path) -> io::Result<RwLock<File>> {
    let mut lock_name = path.as_os_str().to_owned();
    lock_name.push(".lock");
    let lock_path = PathBuf::from(lock_name);
    if let Some(dir) = lock_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    Ok(RwLock::new(file))
}

/// Writes `bytes` to a temporary file beside `path` and renames it into place,
/// so readers observe either the old contents or the new ones.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    log::debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}
