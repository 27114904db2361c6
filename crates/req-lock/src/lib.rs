//! Atomic file store (spec C1): locked JSON reads/writes with write-to-
//! tempfile-then-rename semantics.
//!
//! Uses raw `libc::flock` directly rather than an RAII lock wrapper; the
//! shared-lock-read / exclusive-lock-write-then-atomic-rename sequence
//! mirrors the original `state_storage.py` (`fcntl.flock` + `os.fsync` +
//! `Path.rename()`) exactly, since that is the component the on-disk
//! invariants were distilled from.
//!
//! Every failure path here returns the caller's default and logs a warning;
//! nothing panics and nothing propagates past this module.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Read and deserialize `path` under a shared advisory lock.
///
/// Missing file, lock failure, or corrupt JSON all yield `T::default()`.
/// Callers that need to distinguish "missing" from "corrupt" (to implement
/// the corrupt-state recovery dance) should use [`read_raw_locked`] instead.
pub fn read_json_locked<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_raw_locked(path) {
        Some(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "corrupt state file, using default");
            T::default()
        }),
        None => T::default(),
    }
}

/// Read the raw file contents under a shared advisory lock. `None` means
/// "treat as absent" (missing file or I/O error); the caller decides what
/// that means for parsing.
pub fn read_raw_locked(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is owned by `file`, live for the duration of this call.
    unsafe {
        libc::flock(fd, libc::LOCK_SH);
    }
    let contents = fs::read_to_string(path).ok();
    unsafe {
        libc::flock(fd, libc::LOCK_UN);
    }
    contents
}

/// Serialize `value` and write it to `path` atomically: lock a temp file in
/// the same directory, write, `fsync`, unlock, then rename over `path`.
///
/// On any failure the temp file is cleaned up and the error is returned to
/// the caller, which is expected to log and continue (never propagate).
pub fn write_json_locked<T>(path: &Path, value: &T) -> anyhow::Result<()>
where
    T: Serialize,
{
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    let fd = tmp.as_file().as_raw_fd();
    // SAFETY: `fd` is owned by `tmp`, live for the duration of this call.
    unsafe {
        libc::flock(fd, libc::LOCK_EX);
    }

    let result = (|| -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        let mut file = tmp.as_file();
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        Ok(())
    })();

    unsafe {
        libc::flock(fd, libc::LOCK_UN);
    }

    result?;
    tmp.persist(path)?;
    Ok(())
}

/// Rename a corrupt state file aside (`<path>.corrupt`) so a fresh document
/// can be written without losing the evidence. Best-effort: failures are
/// logged, never propagated.
pub fn quarantine_corrupt(path: &Path) {
    let corrupt = path.with_extension("corrupt");
    if let Err(e) = fs::rename(path, &corrupt) {
        tracing::warn!(path = %path.display(), error = %e, "failed to quarantine corrupt state file");
    } else {
        tracing::warn!(path = %path.display(), quarantined_to = %corrupt.display(), "quarantined corrupt state file");
    }
}

/// Exclusive, non-blocking inter-process mutex used for short critical
/// sections that aren't a whole-document read/write (e.g. CLI mutual
/// exclusion). Owning the open `File` is enough; `Drop` releases via
/// `LOCK_UN`.
pub struct ExclusiveGuard {
    file: File,
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is owned by `self.file`.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

/// Try to acquire an exclusive, non-blocking lock on `path` (created if
/// absent). `None` means another process already holds it.
pub fn try_exclusive(path: &Path) -> anyhow::Result<Option<ExclusiveGuard>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is owned by `file`.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        Ok(Some(ExclusiveGuard { file }))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn missing_file_reads_as_default() {
        let dir = tempdir().unwrap();
        let doc: Doc = read_json_locked(&dir.path().join("nope.json"));
        assert_eq!(doc, Doc::default());
    }

    #[test]
    fn round_trips_through_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_locked(&path, &Doc { value: 42 }).unwrap();
        let doc: Doc = read_json_locked(&path);
        assert_eq!(doc, Doc { value: 42 });
    }

    #[test]
    fn corrupt_json_reads_as_default_not_panic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{ not json").unwrap();
        let doc: Doc = read_json_locked(&path);
        assert_eq!(doc, Doc::default());
    }

    #[test]
    fn quarantine_moves_file_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"garbage").unwrap();
        quarantine_corrupt(&path);
        assert!(!path.exists());
        assert!(path.with_extension("corrupt").exists());
    }

    #[test]
    fn second_exclusive_acquire_fails_while_first_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.lock");
        let first = try_exclusive(&path).unwrap();
        assert!(first.is_some());
        let second = try_exclusive(&path).unwrap();
        assert!(second.is_none());
        drop(first);
    }

    #[test]
    fn write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("state.json");
        write_json_locked(&path, &Doc { value: 1 }).unwrap();
        assert!(path.exists());
    }
}
