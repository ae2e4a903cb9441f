//! Run lock for commands that write to the period store.
//!
//! One advisory OS file lock (flock) per database path, held for the life of
//! the command. A second writer against the same database fails fast instead
//! of interleaving its purge and ingest steps with the first.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const RUN_LOCK_FILE: &str = "gareport-run.lock";

/// Held by `run`, `rollup` and `purge` until the command exits.
pub struct RunGuard {
    _lock: ProcessLock,
}

/// Take the run lock for `db_path`, failing if another writer holds it.
pub fn acquire_run_guard(db_path: &Path) -> Result<RunGuard> {
    match try_acquire_lock(RUN_LOCK_FILE, db_path)? {
        Some(lock) => Ok(RunGuard { _lock: lock }),
        None => anyhow::bail!(
            "another gareport command is already writing to {}",
            db_path.display()
        ),
    }
}

struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

fn try_acquire_lock(filename: &str, db_path: &Path) -> Result<Option<ProcessLock>> {
    let dir = lock_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create runtime lock directory: {}", dir.display()))?;

    let path = dir.join(scoped_lock_filename(filename, db_path));
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;

    match lock_file_nonblocking(&file) {
        Ok(()) => {
            // Owner info, for whoever finds the lock busy.
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = writeln!(file, "db={}", db_path.display());
            let _ = file.flush();

            tracing::debug!(lock = %path.display(), "Run lock acquired");
            Ok(Some(ProcessLock { file, path }))
        }
        Err(e) if is_lock_busy(&e) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to lock file: {}", path.display())),
    }
}

fn lock_dir() -> PathBuf {
    let mut dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir(),
    };
    dir.push("gareport");
    dir
}

/// Lock file name unique to one database file
fn scoped_lock_filename(base_filename: &str, db_path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    lock_key(db_path).to_string_lossy().hash(&mut hasher);
    format!("{base_filename}.{:016x}", hasher.finish())
}

/// Absolute form of `db_path` with its directory canonicalized.
///
/// The database file itself may not exist yet, so only the parent is
/// resolved. Falls back to the plain absolute path when the parent is missing.
fn lock_key(db_path: &Path) -> PathBuf {
    let absolute = if db_path.is_absolute() {
        db_path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(db_path),
            Err(_) => db_path.to_path_buf(),
        }
    };

    match (absolute.parent(), absolute.file_name()) {
        (Some(dir), Some(name)) => fs::canonicalize(dir)
            .map(|dir| dir.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

fn is_lock_busy(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File) -> io::Result<()> {
    const LOCK_EX: i32 = 2;
    const LOCK_NB: i32 = 4;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_EX | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    const LOCK_UN: i32 = 8;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("gareport run locks currently require Unix (macOS/Linux)");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_guard_for_same_db_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("lock-test.db");

        let first = acquire_run_guard(&db_path).unwrap();
        assert!(acquire_run_guard(&db_path).is_err());
        drop(first);
        assert!(acquire_run_guard(&db_path).is_ok());
    }

    #[test]
    fn test_equivalent_paths_share_one_lock() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let plain = dir.path().join("shared.db");
        let dotted = dir.path().join("sub/.././shared.db");

        assert_eq!(
            scoped_lock_filename(RUN_LOCK_FILE, &plain),
            scoped_lock_filename(RUN_LOCK_FILE, &dotted)
        );

        let first = acquire_run_guard(&plain).unwrap();
        assert!(acquire_run_guard(&dotted).is_err());
        drop(first);
    }

    #[test]
    fn test_relative_path_matches_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let relative = Path::new("relative-lock-test.db");
        assert_eq!(
            scoped_lock_filename(RUN_LOCK_FILE, relative),
            scoped_lock_filename(RUN_LOCK_FILE, &cwd.join(relative))
        );
    }

    #[test]
    fn test_lock_names_differ_per_database() {
        let a = scoped_lock_filename(RUN_LOCK_FILE, Path::new("/tmp/a.db"));
        let b = scoped_lock_filename(RUN_LOCK_FILE, Path::new("/tmp/b.db"));
        assert_ne!(a, b);
        assert!(a.starts_with(RUN_LOCK_FILE));
    }
}
