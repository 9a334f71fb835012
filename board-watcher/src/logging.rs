//! Logging setup.
//!
//! Three sinks: the console, a full log file and an error-only log file,
//! both under `general.log_dir`. `RUST_LOG` overrides the configured level.
//! Both files roll over to `name.1`, `name.2`, ... once they pass
//! `general.log_max_bytes`, at startup and while running.

use crate::config::GeneralConfig;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const LOG_FILE: &str = "board-watcher.log";
pub const ERROR_LOG_FILE: &str = "board-watcher.error.log";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to prepare log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// `path.N`
fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

/// Move `path` to `path.1` when it has grown past `max_bytes`.
///
/// Existing backups shift up by one; anything beyond `backups` is removed.
/// Returns whether a rotation happened.
pub fn rotate_if_oversized(path: &Path, max_bytes: u64, backups: u32) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if max_bytes == 0 || size < max_bytes {
        return Ok(false);
    }
    roll_over(path, backups)?;
    Ok(true)
}

fn roll_over(path: &Path, backups: u32) -> io::Result<()> {
    if backups == 0 {
        return fs::remove_file(path);
    }

    let oldest = backup_path(path, backups);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup_path(path, n);
        if from.exists() {
            fs::rename(&from, backup_path(path, n + 1))?;
        }
    }
    fs::rename(path, backup_path(path, 1))
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

struct RollingState {
    file: File,
    written: u64,
}

/// Log file writer that rolls the file over once it passes `max_bytes`.
///
/// A single write is never split, so a file can exceed the limit by at most
/// one event.
pub struct RollingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: u32,
    state: Mutex<RollingState>,
}

impl RollingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: u32) -> io::Result<Self> {
        let path = path.into();
        rotate_if_oversized(&path, max_bytes, backups)?;
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            backups,
            state: Mutex::new(RollingState { file, written }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, RollingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Roll the file over first if `incoming` bytes would push it past
    /// the limit. An empty file always takes the write.
    fn make_room(&self, state: &mut RollingState, incoming: usize) -> io::Result<()> {
        if self.max_bytes == 0
            || state.written == 0
            || state.written + incoming as u64 <= self.max_bytes
        {
            return Ok(());
        }
        state.file.flush()?;
        roll_over(&self.path, self.backups)?;
        state.file = open_append(&self.path)?;
        state.written = 0;
        Ok(())
    }
}

pub struct RollingWriter<'a>(&'a RollingFile);

impl Write for RollingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.lock();
        self.0.make_room(&mut state, buf.len())?;
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut state = self.0.lock();
        self.0.make_room(&mut state, buf.len())?;
        state.file.write_all(buf)?;
        state.written += buf.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RollingFile {
    type Writer = RollingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RollingWriter(self)
    }
}

fn open_log(dir: &Path, name: &str, general: &GeneralConfig) -> Result<RollingFile, LoggingError> {
    let path = dir.join(name);
    RollingFile::open(&path, general.log_max_bytes, general.log_backups)
        .map_err(|source| LoggingError::Io { path, source })
}

/// Install the global subscriber
pub fn init(general: &GeneralConfig) -> Result<(), LoggingError> {
    fs::create_dir_all(&general.log_dir).map_err(|source| LoggingError::Io {
        path: general.log_dir.clone(),
        source,
    })?;
    let log_file = open_log(&general.log_dir, LOG_FILE, general)?;
    let error_file = open_log(&general.log_dir, ERROR_LOG_FILE, general)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&general.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(log_file),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(error_file)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, bytes: usize) {
        fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn test_small_file_not_rotated() {
        let dir = tempdir().unwrap();
        let log = dir.path().join(LOG_FILE);
        write(&log, 10);

        assert!(!rotate_if_oversized(&log, 100, 3).unwrap());
        assert!(log.exists());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn test_missing_file_is_fine() {
        let dir = tempdir().unwrap();
        assert!(!rotate_if_oversized(&dir.path().join("none.log"), 1, 3).unwrap());
    }

    #[test]
    fn test_rotation_shifts_backups() {
        let dir = tempdir().unwrap();
        let log = dir.path().join(LOG_FILE);
        write(&backup_path(&log, 1), 1);
        write(&backup_path(&log, 2), 2);
        write(&log, 200);

        assert!(rotate_if_oversized(&log, 100, 2).unwrap());
        assert!(!log.exists());
        assert_eq!(fs::metadata(backup_path(&log, 1)).unwrap().len(), 200);
        assert_eq!(fs::metadata(backup_path(&log, 2)).unwrap().len(), 1);
        assert!(!backup_path(&log, 3).exists());
    }

    #[test]
    fn test_zero_backups_truncates() {
        let dir = tempdir().unwrap();
        let log = dir.path().join(LOG_FILE);
        write(&log, 200);

        assert!(rotate_if_oversized(&log, 100, 0).unwrap());
        assert!(!log.exists());
    }

    #[test]
    fn test_writer_rolls_over_while_running() {
        let dir = tempdir().unwrap();
        let log = dir.path().join(LOG_FILE);
        let rolling = RollingFile::open(&log, 100, 2).unwrap();

        rolling.make_writer().write_all(&[b'a'; 60]).unwrap();
        assert!(!backup_path(&log, 1).exists());

        rolling.make_writer().write_all(&[b'b'; 60]).unwrap();
        assert_eq!(fs::read(backup_path(&log, 1)).unwrap(), vec![b'a'; 60]);
        assert_eq!(fs::read(&log).unwrap(), vec![b'b'; 60]);

        rolling.make_writer().write_all(&[b'c'; 60]).unwrap();
        assert_eq!(fs::read(backup_path(&log, 2)).unwrap(), vec![b'a'; 60]);
        assert_eq!(fs::read(backup_path(&log, 1)).unwrap(), vec![b'b'; 60]);
        assert!(!backup_path(&log, 3).exists());
    }

    #[test]
    fn test_writer_counts_existing_contents() {
        let dir = tempdir().unwrap();
        let log = dir.path().join(LOG_FILE);
        write(&log, 50);
        let rolling = RollingFile::open(&log, 100, 1).unwrap();
        assert_eq!(rolling.path(), log.as_path());

        rolling.make_writer().write_all(&[b'y'; 60]).unwrap();
        assert_eq!(fs::metadata(backup_path(&log, 1)).unwrap().len(), 50);
        assert_eq!(fs::metadata(&log).unwrap().len(), 60);
    }

    #[test]
    fn test_writer_without_limit_never_rolls() {
        let dir = tempdir().unwrap();
        let log = dir.path().join(LOG_FILE);
        let rolling = RollingFile::open(&log, 0, 2).unwrap();

        for _ in 0..5 {
            rolling.make_writer().write_all(&[b'z'; 100]).unwrap();
        }
        assert_eq!(fs::metadata(&log).unwrap().len(), 500);
        assert!(!backup_path(&log, 1).exists());
    }
}
