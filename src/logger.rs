//! Replay log: every `log` record of one run goes to a single file that is
//! truncated when the process starts, so it only ever holds the latest run.
//!
//! Log location:
//!   Windows:  `%LOCALAPPDATA%\semsketch\logs\semsketch.log`
//!   Linux:    `$XDG_STATE_HOME/semsketch/semsketch.log` (default `~/.local/state`)
//!   macOS:    `~/Library/Logs/semsketch/semsketch.log`
//!
//! The crate logs through the `log` facade (`log::info!`, `log::warn!`, ...).
//! [`init`] installs [`SessionLogger`] as the backend.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

/// `log` backend that appends timestamped lines to the session file and,
/// optionally, mirrors warnings and errors to stderr.
pub struct SessionLogger {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
    level: LevelFilter,
    echo_to_stderr: bool,
}

impl SessionLogger {
    /// Open (truncating) `path`. A file that cannot be opened is not fatal;
    /// the logger then only echoes to stderr.
    pub fn open(path: &Path, level: LevelFilter, echo_to_stderr: bool) -> Self {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path);

        match file {
            Ok(f) => Self {
                file: Some(Mutex::new(f)),
                path: Some(path.to_path_buf()),
                level,
                echo_to_stderr,
            },
            Err(e) => {
                eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
                Self {
                    file: None,
                    path: None,
                    level,
                    echo_to_stderr,
                }
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write a raw line. I/O errors are ignored so logging never takes the
    /// session down.
    pub fn write_line(&self, line: &str) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = writeln!(file, "{}", line);
        }
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] [{}] {}", clock_time(SystemTime::now()), record.level(), record.args());
        self.write_line(&line);
        if self.echo_to_stderr && record.level() <= log::Level::Warn {
            eprintln!("{}", line);
        }
    }

    fn flush(&self) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Install the session logger as the `log` backend. Call once, before any
/// logging; later calls are no-ops. Panics are appended to the log before
/// the default hook runs.
pub fn init(level: LevelFilter, echo_to_stderr: bool) {
    let path = log_dir().join("semsketch.log");
    let logger = LOGGER.get_or_init(|| SessionLogger::open(&path, level, echo_to_stderr));
    if log::set_logger(logger).is_err() {
        return;
    }
    log::set_max_level(level);

    logger.write_line(&format!(
        "=== semsketch {} (pid {}) at {} UTC ===",
        env!("CARGO_PKG_VERSION"),
        std::process::id(),
        clock_time(SystemTime::now())
    ));
    logger.write_line(&format!("log level {}, file {}", level, path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(logger) = LOGGER.get() {
            logger.write_line(&format!("[{}] [PANIC] {}", clock_time(SystemTime::now()), info));
            logger.flush();
        }
        prev(info);
    }));
}

/// Per-user log directory for the replayer.
fn log_dir() -> PathBuf {
    let var = |key: &str| std::env::var_os(key).map(PathBuf::from);

    #[cfg(target_os = "windows")]
    let base = var("LOCALAPPDATA").map(|d| d.join("semsketch").join("logs"));
    #[cfg(target_os = "macos")]
    let base = var("HOME").map(|h| h.join("Library").join("Logs").join("semsketch"));
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let base = var("XDG_STATE_HOME")
        .or_else(|| var("HOME").map(|h| h.join(".local").join("state")))
        .map(|d| d.join("semsketch"));

    base.unwrap_or_else(|| std::env::temp_dir().join("semsketch"))
}

/// `HH:MM:SS.mmm` (UTC) of `at`, enough to line up debounce timings.
fn clock_time(at: SystemTime) -> String {
    let Ok(since_epoch) = at.duration_since(UNIX_EPOCH) else {
        return "--:--:--.---".to_string();
    };
    let secs = since_epoch.as_secs() % 86_400;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        secs % 3600 / 60,
        secs % 60,
        since_epoch.subsec_millis()
    )
}
