//! Render-engine session log.
//!
//! One file per process run, opened by [`init`] (or [`init_at`] for a chosen
//! path) and truncated on open.  Pipeline, compositor and viewport code log
//! through `log_info!`, `log_warn!` and `log_err!`; before the log is opened
//! those macros format nothing and write nothing, so the library stays quiet
//! when embedded or under test.
//!
//! Default location is `LayerFX/layerfx.log` under the platform data
//! directory (`%APPDATA%`, `~/Library/Application Support`, or
//! `$XDG_DATA_HOME` / `~/.local/share`).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Severity tag written in front of each message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

/// Path of the open session log, if any.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

pub fn is_enabled() -> bool {
    LOG_FILE.get().is_some()
}

/// Append a raw line.  Write failures are dropped; a render never stops
/// because the log is unwritable.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Append `[time] [LEVEL] message`.
pub fn write(level: Level, msg: &str) {
    write_line(&format!("[{}] [{}] {}", clock_time(), level.tag(), msg));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*));
        }
    };
}

/// Open the session log at [`default_log_path`].
pub fn init() {
    init_at(&default_log_path());
}

/// Open (truncating) the session log at `path` and route panics into it.
/// Later calls in the same process are ignored.
pub fn init_at(path: &Path) {
    if is_enabled() {
        return;
    }
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let opened = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path);
    let file = match opened {
        Ok(file) => file,
        Err(e) => {
            eprintln!("layerfx: session log {} unavailable: {}", path.display(), e);
            return;
        }
    };
    let _ = LOG_PATH.set(path.to_path_buf());
    let _ = LOG_FILE.set(Mutex::new(file));

    write_line(&format!("=== LayerFX session started {} ===", session_stamp()));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        previous(info);
    }));
}

pub fn default_log_path() -> PathBuf {
    data_dir().join("LayerFX").join("layerfx.log")
}

fn data_dir() -> PathBuf {
    let env = |key: &str| std::env::var_os(key).map(PathBuf::from);
    if cfg!(target_os = "windows") {
        if let Some(appdata) = env("APPDATA") {
            return appdata;
        }
    } else if cfg!(target_os = "macos") {
        if let Some(home) = env("HOME") {
            return home.join("Library").join("Application Support");
        }
    }
    env("XDG_DATA_HOME")
        .or_else(|| env("HOME").map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Seconds since the epoch, or zero if the clock is before it.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// UTC `HH:MM:SS`.
fn clock_time() -> String {
    let secs = epoch_secs() % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn session_stamp() -> String {
    format!("(unix {})", epoch_secs())
}
