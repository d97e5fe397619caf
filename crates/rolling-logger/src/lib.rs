//! Rolling Logger
//!
//! Installs a global `tracing` subscriber that writes plain-text lines to a
//! size-rotated file and keeps the most recent lines in memory, so a UI or
//! CLI can show them without reading the file back. Records emitted through
//! the `log` facade are bridged into the same subscriber.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives
pub const FILTER_ENV: &str = "PAGEBOARD_LOG";

static LOGGER: OnceLock<LoggerHandle> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("log file error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("a global logger is already installed")]
    AlreadyInitialized,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub app_name: String,
    /// Used when the filter environment variable is unset
    pub default_level: String,
    pub max_file_size: u64,
    /// Rotated files kept besides the active one
    pub max_files: usize,
    pub buffer_lines: usize,
}

impl LoggerConfig {
    pub fn new(log_dir: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            app_name: app_name.into(),
            default_level: "info".to_string(),
            max_file_size: 5 * 1024 * 1024,
            max_files: 5,
            buffer_lines: 500,
        }
    }

    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    pub fn with_buffer_lines(mut self, lines: usize) -> Self {
        self.buffer_lines = lines;
        self
    }
}

/// Log file that starts a new file once it grows past a size limit
struct RollingFile {
    dir: PathBuf,
    app_name: String,
    max_size: u64,
    max_files: usize,
    file: File,
    written: u64,
}

impl RollingFile {
    fn open(config: &LoggerConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.log_dir)?;
        let path = active_path(&config.log_dir, &config.app_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            dir: config.log_dir.clone(),
            app_name: config.app_name.clone(),
            max_size: config.max_file_size,
            max_files: config.max_files,
            file,
            written,
        })
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
        let rotated = self.dir.join(format!("{}-{}.log", self.app_name, stamp));
        fs::rename(active_path(&self.dir, &self.app_name), rotated)?;

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(active_path(&self.dir, &self.app_name))?;
        self.written = 0;
        self.prune()
    }

    /// Delete the oldest rotated files beyond `max_files`
    fn prune(&self) -> io::Result<()> {
        let prefix = format!("{}-", self.app_name);
        let mut rotated: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".log"))
            })
            .collect();
        // timestamped names sort chronologically
        rotated.sort();
        let excess = rotated.len().saturating_sub(self.max_files);
        for path in rotated.into_iter().take(excess) {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn active_path(dir: &Path, app_name: &str) -> PathBuf {
    dir.join(format!("{}.log", app_name))
}

/// Circular buffer of complete lines
struct RingBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    partial: String,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            partial: String::new(),
        }
    }

    fn push_bytes(&mut self, buf: &[u8]) {
        self.partial.push_str(&String::from_utf8_lossy(buf));
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            self.push_line(line.trim_end().to_string());
        }
    }

    fn push_line(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

struct Shared {
    file: Mutex<RollingFile>,
    ring: Mutex<RingBuffer>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `MakeWriter` feeding both the rolling file and the ring buffer
#[derive(Clone)]
struct Sink {
    shared: Arc<Shared>,
}

struct SinkWriter {
    shared: Arc<Shared>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.shared.ring).push_bytes(buf);
        lock(&self.shared.file).write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.shared.file).file.flush()
    }
}

impl<'a> MakeWriter<'a> for Sink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Access to the installed logger's buffer and file
#[derive(Clone)]
pub struct LoggerHandle {
    shared: Arc<Shared>,
    path: PathBuf,
}

impl LoggerHandle {
    /// Most recent lines, oldest first
    pub fn recent_lines(&self) -> Vec<String> {
        lock(&self.shared.ring).snapshot()
    }

    /// The file currently being written
    pub fn log_path(&self) -> &Path {
        &self.path
    }
}

fn build_sink(config: &LoggerConfig) -> Result<Sink, LoggerError> {
    Ok(Sink {
        shared: Arc::new(Shared {
            file: Mutex::new(RollingFile::open(config)?),
            ring: Mutex::new(RingBuffer::new(config.buffer_lines)),
        }),
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logger(config: LoggerConfig) -> Result<LoggerHandle, LoggerError> {
    let filter = match EnvFilter::try_from_env(FILTER_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_level)
            .map_err(|e| LoggerError::Filter(e.to_string()))?,
    };
    let sink = build_sink(&config)?;
    let handle = LoggerHandle {
        shared: Arc::clone(&sink.shared),
        path: active_path(&config.log_dir, &config.app_name),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(sink),
        )
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)?;

    LOGGER
        .set(handle.clone())
        .map_err(|_| LoggerError::AlreadyInitialized)?;
    log::info!("Logging to {}", handle.path.display());
    Ok(handle)
}

/// Handle of the installed logger, if any
pub fn handle() -> Option<&'static LoggerHandle> {
    LOGGER.get()
}

/// Recent lines of the installed logger; empty before `init_logger`
pub fn recent_lines() -> Vec<String> {
    LOGGER.get().map(LoggerHandle::recent_lines).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_keeps_latest_lines() {
        let mut ring = RingBuffer::new(2);
        ring.push_bytes(b"one\ntwo\nthr");
        assert_eq!(ring.snapshot(), vec!["one", "two"]);
        ring.push_bytes(b"ee\n");
        assert_eq!(ring.snapshot(), vec!["two", "three"]);
    }

    #[test]
    fn test_rotation_caps_file_count() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggerConfig::new(dir.path(), "app")
            .with_max_file_size(16)
            .with_max_files(2);
        let mut file = RollingFile::open(&config).unwrap();

        for n in 0..6 {
            file.write_all(format!("line number {}\n", n).as_bytes()).unwrap();
            // distinct rotation stamps
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        let rotated = names.iter().filter(|n| n.starts_with("app-")).count();
        assert_eq!(rotated, 2);
        assert!(names.contains(&"app.log".to_string()));
        let active = fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert_eq!(active, "line number 5\n");
    }

    #[test]
    fn test_sink_writes_file_and_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let sink = build_sink(&LoggerConfig::new(dir.path(), "sink")).unwrap();
        let mut writer = sink.make_writer();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(lock(&sink.shared.ring).snapshot(), vec!["hello"]);
        assert_eq!(fs::read_to_string(dir.path().join("sink.log")).unwrap(), "hello\n");
    }

    #[test]
    fn test_global_logger_lifecycle() {
        assert!(handle().is_none());
        assert!(recent_lines().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let handle = init_logger(LoggerConfig::new(dir.path(), "global").with_default_level("info")).unwrap();
        tracing::info!("ready");
        tracing::error!("broken");
        log::warn!("bridged");

        let lines = handle.recent_lines();
        assert!(lines.iter().any(|l| l.contains("ready")));
        assert!(lines.iter().any(|l| l.contains("ERROR") && l.contains("broken")));
        assert!(lines.iter().any(|l| l.contains("bridged")));
        assert_eq!(recent_lines(), handle.recent_lines());

        let again = init_logger(LoggerConfig::new(dir.path(), "global"));
        assert!(matches!(again, Err(LoggerError::AlreadyInitialized)));
    }
}
