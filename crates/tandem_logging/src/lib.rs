//! Shared logging setup for Tandem binaries.
//!
//! Library crates only emit `tracing` events; installing the subscriber is
//! the binary's job, done once through [`init_logging`]. Output goes to
//! stderr and, when enabled, to a size-capped rotating file set under the
//! Tandem home directory.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "tandem=info,tandem_sync=info,tandem_protocol=info";
const KEEP_ROTATIONS: usize = 4;
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

/// Logging options for one binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the full filter to stderr instead of warnings only.
    pub verbose: bool,
    /// Also write to `<home>/logs/<app_name>.log` with rotation.
    pub log_to_file: bool,
}

/// Install the global tracing subscriber.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_filter = if config.verbose {
        filter
    } else {
        EnvFilter::new("warn")
    };

    if config.log_to_file {
        let dir = ensure_logs_dir().context("Failed to create log directory")?;
        let writer = RollingWriter::open(dir, config.app_name)
            .context("Failed to open rolling log file")?;
        let file_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(file_filter);
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_filter(stderr_filter);
        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .init();
    } else {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_filter(stderr_filter);
        tracing_subscriber::registry().with(stderr_layer).init();
    }

    Ok(())
}

/// Tandem home directory: `$TANDEM_HOME` or `~/.tandem`.
pub fn tandem_home() -> PathBuf {
    if let Ok(overridden) = std::env::var("TANDEM_HOME") {
        return PathBuf::from(overridden);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tandem")
}

/// Logs directory: `<home>/logs`.
pub fn logs_dir() -> PathBuf {
    tandem_home().join("logs")
}

fn ensure_logs_dir() -> Result<PathBuf> {
    let dir = logs_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Size-capped log writer: `<base>.log` plus numbered rotations, oldest
/// deleted past [`KEEP_ROTATIONS`]. Cloneable so the fmt layer can hand out
/// writers per event.
#[derive(Clone)]
struct RollingWriter {
    state: Arc<Mutex<RollingState>>,
}

struct RollingState {
    dir: PathBuf,
    base: String,
    file: File,
    written: u64,
}

impl RollingWriter {
    fn open(dir: PathBuf, app_name: &str) -> io::Result<Self> {
        let base: String = app_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = dir.join(format!("{base}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            state: Arc::new(Mutex::new(RollingState {
                dir,
                base,
                file,
                written,
            })),
        })
    }
}

impl RollingState {
    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base))
    }

    fn rotation_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base, index))
    }

    fn rotate(&mut self) -> io::Result<()> {
        let _ = self.file.flush();
        let _ = fs::remove_file(self.rotation_path(KEEP_ROTATIONS));
        for index in (1..KEEP_ROTATIONS).rev() {
            let from = self.rotation_path(index);
            if from.exists() {
                fs::rename(&from, self.rotation_path(index + 1))?;
            }
        }
        fs::rename(self.active_path(), self.rotation_path(1))?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = 0;
        Ok(())
    }

    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > MAX_LOG_BYTES {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
}

impl Write for RollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer poisoned"))?;
        state.append(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer poisoned"))?;
        state.file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingWriter {
    type Writer = RollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
