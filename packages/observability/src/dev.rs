//! Subscriber installation.
//!
//! Writes structured JSONL logs to a central file that can be tailed by
//! external tools. Multi-process safe via append-only, per-line flushes.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Central log file location: `~/.studydash/logs/dev.jsonl`.
fn default_log_path() -> io::Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".studydash").join("logs").join("dev.jsonl"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))
}

/// Append-only file writer shared by every log line of the process.
#[derive(Clone)]
pub struct CentralLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl CentralLogWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        // One flush per line keeps lines from different processes whole.
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// MakeWriter implementation for tracing-subscriber.
#[derive(Clone)]
pub struct WriterFactory {
    writer: CentralLogWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the JSONL file subscriber (plus optional stderr mirror).
pub fn init_file_subscriber(config: &LogConfig) -> io::Result<()> {
    let log_path = match &config.log_path {
        Some(path) => path.clone(),
        None => default_log_path()?,
    };

    let writer = CentralLogWriter::new(&log_path)?;
    let json_layer = JsonLayer::new(config.service_name.clone(), WriterFactory { writer });

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_filter(env_filter(&config.default_level)),
        )
    } else {
        None
    };

    let result = tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter(&config.default_level)))
        .with(stderr_layer)
        .try_init();

    if result.is_ok() {
        tracing::info!(
            log_path = %log_path.display(),
            service = %config.service_name,
            "observability initialized"
        );
    }

    Ok(())
}

/// Install a compact stderr-only subscriber.
pub fn init_stderr_subscriber(config: &LogConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.default_level))
        .with_target(true)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}
