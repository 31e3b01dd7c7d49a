//! Logging setup: a human-readable format on stderr and in a size-rotated file.
//!
//! The subscriber is built here and handed back to `main`, which scopes it
//! around the run instead of installing a process-wide default.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use safeguard_engine::LoggingConfig;
use tracing::Subscriber;
use tracing_subscriber::fmt::{self, time::ChronoLocal, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

const TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// A log file that rolls over to `<file>.1` … `<file>.N` once it would grow
/// past `max_bytes`. The oldest segment is dropped, so at most `max_files`
/// rolled-over segments exist at any time.
///
/// A `max_bytes` or `max_files` of 0 disables rotation.
pub struct RotatingFile {
    state: Mutex<RotationState>,
}

struct RotationState {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    file: Option<File>,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, max_files: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut state = RotationState {
            path,
            max_bytes,
            max_files,
            file: None,
            written: 0,
        };
        state.written = state.file()?.metadata()?.len();

        Ok(RotatingFile {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, RotationState>> {
        self.state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))
    }
}

impl RotationState {
    fn file(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        };
        Ok(self.file.insert(file))
    }

    fn segment(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        // Close first: open files can't be renamed on Windows
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }

        match fs::remove_file(self.segment(self.max_files)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        for n in (1..self.max_files).rev() {
            let from = self.segment(n);
            if from.exists() {
                fs::rename(&from, self.segment(n + 1))?;
            }
        }
        fs::rename(&self.path, self.segment(1))?;

        self.written = 0;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let rotation_enabled = self.max_bytes > 0 && self.max_files > 0;
        if rotation_enabled && self.written > 0 && self.written + buf.len() as u64 > self.max_bytes
        {
            self.rotate()?;
        }

        self.file()?.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }
}

impl Write for &RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock()?.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = &'a RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Build the subscriber for one run.
///
/// Each event carries a local timestamp, level, source file and line.
pub fn build_subscriber(
    config: &LoggingConfig,
    verbose: bool,
) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level '{}'", config.level))?
    };

    let file = RotatingFile::open(&config.file, config.max_bytes, config.max_files)
        .with_context(|| format!("failed to open log file {}", config.file.display()))?;

    let file_layer = fmt::layer()
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(file);

    let console_layer = config.console.then(|| {
        fmt::layer()
            .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .with_writer(io::stderr)
    });

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer))
}
