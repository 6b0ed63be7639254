use anyhow::Context;
use chrono::{DateTime, Local};
use indicatif::ProgressBar;
use odtemp_device::MEASUREMENT_TARGET;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_DIRECTIVES: &str = "odtemp=info";

#[derive(Default)]
pub struct LogOptions {
    /// Log file directory, the current one if not set
    pub dir: Option<PathBuf>,
    /// No log file; the console only shows warnings and measurement lines
    pub silent: bool,
    /// Live readout line that console output has to be printed around
    pub progress: Option<ProgressBar>,
}

/// Stdout writer that hides the live readout while a log line is printed
#[derive(Clone)]
struct ConsoleWriter {
    progress: Option<ProgressBar>,
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = ConsoleLine;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleLine {
            progress: self.progress.clone(),
            buf: Vec::new(),
        }
    }
}

/// One formatted event, printed as a whole when dropped
struct ConsoleLine {
    progress: Option<ProgressBar>,
    buf: Vec<u8>,
}

impl Write for ConsoleLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleLine {
    fn drop(&mut self) {
        let _ = write_around(self.progress.as_ref(), &mut io::stdout().lock(), &self.buf);
    }
}

fn write_around(
    progress: Option<&ProgressBar>,
    out: &mut impl Write,
    line: &[u8],
) -> io::Result<()> {
    if line.is_empty() {
        return Ok(());
    }
    let mut print = || out.write_all(line).and_then(|()| out.flush());
    match progress {
        Some(progress) => progress.suspend(print),
        None => print(),
    }
}

pub fn log_file_name(started_at: DateTime<Local>) -> String {
    started_at.format("odtemp_%d.%m.%Y_%H.%M.%S.log").to_string()
}

/// Creates `dir` if needed and opens a fresh log file in it for appending
pub fn create_log_file(
    dir: &Path,
    started_at: DateTime<Local>,
) -> anyhow::Result<(PathBuf, File)> {
    create_dir_all(dir).with_context(|| format!("Error creating \"{}\"", dir.display()))?;

    let path = dir.join(log_file_name(started_at));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Error opening \"{}\"", path.display()))?;

    Ok((path, file))
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into())
}

fn console_directives(silent: bool) -> String {
    if silent {
        format!("warn,{MEASUREMENT_TARGET}=info")
    } else {
        DEFAULT_DIRECTIVES.to_owned()
    }
}

/// Installs the global subscriber. Returns the log file path unless `silent`.
pub fn init(options: &LogOptions) -> anyhow::Result<Option<PathBuf>> {
    let console_writer = ConsoleWriter {
        progress: options.progress.clone(),
    };
    let console_layer = fmt::layer()
        .with_writer(console_writer)
        .with_filter(env_filter(&console_directives(options.silent)));

    let (log_path, file_layer) = if options.silent {
        (None, None)
    } else {
        let dir = options.dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let (path, file) = create_log_file(&dir, Local::now())?;
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(env_filter(DEFAULT_DIRECTIVES));
        (Some(path), Some(layer))
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Couldn't set up logging")?;

    Ok(log_path)
}
