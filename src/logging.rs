//! Log subscriber: human-readable stderr plus a daily file in the log directory

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn log_file_name(date: NaiveDate) -> String {
    format!("log_{}.log", date.format("%Y_%m_%d"))
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append-only log file that switches to a new `log_YYYY_MM_DD.log` at
/// local midnight.
struct DailyLogFile {
    dir: PathBuf,
    date: NaiveDate,
    file: File,
}

impl DailyLogFile {
    fn open(dir: &Path, date: NaiveDate) -> io::Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            date,
            file: open_append(&dir.join(log_file_name(date)))?,
        })
    }

    fn path(&self) -> PathBuf {
        self.dir.join(log_file_name(self.date))
    }

    fn write_at(&mut self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        if date != self.date {
            self.file.flush()?;
            self.file = open_append(&self.dir.join(log_file_name(date)))?;
            self.date = date;
        }
        self.file.write(buf)
    }
}

impl Write for DailyLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(Local::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Install the global subscriber. Level comes from `RUST_LOG`, default `info`.
/// Returns the path of today's log file.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let file = DailyLogFile::open(log_dir, Local::now().date_naive())
        .with_context(|| format!("opening log file in {}", log_dir.display()))?;
    let path = file.path();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()
        .context("installing log subscriber")?;

    Ok(path)
}
