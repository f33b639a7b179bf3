//! Log sinks for both sides of the worker boundary.
//!
//! Each side owns one [`FileLogger`]. A logger is a swappable, append-only file that
//! flushes on every record, and it doubles as a [`MakeWriter`] so a `tracing`
//! subscriber can be layered on top of it.

use std::{
	io::{self, Write},
	path::{Path, PathBuf},
	sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{SecondsFormat, Utc};
use tracing::Dispatch;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
	filter::LevelFilter,
	fmt::{self, MakeWriter},
	prelude::*,
};

use super::error::ConfigurationError;

/// Written as the first record of every freshly opened log file.
pub const OPENED_MARKER: &str = "FileLogger opened";

#[derive(Debug, Clone, Default)]
pub struct FileLogger {
	inner: Arc<Mutex<Option<OpenLog>>>,
}

#[derive(Debug)]
pub(crate) struct OpenLog {
	path: PathBuf,
	appender: RollingFileAppender,
}

/// A log change that was validated but not installed yet.
#[derive(Debug)]
pub(crate) enum LogChange {
	Keep,
	Close,
	Open(OpenLog),
}

impl OpenLog {
	fn open(path: &Path) -> Result<Self, ConfigurationError> {
		let file_name = path
			.file_name()
			.and_then(|name| name.to_str())
			.ok_or_else(|| ConfigurationError::InvalidLogPath(path.into()))?;

		let directory = match path.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent,
			_ => Path::new("."),
		};

		let mut appender = RollingFileAppender::builder()
			.rotation(Rotation::NEVER)
			.filename_prefix(file_name)
			.build(directory)
			.map_err(|source| ConfigurationError::LogFile {
				path: path.into(),
				source,
			})?;

		writeln!(
			appender,
			"{} {:>5} {}: {OPENED_MARKER} <path='{}'>",
			Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
			"INFO",
			module_path!(),
			path.display()
		)
		.and_then(|()| appender.flush())
		.map_err(|source| ConfigurationError::LogWrite {
			path: path.into(),
			source,
		})?;

		Ok(Self {
			path: path.to_path_buf(),
			appender,
		})
	}
}

impl FileLogger {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, Option<OpenLog>> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn path(&self) -> Option<PathBuf> {
		self.lock().as_ref().map(|log| log.path.clone())
	}

	pub fn is_open(&self) -> bool {
		self.lock().is_some()
	}

	/// Open the file for `path` without installing it yet.
	///
	/// The same path as the currently open one is a no-op, so the opened marker is only
	/// written once per file.
	pub(crate) fn prepare(&self, path: Option<&Path>) -> Result<LogChange, ConfigurationError> {
		let current = self.path();

		match path {
			None if current.is_none() => Ok(LogChange::Keep),
			None => Ok(LogChange::Close),
			Some(path) if current.as_deref() == Some(path) => Ok(LogChange::Keep),
			Some(path) => OpenLog::open(path).map(LogChange::Open),
		}
	}

	pub(crate) fn apply(&self, change: LogChange) {
		match change {
			LogChange::Keep => {}
			LogChange::Close => *self.lock() = None,
			LogChange::Open(log) => *self.lock() = Some(log),
		}
	}

	/// Switch this sink to `path`, or disable it with `None`.
	pub fn reconfigure(&self, path: Option<&Path>) -> Result<(), ConfigurationError> {
		let change = self.prepare(path)?;
		self.apply(change);

		Ok(())
	}

	/// A subscriber writing every record of level `DEBUG` or above to this sink.
	pub fn dispatch(&self) -> Dispatch {
		Dispatch::new(
			tracing_subscriber::registry().with(
				fmt::layer()
					.with_ansi(false)
					.with_thread_names(true)
					.with_writer(self.clone())
					.with_filter(LevelFilter::DEBUG),
			),
		)
	}
}

impl<'a> MakeWriter<'a> for FileLogger {
	type Writer = LogWriter<'a>;

	fn make_writer(&'a self) -> Self::Writer {
		LogWriter(self.lock())
	}
}

/// Writer handed to `tracing_subscriber`; records are dropped while the sink is closed.
pub struct LogWriter<'a>(MutexGuard<'a, Option<OpenLog>>);

impl Write for LogWriter<'_> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.0.as_mut() {
			Some(log) => {
				let written = log.appender.write(buf)?;
				log.appender.flush()?;
				Ok(written)
			}
			None => Ok(buf.len()),
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0
			.as_mut()
			.map_or(Ok(()), |log| log.appender.flush())
	}
}
