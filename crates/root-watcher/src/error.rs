use std::{fmt::Display, path::Path};

use thiserror::Error;
use tracing_appender::rolling::InitError;

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: std::io::Error,
	pub maybe_context: Option<String>,
}

impl Display for FileIOError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.as_ref()
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl FileIOError {
	pub fn from_std_io_err_with_msg(
		path: impl AsRef<Path>,
		source: std::io::Error,
		msg: impl Into<String>,
	) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(msg.into()),
		}
	}
}

/// Errors from `Coordinator::configure`. The previously installed state is left untouched.
#[derive(Debug, Error)]
pub enum ConfigurationError {
	#[error("configure requires options")]
	Missing,
	#[error(
		"options contain none of the recognized keys \
		(mainLogFile, workerLogFile, pollingIntervalMs, quiescenceMs)"
	)]
	NoRecognizedKeys,
	#[error("log file path must name a UTF-8 file: <path='{}'>", .0.display())]
	InvalidLogPath(Box<Path>),
	#[error("unable to open log file: <path='{}'>", .path.display())]
	LogFile {
		path: Box<Path>,
		#[source]
		source: InitError,
	},
	#[error("unable to write to log file: <path='{}'>", .path.display())]
	LogWrite {
		path: Box<Path>,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid options: {0}")]
	Parse(#[from] serde_json::Error),

	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error(transparent)]
	Boundary(#[from] BoundaryError),
}

/// Errors that make a single `watch` call fail.
#[derive(Debug, Error)]
pub enum PathError {
	#[error("watch target doesn't exist: <path='{}'>", .0.display())]
	NotFound(Box<Path>),
	#[error("watch target isn't a directory: <path='{}'>", .0.display())]
	NotADirectory(Box<Path>),
	#[error("directory is already being watched: <path='{}'>", .0.display())]
	AlreadyWatched(Box<Path>),

	#[error(transparent)]
	FileIO(#[from] FileIOError),
}

/// Failure of a single watch root.
///
/// Delivered to the root's handler; every variant is terminal for that root only.
#[derive(Debug, Error)]
pub enum WatchError {
	#[error("native watcher failed: <root='{}'>", .root.display())]
	Native {
		root: Box<Path>,
		#[source]
		source: notify::Error,
	},
	#[error("system limit of watched directories reached: <root='{}'>", .0.display())]
	ResourceExhausted(Box<Path>),
	#[error("event queue overflowed, some changes were lost: <root='{}'>", .0.display())]
	Overflow(Box<Path>),
	#[error("watched root was removed: <root='{}'>", .0.display())]
	RootRemoved(Box<Path>),
	#[error("connection to the watcher worker was lost")]
	Disconnected,
}

impl WatchError {
	/// Classify a `notify` failure for `root`.
	///
	/// Returns `None` for errors about a single vanished sub-path, which happen when
	/// entries are removed while the backend is still registering them.
	pub(crate) fn from_notify(root: &Path, e: notify::Error) -> Option<Self> {
		let about_root = e.paths.iter().any(|path| path == root);

		match e.kind {
			notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound if !about_root => {
				None
			}
			notify::ErrorKind::Io(ref io_err)
				if io_err.kind() == std::io::ErrorKind::NotFound && !about_root =>
			{
				None
			}
			_ => Some(Self::native(root, e)),
		}
	}

	/// A failure to set up or keep the backend running for `root`.
	pub(crate) fn native(root: &Path, e: notify::Error) -> Self {
		if matches!(e.kind, notify::ErrorKind::MaxFilesWatch) {
			Self::ResourceExhausted(root.into())
		} else {
			Self::Native {
				root: root.into(),
				source: e,
			}
		}
	}
}

/// The message passing boundary between the coordinator and the worker is unusable.
#[derive(Debug, Error)]
pub enum BoundaryError {
	#[error("watcher is not configured, call `configure` first")]
	NotConfigured,
	#[error("unable to spawn the watcher worker thread")]
	Spawn(#[source] std::io::Error),
	#[error("watcher worker is unreachable")]
	Disconnected,
	#[error("watcher was shut down")]
	ShutDown,
}

impl<T> From<async_channel::SendError<T>> for BoundaryError {
	fn from(_: async_channel::SendError<T>) -> Self {
		Self::Disconnected
	}
}

impl From<tokio::sync::oneshot::error::RecvError> for BoundaryError {
	fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
		Self::Disconnected
	}
}

/// Crate level error returned by `watch`, `unwatch` and `status`.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Configuration(#[from] ConfigurationError),
	#[error(transparent)]
	Path(#[from] PathError),
	#[error(transparent)]
	Watch(#[from] WatchError),
	#[error(transparent)]
	Boundary(#[from] BoundaryError),
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	#[test]
	fn vanished_sub_paths_are_not_fatal() {
		let root = Path::new("/watched");
		let e = notify::Error::path_not_found().add_path(PathBuf::from("/watched/tmp"));

		assert!(WatchError::from_notify(root, e).is_none());
	}

	#[test]
	fn losing_the_root_is_fatal() {
		let root = Path::new("/watched");
		let e = notify::Error::path_not_found().add_path(PathBuf::from("/watched"));

		assert!(matches!(
			WatchError::from_notify(root, e),
			Some(WatchError::Native { .. })
		));
	}

	#[test]
	fn watch_limit_is_resource_exhaustion() {
		let root = Path::new("/watched");
		let e = notify::Error::new(notify::ErrorKind::MaxFilesWatch);

		assert!(matches!(
			WatchError::from_notify(root, e),
			Some(WatchError::ResourceExhausted(_))
		));
	}

	#[test]
	fn file_io_error_mentions_path_and_context() {
		let e = FileIOError::from_std_io_err_with_msg(
			"/tmp/log.txt",
			std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
			"opening log",
		);

		let msg = e.to_string();
		assert!(msg.contains("(opening log)"));
		assert!(msg.contains("/tmp/log.txt"));
	}
}
