use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use async_channel as chan;
use notify::{Config, Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, trace};

use super::{
	config::WatchOptions,
	error::WatchError,
	event::RawNotification,
	platform::{self, EventTranslator},
};

/// The platform notification facility for a single root.
///
/// The backend is registered by the time [`NativeEngine::start`] returns, so every change
/// made afterwards ends up in the returned channel.
pub(crate) struct NativeEngine {
	root: PathBuf,
	watcher: Box<dyn Watcher + Send>,
	translator: Box<dyn EventTranslator>,
}

impl NativeEngine {
	pub(crate) fn start(
		root: &Path,
		options: WatchOptions,
		polling_interval: Duration,
	) -> Result<(Self, chan::Receiver<notify::Result<Event>>), WatchError> {
		let (events_tx, events_rx) = chan::unbounded();

		let handler = {
			let root = root.to_path_buf();
			move |result| {
				if !events_tx.is_closed() {
					// SAFETY: we are not blocking the thread as this is an unbounded channel
					if events_tx.send_blocking(result).is_err() {
						error!(root = %root.display(), "Unable to send watcher event to the root task;");
					}
				} else {
					trace!(root = %root.display(), "Dropping file system event for a stopped root;");
				}
			}
		};

		let (mut watcher, translator): (Box<dyn Watcher + Send>, _) = if options.poll {
			(
				Box::new(
					PollWatcher::new(
						handler,
						Config::default().with_poll_interval(polling_interval),
					)
					.map_err(|e| WatchError::native(root, e))?,
				),
				platform::polling(),
			)
		} else {
			(
				Box::new(
					RecommendedWatcher::new(handler, Config::default())
						.map_err(|e| WatchError::native(root, e))?,
				),
				platform::native(),
			)
		};

		let mode = if options.recursive {
			RecursiveMode::Recursive
		} else {
			RecursiveMode::NonRecursive
		};

		watcher
			.watch(root, mode)
			.map_err(|e| WatchError::native(root, e))?;

		trace!(root = %root.display(), ?options, "Now watching root");

		Ok((
			Self {
				root: root.to_path_buf(),
				watcher,
				translator,
			},
			events_rx,
		))
	}

	pub(crate) fn translate(&mut self, event: Event) -> Vec<RawNotification> {
		self.translator.translate(event)
	}

	/// Whether the root still exists as a directory.
	pub(crate) fn is_alive(&self) -> bool {
		std::fs::metadata(&self.root).is_ok_and(|metadata| metadata.is_dir())
	}

	pub(crate) fn stop(mut self) {
		if let Err(e) = self.watcher.unwatch(&self.root) {
			// Fails when the root is already gone, the backend dropped the watch by itself
			trace!(?e, root = %self.root.display(), "Unable to unwatch root;");
		} else {
			trace!(root = %self.root.display(), "Stop watching root");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reports_changes_made_after_start() {
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path().canonicalize().unwrap();

		let (engine, events_rx) =
			NativeEngine::start(&root, WatchOptions::default(), Duration::from_millis(50))
				.unwrap();

		std::fs::write(root.join("file.txt"), b"hello").unwrap();

		let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
			.await
			.unwrap()
			.unwrap()
			.unwrap();

		assert!(event.paths.iter().any(|path| path.ends_with("file.txt")));
		assert!(engine.is_alive());

		engine.stop();
	}

	#[test]
	fn missing_root_fails_to_start() {
		let dir = tempfile::tempdir().unwrap();

		assert!(NativeEngine::start(
			&dir.path().join("missing"),
			WatchOptions::default(),
			Duration::from_millis(50)
		)
		.is_err());
	}

	#[tokio::test]
	async fn polling_engine_sees_new_files() {
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path().canonicalize().unwrap();

		let (engine, events_rx) = NativeEngine::start(
			&root,
			WatchOptions {
				recursive: true,
				poll: true,
			},
			Duration::from_millis(50),
		)
		.unwrap();

		std::fs::write(root.join("polled.txt"), b"hello").unwrap();

		let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
			.await
			.unwrap()
			.unwrap()
			.unwrap();

		assert!(event.paths.iter().any(|path| path.ends_with("polled.txt")));

		engine.stop();
	}
}
