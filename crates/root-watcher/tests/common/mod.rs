#![allow(dead_code)]

use sd_root_watcher::{ConfigureOptions, Coordinator, NormalizedEvent, WatchError};

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use tempfile::TempDir;
use tokio::{
	sync::mpsc,
	time::{timeout_at, Instant},
};

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub type Delivery = Result<Vec<NormalizedEvent>, WatchError>;

/// Everything a handler received, in delivery order.
#[derive(Debug)]
pub struct Recorder {
	rx: mpsc::UnboundedReceiver<Delivery>,
	pub events: Vec<NormalizedEvent>,
	pub errors: Vec<WatchError>,
}

pub fn recorder() -> (impl Fn(Delivery) + Send + Sync + 'static, Recorder) {
	let (tx, rx) = mpsc::unbounded_channel();

	(
		move |delivery| {
			// The receiver is gone once the test finished
			let _ = tx.send(delivery);
		},
		Recorder {
			rx,
			events: vec![],
			errors: vec![],
		},
	)
}

impl Recorder {
	fn record(&mut self, delivery: Delivery) {
		match delivery {
			Ok(batch) => {
				assert!(!batch.is_empty(), "handlers never receive empty batches");
				self.events.extend(batch);
			}
			Err(e) => self.errors.push(e),
		}
	}

	/// Keep receiving until `done` holds for what was received so far, or until the timeout.
	pub async fn wait_until(&mut self, done: impl Fn(&Self) -> bool) -> bool {
		let deadline = Instant::now() + TIMEOUT;

		while !done(self) {
			match timeout_at(deadline, self.rx.recv()).await {
				Ok(Some(delivery)) => self.record(delivery),
				Ok(None) | Err(_) => return done(self),
			}
		}

		true
	}

	pub async fn wait_for_events(&mut self, expected: &[NormalizedEvent]) -> bool {
		self.wait_until(|recorder| contains_in_order(&recorder.events, expected))
			.await
	}

	pub async fn wait_for_error(&mut self) -> bool {
		self.wait_until(|recorder| !recorder.errors.is_empty()).await
	}

	/// Collect whatever arrives during `period`.
	pub async fn drain_for(&mut self, period: Duration) {
		let deadline = Instant::now() + period;

		while let Ok(Some(delivery)) = timeout_at(deadline, self.rx.recv()).await {
			self.record(delivery);
		}
	}

	pub fn received_nothing(&self) -> bool {
		self.events.is_empty() && self.errors.is_empty()
	}
}

/// Whether `expected` shows up in `events` in this order, other events in between allowed.
pub fn contains_in_order(events: &[NormalizedEvent], expected: &[NormalizedEvent]) -> bool {
	let mut events = events.iter();
	expected
		.iter()
		.all(|wanted| events.any(|event| event == wanted))
}

/// A temporary directory along with its canonical path, which is what events carry.
pub fn canonical_tempdir() -> (TempDir, PathBuf) {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().canonicalize().unwrap();
	(dir, path)
}

pub fn make_dir(parent: &Path, name: &str) -> PathBuf {
	let path = parent.join(name);
	std::fs::create_dir(&path).unwrap();
	path
}

/// A configured coordinator logging to files in its own temporary directory.
pub async fn configured() -> (Coordinator, TempDir) {
	let logs = tempfile::tempdir().unwrap();

	let coordinator = Coordinator::new();
	coordinator
		.configure(Some(
			ConfigureOptions::default()
				.main_log_file(logs.path().join("main.log"))
				.worker_log_file(logs.path().join("worker.log"))
				.quiescence_ms(50)
				.polling_interval_ms(100),
		))
		.await
		.unwrap();

	(coordinator, logs)
}
