use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use serde::{Deserialize, Serialize};

use super::error::{ConfigurationError, FileIOError};

pub(crate) const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(100);
pub(crate) const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(500);

/// Options accepted by `Coordinator::configure`.
///
/// Unknown keys are ignored, but at least one recognized key must be present.
/// An unset log file disables that side's log sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureOptions {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub main_log_file: Option<PathBuf>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub worker_log_file: Option<PathBuf>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub polling_interval_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quiescence_ms: Option<u64>,
}

impl ConfigureOptions {
	pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
		serde_json::from_str(json).map_err(Into::into)
	}

	/// Read options from a JSON file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
		let path = path.as_ref();
		let contents = std::fs::read_to_string(path).map_err(|e| {
			FileIOError::from_std_io_err_with_msg(path, e, "reading watcher options")
		})?;

		Self::from_json_str(&contents)
	}

	#[must_use]
	pub fn main_log_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.main_log_file = Some(path.into());
		self
	}

	#[must_use]
	pub fn worker_log_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.worker_log_file = Some(path.into());
		self
	}

	#[must_use]
	pub fn polling_interval_ms(mut self, ms: u64) -> Self {
		self.polling_interval_ms = Some(ms);
		self
	}

	#[must_use]
	pub fn quiescence_ms(mut self, ms: u64) -> Self {
		self.quiescence_ms = Some(ms);
		self
	}

	pub const fn is_empty(&self) -> bool {
		self.main_log_file.is_none()
			&& self.worker_log_file.is_none()
			&& self.polling_interval_ms.is_none()
			&& self.quiescence_ms.is_none()
	}

	pub(crate) fn validate(options: Option<Self>) -> Result<Self, ConfigurationError> {
		let options = options.ok_or(ConfigurationError::Missing)?;

		if options.is_empty() {
			return Err(ConfigurationError::NoRecognizedKeys);
		}

		Ok(options)
	}

	pub(crate) fn worker_settings(&self) -> WorkerSettings {
		WorkerSettings {
			log_file: self.worker_log_file.clone(),
			quiescence: self
				.quiescence_ms
				.map_or(DEFAULT_QUIESCENCE, Duration::from_millis),
			polling_interval: self
				.polling_interval_ms
				.map_or(DEFAULT_POLLING_INTERVAL, Duration::from_millis),
		}
	}
}

/// Settings handed to the worker when the boundary is established or reconfigured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkerSettings {
	pub log_file: Option<PathBuf>,
	pub quiescence: Duration,
	pub polling_interval: Duration,
}

/// Per root options for `Coordinator::watch_with`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchOptions {
	/// Watch the whole subtree instead of only the root's direct children.
	pub recursive: bool,
	/// Use a polling watcher instead of the platform's notification facility.
	pub poll: bool,
}

impl Default for WatchOptions {
	fn default() -> Self {
		Self {
			recursive: true,
			poll: false,
		}
	}
}
