use std::path::PathBuf;

use tokio::sync::oneshot;

use super::{
	config::{WatchOptions, WorkerSettings},
	error::{ConfigurationError, WatchError},
	event::{NormalizedEvent, RootId},
};

/// Coordinator to worker.
#[derive(Debug)]
pub(crate) enum Instruction {
	StartWatching {
		root_id: RootId,
		root: PathBuf,
		options: WatchOptions,
		ack: oneshot::Sender<Result<(), WatchError>>,
	},
	StopWatching {
		root_id: RootId,
		ack: oneshot::Sender<()>,
	},
	Reconfigure {
		settings: WorkerSettings,
		ack: oneshot::Sender<Result<(), ConfigurationError>>,
	},
	Status(oneshot::Sender<WorkerStatus>),
	Shutdown(oneshot::Sender<()>),
}

/// Worker to coordinator, every report is tagged with the root it belongs to.
#[derive(Debug)]
pub(crate) enum WorkerReport {
	Batch {
		root_id: RootId,
		events: Vec<NormalizedEvent>,
	},
	Failed {
		root_id: RootId,
		error: WatchError,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkerStatus {
	pub roots: usize,
	pub log_file: Option<PathBuf>,
}
