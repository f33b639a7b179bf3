use std::{
	fmt,
	path::{Path, PathBuf},
	sync::Arc,
};

use async_channel as chan;
use tokio::{runtime::Handle, spawn, sync::RwLock, task::JoinHandle};
use tracing::{debug, error, info, instrument, trace, warn, Dispatch};
use tracing::instrument::WithSubscriber;

use super::{
	config::{ConfigureOptions, WatchOptions},
	error::{BoundaryError, ConfigurationError, Error, FileIOError, PathError, WatchError},
	event::{NormalizedEvent, RootId},
	logging::FileLogger,
	message::WorkerReport,
	registry::{Handler, Registry},
	worker::{Worker, WorkerComm},
};

/// Entry point of the watcher.
///
/// Owns the coordinator log sink, the subscription registry and, once configured, the
/// worker thread running every native watcher. Handlers are invoked from a task spawned
/// on the runtime that called [`Coordinator::configure`].
pub struct Coordinator {
	main_log: FileLogger,
	dispatch: Dispatch,
	registry: Arc<Registry>,
	boundary: RwLock<BoundaryState>,
}

enum BoundaryState {
	Unconfigured,
	Running(Boundary),
	ShutDown,
}

struct Boundary {
	worker: Worker,
	dispatcher: JoinHandle<()>,
}

/// Snapshot of the watcher's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
	pub main_log_file: Option<PathBuf>,
	pub worker_log_file: Option<PathBuf>,
	/// Live subscriptions in the registry.
	pub subscriptions: usize,
	/// Roots with a running engine on the worker.
	pub worker_roots: usize,
}

impl Default for Coordinator {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Coordinator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Coordinator")
			.field("main_log", &self.main_log)
			.field("registry", &self.registry)
			.finish_non_exhaustive()
	}
}

impl Coordinator {
	pub fn new() -> Self {
		let main_log = FileLogger::new();

		Self {
			dispatch: main_log.dispatch(),
			main_log,
			registry: Arc::default(),
			boundary: RwLock::new(BoundaryState::Unconfigured),
		}
	}

	/// Set up logging and the worker.
	///
	/// The first successful call spawns the worker thread and returns once both log sinks
	/// are open and the worker is ready. Later calls only reconfigure logging and worker
	/// settings; reopening a log file that is already open is a no-op. On failure nothing
	/// changes.
	pub async fn configure(
		&self,
		options: Option<ConfigureOptions>,
	) -> Result<(), ConfigurationError> {
		self.configure_inner(options)
			.with_subscriber(self.dispatch.clone())
			.await
	}

	#[instrument(skip_all, err)]
	async fn configure_inner(
		&self,
		options: Option<ConfigureOptions>,
	) -> Result<(), ConfigurationError> {
		let options = ConfigureOptions::validate(options)?;

		let mut boundary = self.boundary.write().await;

		match &mut *boundary {
			BoundaryState::ShutDown => Err(BoundaryError::ShutDown.into()),

			BoundaryState::Unconfigured => {
				let main_log_change = self.main_log.prepare(options.main_log_file.as_deref())?;

				let (worker, ready_rx, reports_rx) = Worker::spawn(options.worker_settings())?;

				ready_rx.await.map_err(BoundaryError::from)??;

				self.main_log.apply(main_log_change);

				let dispatcher = spawn(
					dispatch_reports(Arc::clone(&self.registry), reports_rx)
						.with_subscriber(self.dispatch.clone()),
				);

				info!(?options, "Watcher configured");

				*boundary = BoundaryState::Running(Boundary { worker, dispatcher });

				Ok(())
			}

			BoundaryState::Running(running) => {
				let main_log_change = self.main_log.prepare(options.main_log_file.as_deref())?;

				running.worker.reconfigure(options.worker_settings()).await?;

				self.main_log.apply(main_log_change);

				debug!(?options, "Watcher reconfigured");

				Ok(())
			}
		}
	}

	/// Watch `path` recursively with the platform's native facility.
	pub async fn watch(
		&self,
		path: impl AsRef<Path>,
		handler: impl Fn(Result<Vec<NormalizedEvent>, WatchError>) + Send + Sync + 'static,
	) -> Result<Subscription, Error> {
		self.watch_with(path, WatchOptions::default(), handler).await
	}

	/// Watch `path`, delivering every batch of events under it to `handler`.
	///
	/// Once this resolves, every change made under the root will be delivered. The root's
	/// terminal failure, if any, is delivered to `handler` too and ends the subscription.
	pub async fn watch_with(
		&self,
		path: impl AsRef<Path>,
		options: WatchOptions,
		handler: impl Fn(Result<Vec<NormalizedEvent>, WatchError>) + Send + Sync + 'static,
	) -> Result<Subscription, Error> {
		self.start_watching(path.as_ref(), options, Arc::new(handler))
			.with_subscriber(self.dispatch.clone())
			.await
	}

	#[instrument(skip_all, fields(path = %path.display(), ?options), err)]
	async fn start_watching(
		&self,
		path: &Path,
		options: WatchOptions,
		handler: Handler,
	) -> Result<Subscription, Error> {
		let worker_comm = self.worker_comm().await?;

		let root = canonical_directory(path)?;

		let root_id = self.registry.insert(root.clone(), handler).await?;

		let pending = PendingRoot {
			root_id,
			registry: Arc::clone(&self.registry),
			worker_comm: worker_comm.clone(),
			dispatch: self.dispatch.clone(),
			armed: true,
		};

		let res = match worker_comm
			.start_watching(root_id, root.clone(), options)
			.await
		{
			Ok(Ok(())) => Ok(()),
			Ok(Err(e)) => Err(Error::from(e)),
			Err(e) => Err(Error::from(e)),
		};

		if let Err(e) = res {
			self.registry.retire(root_id).await;
			pending.defuse();
			return Err(e);
		}

		pending.defuse();

		debug!(%root_id, root = %root.display(), "Root watched");

		Ok(Subscription {
			root,
			root_id,
			registry: Arc::clone(&self.registry),
			worker_comm,
			dispatch: self.dispatch.clone(),
		})
	}

	async fn worker_comm(&self) -> Result<WorkerComm, BoundaryError> {
		match &*self.boundary.read().await {
			BoundaryState::Unconfigured => Err(BoundaryError::NotConfigured),
			BoundaryState::Running(running) => Ok(running.worker.comm()),
			BoundaryState::ShutDown => Err(BoundaryError::ShutDown),
		}
	}

	pub async fn status(&self) -> Result<Status, Error> {
		let boundary = self.boundary.read().await;

		let BoundaryState::Running(running) = &*boundary else {
			return Err(match &*boundary {
				BoundaryState::ShutDown => BoundaryError::ShutDown,
				_ => BoundaryError::NotConfigured,
			}
			.into());
		};

		let worker_status = running.worker.status().await?;

		Ok(Status {
			main_log_file: self.main_log.path(),
			worker_log_file: worker_status.log_file,
			subscriptions: self.registry.len().await,
			worker_roots: worker_status.roots,
		})
	}

	/// Stop every root and the worker. Live subscriptions end without any notification,
	/// and every later call fails with [`BoundaryError::ShutDown`].
	pub async fn shutdown(&self) {
		self.shutdown_inner()
			.with_subscriber(self.dispatch.clone())
			.await;
	}

	#[instrument(skip_all)]
	async fn shutdown_inner(&self) {
		let state = std::mem::replace(&mut *self.boundary.write().await, BoundaryState::ShutDown);

		match state {
			BoundaryState::Running(Boundary {
				mut worker,
				dispatcher,
			}) => {
				self.registry.retire_all().await;

				worker.shutdown().await;

				if let Err(e) = dispatcher.await {
					error!(?e, "Failed to join the report dispatcher task;");
				}

				info!("Watcher gracefully shutdown");
			}
			BoundaryState::Unconfigured => trace!("Shutting down a watcher that was never configured"),
			BoundaryState::ShutDown => warn!("Trying to shutdown a watcher that was already shutdown"),
		}
	}
}

/// Consume worker reports until the worker goes away.
async fn dispatch_reports(registry: Arc<Registry>, reports_rx: chan::Receiver<WorkerReport>) {
	while let Ok(report) = reports_rx.recv().await {
		match report {
			WorkerReport::Batch { root_id, events } => registry.dispatch(root_id, events).await,
			WorkerReport::Failed { root_id, error } => {
				debug!(%root_id, %error, "Root failed;");
				registry.fail(root_id, error).await;
			}
		}
	}

	trace!("Watcher worker closed its report channel");

	registry.fail_all().await;
}

/// A root registered by a `watch` call that hasn't returned yet.
///
/// If that call is dropped midway, the root is retired and its engine stopped, so the
/// path can be watched again.
struct PendingRoot {
	root_id: RootId,
	registry: Arc<Registry>,
	worker_comm: WorkerComm,
	dispatch: Dispatch,
	armed: bool,
}

impl PendingRoot {
	fn defuse(mut self) {
		self.armed = false;
	}
}

impl Drop for PendingRoot {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let root_id = self.root_id;
		let registry = Arc::clone(&self.registry);
		let worker_comm = self.worker_comm.clone();

		let cleanup = async move {
			if !registry.retire(root_id).await {
				return;
			}

			match worker_comm.stop_watching(root_id).await {
				Ok(()) => debug!(%root_id, "Cancelled watch cleaned up"),
				Err(e) => trace!(%root_id, ?e, "Worker gone while cleaning up a cancelled watch;"),
			}
		}
		.with_subscriber(self.dispatch.clone());

		match Handle::try_current() {
			Ok(handle) => {
				handle.spawn(cleanup);
			}
			Err(e) => {
				error!(%root_id, ?e, "No runtime to clean up a cancelled watch on;");
			}
		}
	}
}

fn canonical_directory(path: &Path) -> Result<PathBuf, PathError> {
	let root = std::fs::canonicalize(path).map_err(|e| {
		if e.kind() == std::io::ErrorKind::NotFound {
			PathError::NotFound(path.into())
		} else {
			FileIOError::from_std_io_err_with_msg(path, e, "canonicalizing watch root").into()
		}
	})?;

	let metadata = std::fs::metadata(&root)
		.map_err(|e| FileIOError::from_std_io_err_with_msg(&root, e, "reading watch root"))?;

	if !metadata.is_dir() {
		return Err(PathError::NotADirectory(path.into()));
	}

	Ok(root)
}

/// Handle to one watched root.
///
/// Clones share the same root, unwatching through any of them ends it for all.
#[derive(Clone)]
pub struct Subscription {
	root: PathBuf,
	root_id: RootId,
	registry: Arc<Registry>,
	worker_comm: WorkerComm,
	dispatch: Dispatch,
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("root", &self.root)
			.field("root_id", &self.root_id)
			.finish_non_exhaustive()
	}
}

impl Subscription {
	/// Canonical path of the watched root.
	pub fn root(&self) -> &Path {
		&self.root
	}

	pub const fn root_id(&self) -> RootId {
		self.root_id
	}

	/// Stop watching.
	///
	/// Waits for a delivery in progress to finish and for the worker to tear the engine
	/// down; the handler is never invoked again afterwards. Unwatching a root that was
	/// already unwatched or that failed resolves right away.
	pub async fn unwatch(&self) -> Result<(), Error> {
		self.unwatch_inner()
			.with_subscriber(self.dispatch.clone())
			.await
	}

	#[instrument(skip_all, fields(root_id = %self.root_id, root = %self.root.display()), err)]
	async fn unwatch_inner(&self) -> Result<(), Error> {
		if !self.registry.retire(self.root_id).await {
			trace!("Root was already unwatched");
			return Ok(());
		}

		self.worker_comm.stop_watching(self.root_id).await?;

		debug!("Root unwatched");

		Ok(())
	}
}
