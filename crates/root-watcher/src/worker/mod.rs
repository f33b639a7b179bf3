use std::{collections::HashMap, path::PathBuf, pin::pin, thread};

use async_channel as chan;
use futures::{stream, StreamExt};
use futures_concurrency::stream::Merge;
use tokio::{spawn, sync::oneshot, task::JoinHandle};
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

use super::{
	coalescer::Coalescer,
	config::{WatchOptions, WorkerSettings},
	engine::NativeEngine,
	error::{BoundaryError, ConfigurationError, WatchError},
	event::RootId,
	logging::FileLogger,
	message::{Instruction, WorkerReport, WorkerStatus},
};

mod root;

const THREAD_NAME: &str = "sd-root-watcher";

/// Coordinator side handle of the worker thread.
#[derive(Debug)]
pub(crate) struct Worker {
	instructions_tx: chan::Sender<Instruction>,
	thread: Option<thread::JoinHandle<()>>,
}

/// Receives the worker's readiness once its log sink is open.
pub(crate) type ReadyRx = oneshot::Receiver<Result<(), ConfigurationError>>;

impl Worker {
	/// Spawn the worker thread. It opens its own log sink before reporting readiness
	/// through the returned receiver, and it won't handle any instruction before that.
	pub(crate) fn spawn(
		settings: WorkerSettings,
	) -> Result<(Self, ReadyRx, chan::Receiver<WorkerReport>), BoundaryError> {
		let (instructions_tx, instructions_rx) = chan::bounded(8);
		let (reports_tx, reports_rx) = chan::unbounded();
		let (ready_tx, ready_rx) = oneshot::channel();

		let thread = thread::Builder::new()
			.name(THREAD_NAME.to_string())
			.spawn(move || bootstrap(settings, instructions_rx, reports_tx, ready_tx))
			.map_err(BoundaryError::Spawn)?;

		Ok((
			Self {
				instructions_tx,
				thread: Some(thread),
			},
			ready_rx,
			reports_rx,
		))
	}

	pub(crate) fn comm(&self) -> WorkerComm {
		WorkerComm(self.instructions_tx.clone())
	}

	pub(crate) async fn reconfigure(
		&self,
		settings: WorkerSettings,
	) -> Result<(), ConfigurationError> {
		let (ack, ack_rx) = oneshot::channel();

		self.instructions_tx
			.send(Instruction::Reconfigure { settings, ack })
			.await
			.map_err(BoundaryError::from)?;

		ack_rx.await.map_err(BoundaryError::from)?
	}

	pub(crate) async fn status(&self) -> Result<WorkerStatus, BoundaryError> {
		let (tx, rx) = oneshot::channel();

		self.instructions_tx.send(Instruction::Status(tx)).await?;

		rx.await.map_err(Into::into)
	}

	/// Drop the boundary as if the worker crashed.
	#[cfg(test)]
	pub(crate) fn disconnect(&self) {
		self.instructions_tx.close();
	}

	/// Stop every root and wait for the thread to exit.
	#[instrument(skip(self))]
	pub(crate) async fn shutdown(&mut self) {
		let Some(thread) = self.thread.take() else {
			warn!("Trying to shutdown a watcher worker that was already shutdown");
			return;
		};

		let (tx, rx) = oneshot::channel();

		let acked = self
			.instructions_tx
			.send(Instruction::Shutdown(tx))
			.await
			.is_ok() && rx.await.is_ok();

		if !acked {
			warn!("Watcher worker was already gone when asked to shutdown;");
		}

		match tokio::task::spawn_blocking(move || thread.join()).await {
			Ok(Ok(())) => trace!("Watcher worker thread joined"),
			Ok(Err(e)) => error!(?e, "Watcher worker thread panicked;"),
			Err(e) => error!(?e, "Failed to join watcher worker thread;"),
		}
	}
}

impl Drop for Worker {
	fn drop(&mut self) {
		if self.thread.is_some() {
			// The worker stops every root once it drained the instructions already queued
			self.instructions_tx.close();
		}
	}
}

/// Cloneable sender half used by subscriptions.
#[derive(Debug, Clone)]
#[repr(transparent)]
pub(crate) struct WorkerComm(chan::Sender<Instruction>);

impl WorkerComm {
	pub(crate) async fn start_watching(
		&self,
		root_id: RootId,
		root: PathBuf,
		options: WatchOptions,
	) -> Result<Result<(), WatchError>, BoundaryError> {
		let (ack, ack_rx) = oneshot::channel();

		self.0
			.send(Instruction::StartWatching {
				root_id,
				root,
				options,
				ack,
			})
			.await?;

		ack_rx.await.map_err(Into::into)
	}

	pub(crate) async fn stop_watching(&self, root_id: RootId) -> Result<(), BoundaryError> {
		let (ack, ack_rx) = oneshot::channel();

		self.0
			.send(Instruction::StopWatching { root_id, ack })
			.await?;

		ack_rx.await.map_err(Into::into)
	}
}

fn bootstrap(
	settings: WorkerSettings,
	instructions_rx: chan::Receiver<Instruction>,
	reports_tx: chan::Sender<WorkerReport>,
	ready_tx: oneshot::Sender<Result<(), ConfigurationError>>,
) {
	let logger = FileLogger::new();

	if let Err(e) = logger.reconfigure(settings.log_file.as_deref()) {
		if ready_tx.send(Err(e)).is_err() {
			error!("Coordinator stopped waiting for the watcher worker;");
		}
		return;
	}

	let _dispatch_guard = tracing::dispatcher::set_default(&logger.dispatch());

	let runtime = match tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
	{
		Ok(runtime) => runtime,
		Err(e) => {
			error!(?e, "Failed to build the watcher worker runtime;");
			if ready_tx
				.send(Err(BoundaryError::Spawn(e).into()))
				.is_err()
			{
				error!("Coordinator stopped waiting for the watcher worker;");
			}
			return;
		}
	};

	if ready_tx.send(Ok(())).is_err() {
		warn!("Coordinator stopped waiting for the watcher worker, exiting;");
		return;
	}

	info!(?settings, "Watcher worker ready");

	runtime.block_on(run(logger, settings, instructions_rx, reports_tx));

	info!("Watcher worker gracefully shutdown");
}

struct RootHandle {
	stop_tx: chan::Sender<()>,
	handle: JoinHandle<()>,
}

impl RootHandle {
	async fn stop(self, root_id: RootId) {
		if self.stop_tx.send(()).await.is_err() {
			trace!(%root_id, "Root task already exited;");
		}

		if let Err(e) = self.handle.await {
			if e.is_panic() {
				error!(%root_id, ?e, "Root task panicked;");
			}
		}
	}
}

async fn run(
	logger: FileLogger,
	mut settings: WorkerSettings,
	instructions_rx: chan::Receiver<Instruction>,
	reports_tx: chan::Sender<WorkerReport>,
) {
	enum StreamMessage {
		Instruction(Instruction),
		RootExited(RootId),
		CoordinatorGone,
	}

	let (exited_tx, exited_rx) = chan::unbounded();

	let mut roots = HashMap::<RootId, RootHandle>::new();

	let mut msg_stream = pin!((
		instructions_rx
			.map(StreamMessage::Instruction)
			.chain(stream::once(async { StreamMessage::CoordinatorGone })),
		exited_rx.map(StreamMessage::RootExited),
	)
		.merge());

	while let Some(msg) = msg_stream.next().await {
		match msg {
			StreamMessage::Instruction(Instruction::StartWatching {
				root_id,
				root,
				options,
				ack,
			}) => {
				let res = NativeEngine::start(&root, options, settings.polling_interval).map(
					|(engine, events_rx)| {
						let (stop_tx, stop_rx) = chan::bounded(1);

						let handle = spawn(
							root::run(
								root_id,
								engine,
								events_rx,
								Coalescer::new(root.clone(), settings.quiescence),
								stop_rx,
								reports_tx.clone(),
								exited_tx.clone(),
							)
							.in_current_span(),
						);

						roots.insert(root_id, RootHandle { stop_tx, handle });
					},
				);

				if let Err(e) = &res {
					warn!(%root_id, root = %root.display(), ?e, "Unable to watch root;");
				}

				if ack.send(res).is_err() {
					// The coordinator will never learn about this root, so nobody can stop it
					if let Some(root_handle) = roots.remove(&root_id) {
						root_handle.stop(root_id).await;
					}
				}
			}

			StreamMessage::Instruction(Instruction::StopWatching { root_id, ack }) => {
				if let Some(root_handle) = roots.remove(&root_id) {
					root_handle.stop(root_id).await;
					debug!(%root_id, "Stopped watching root");
				} else {
					trace!(%root_id, "Root already stopped by itself;");
				}

				if ack.send(()).is_err() {
					warn!(%root_id, "Coordinator stopped waiting for an unwatch ack;");
				}
			}

			StreamMessage::Instruction(Instruction::Reconfigure {
				settings: new_settings,
				ack,
			}) => {
				let res = logger.reconfigure(new_settings.log_file.as_deref());

				if res.is_ok() {
					debug!(?new_settings, "Watcher worker reconfigured");
					settings = new_settings;
				}

				if ack.send(res).is_err() {
					warn!("Coordinator stopped waiting for a reconfigure ack;");
				}
			}

			StreamMessage::Instruction(Instruction::Status(tx)) => {
				if tx
					.send(WorkerStatus {
						roots: roots.len(),
						log_file: logger.path(),
					})
					.is_err()
				{
					warn!("Coordinator stopped waiting for the worker status;");
				}
			}

			StreamMessage::Instruction(Instruction::Shutdown(tx)) => {
				stop_all(&mut roots).await;

				if tx.send(()).is_err() {
					trace!("Nobody waited for the watcher worker shutdown");
				}

				break;
			}

			StreamMessage::RootExited(root_id) => {
				if roots.remove(&root_id).is_some() {
					debug!(%root_id, "Root task exited after a failure");
				}
			}

			StreamMessage::CoordinatorGone => {
				debug!("Coordinator dropped the watcher, stopping every root");
				stop_all(&mut roots).await;
				break;
			}
		}
	}
}

async fn stop_all(roots: &mut HashMap<RootId, RootHandle>) {
	for (root_id, root_handle) in roots.drain() {
		root_handle.stop(root_id).await;
	}
}
