use std::{pin::pin, time::Duration};

use async_channel as chan;
use futures::StreamExt;
use futures_concurrency::stream::Merge;
use notify::Event;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, instrument, trace, warn};

use super::super::{
	coalescer::Coalescer,
	engine::NativeEngine,
	error::WatchError,
	event::{NormalizedEvent, RootId},
	message::WorkerReport,
};

const ONE_SECOND: Duration = Duration::from_secs(1);
const MIN_TICK: Duration = Duration::from_millis(10);

/// Drive one root: translate the backend's events, feed them to the coalescer and
/// forward every batch it lets out. Exits when stopped or on a terminal failure.
#[instrument(
	name = "root_watcher",
	skip_all,
	fields(%root_id, root = %coalescer.root().display()),
)]
pub(super) async fn run(
	root_id: RootId,
	mut engine: NativeEngine,
	events_rx: chan::Receiver<notify::Result<Event>>,
	mut coalescer: Coalescer,
	stop_rx: chan::Receiver<()>,
	reports_tx: chan::Sender<WorkerReport>,
	exited_tx: chan::Sender<RootId>,
) {
	enum StreamMessage {
		NewEvent(notify::Result<Event>),
		Tick,
		Stop,
	}

	let tick_period = (coalescer.quiescence() / 2).max(MIN_TICK);

	let mut tick_interval = interval_at(Instant::now() + tick_period, tick_period);
	// In case of doubt check: https://docs.rs/tokio/latest/tokio/time/enum.MissedTickBehavior.html
	tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

	let mut last_health_check = Instant::now();

	let mut msg_stream = pin!((
		events_rx.map(StreamMessage::NewEvent),
		IntervalStream::new(tick_interval).map(|_| StreamMessage::Tick),
		stop_rx.map(|()| StreamMessage::Stop),
	)
		.merge());

	trace!("Root task started");

	while let Some(msg) = msg_stream.next().await {
		match msg {
			StreamMessage::NewEvent(Ok(event)) => {
				let now = std::time::Instant::now();
				for raw in engine.translate(event) {
					coalescer.push(raw, now);
				}
			}

			StreamMessage::NewEvent(Err(e)) => {
				match WatchError::from_notify(coalescer.root(), e) {
					Some(e) => {
						error!(?e, "Watcher error;");
						coalescer.fail(e);
					}
					None => debug!("Ignoring error about a path that vanished;"),
				}
			}

			StreamMessage::Tick => {
				if last_health_check.elapsed() >= ONE_SECOND {
					last_health_check = Instant::now();

					if !engine.is_alive() {
						coalescer.fail(WatchError::RootRemoved(coalescer.root().into()));
					}
				}

				if !coalescer.is_idle() && !coalescer.has_failed() {
					if let Some(events) = coalescer.flush(std::time::Instant::now()) {
						send_batch(root_id, events, &reports_tx).await;
					}
				}
			}

			StreamMessage::Stop => {
				debug!("Stopping root watcher");
				break;
			}
		}

		if coalescer.has_failed() {
			// Everything observed before the failure still reaches the subscriber first
			if let Some(events) = coalescer.flush_all(std::time::Instant::now()) {
				send_batch(root_id, events, &reports_tx).await;
			}

			if let Some(error) = coalescer.take_failure() {
				warn!(%error, "Root watcher failed;");
				if reports_tx
					.send(WorkerReport::Failed { root_id, error })
					.await
					.is_err()
				{
					error!("Unable to report root failure, coordinator is gone;");
				}
			}

			break;
		}
	}

	engine.stop();

	if exited_tx.send(root_id).await.is_err() {
		trace!("Worker supervisor already exited");
	}
}

async fn send_batch(
	root_id: RootId,
	events: Vec<NormalizedEvent>,
	reports_tx: &chan::Sender<WorkerReport>,
) {
	trace!(count = events.len(), "Sending batch");

	if reports_tx
		.send(WorkerReport::Batch { root_id, events })
		.await
		.is_err()
	{
		error!("Unable to send batch, coordinator is gone;");
	}
}
