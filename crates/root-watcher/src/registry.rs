use std::{
	collections::HashMap,
	fmt,
	path::PathBuf,
	sync::Arc,
};

use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{
	error::{PathError, WatchError},
	event::{NormalizedEvent, RootId},
};

/// Caller supplied callback, invoked once per delivered batch or with the root's
/// terminal error.
pub type Handler = Arc<dyn Fn(Result<Vec<NormalizedEvent>, WatchError>) + Send + Sync>;

struct Entry {
	root: PathBuf,
	handler: Handler,
	/// Held for reading while the handler runs, so retiring waits for in-flight deliveries.
	live: RwLock<bool>,
}

#[derive(Default)]
struct Roots {
	by_id: HashMap<RootId, Arc<Entry>>,
	by_path: HashMap<PathBuf, RootId>,
}

/// Routes batches to the handler of the exact root they were produced for.
#[derive(Default)]
pub(crate) struct Registry {
	roots: RwLock<Roots>,
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry").finish_non_exhaustive()
	}
}

impl Registry {
	pub(crate) async fn insert(&self, root: PathBuf, handler: Handler) -> Result<RootId, PathError> {
		let mut roots = self.roots.write().await;

		if roots.by_path.contains_key(&root) {
			return Err(PathError::AlreadyWatched(root.into()));
		}

		let root_id = RootId::new();

		roots.by_path.insert(root.clone(), root_id);
		roots.by_id.insert(
			root_id,
			Arc::new(Entry {
				root,
				handler,
				live: RwLock::new(true),
			}),
		);

		Ok(root_id)
	}

	fn remove(roots: &mut Roots, root_id: RootId) -> Option<Arc<Entry>> {
		let entry = roots.by_id.remove(&root_id)?;
		roots.by_path.remove(&entry.root);
		Some(entry)
	}

	/// Mark the root dead, waiting for any delivery in progress to finish.
	///
	/// Returns `false` if the root was already retired.
	pub(crate) async fn retire(&self, root_id: RootId) -> bool {
		let Some(entry) = Self::remove(&mut *self.roots.write().await, root_id) else {
			return false;
		};

		let mut live = entry.live.write().await;
		let was_live = *live;
		*live = false;

		was_live
	}

	/// Retire every root without notifying their handlers.
	pub(crate) async fn retire_all(&self) {
		let entries = {
			let mut roots = self.roots.write().await;
			roots.by_path.clear();
			roots.by_id.drain().map(|(_, entry)| entry).collect::<Vec<_>>()
		};

		for entry in entries {
			*entry.live.write().await = false;
		}
	}

	pub(crate) async fn dispatch(&self, root_id: RootId, events: Vec<NormalizedEvent>) {
		let Some(entry) = self.roots.read().await.by_id.get(&root_id).cloned() else {
			trace!(%root_id, "Dropping batch for a root that isn't watched anymore;");
			return;
		};

		let live = entry.live.read().await;
		if *live {
			(entry.handler)(Ok(events));
		} else {
			trace!(%root_id, "Dropping batch for a retired root;");
		}
	}

	/// Deliver a terminal error to the root's handler, then retire it.
	pub(crate) async fn fail(&self, root_id: RootId, error: WatchError) {
		let Some(entry) = Self::remove(&mut *self.roots.write().await, root_id) else {
			trace!(%root_id, ?error, "Dropping failure for a root that isn't watched anymore;");
			return;
		};

		Self::deliver_failure(&entry, error).await;
	}

	/// The boundary is gone: every live root gets exactly one `Disconnected` error.
	pub(crate) async fn fail_all(&self) {
		let entries = {
			let mut roots = self.roots.write().await;
			roots.by_path.clear();
			roots.by_id.drain().map(|(_, entry)| entry).collect::<Vec<_>>()
		};

		if !entries.is_empty() {
			debug!(count = entries.len(), "Notifying live roots about the lost worker");
		}

		for entry in entries {
			Self::deliver_failure(&entry, WatchError::Disconnected).await;
		}
	}

	async fn deliver_failure(entry: &Entry, error: WatchError) {
		let mut live = entry.live.write().await;
		if *live {
			*live = false;
			(entry.handler)(Err(error));
		}
	}

	pub(crate) async fn len(&self) -> usize {
		self.roots.read().await.by_id.len()
	}
}
