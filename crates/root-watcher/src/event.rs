//! Event model shared by the worker and the coordinator.

use std::{
	fmt,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one `watch` call. Batches crossing the boundary are tagged with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RootId(Uuid);

impl RootId {
	pub(crate) fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl fmt::Display for RootId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
	Created,
	Modified,
	Deleted,
	Renamed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
	File,
	Directory,
}

/// Platform independent description of a single filesystem change.
///
/// `new_path` is empty unless `action` is [`EventType::Renamed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
	#[serde(rename = "type")]
	pub action: EventType,
	pub kind: EntryKind,
	pub old_path: PathBuf,
	pub new_path: PathBuf,
}

impl NormalizedEvent {
	pub fn created(kind: EntryKind, path: impl Into<PathBuf>) -> Self {
		Self::single(EventType::Created, kind, path.into())
	}

	pub fn modified(kind: EntryKind, path: impl Into<PathBuf>) -> Self {
		Self::single(EventType::Modified, kind, path.into())
	}

	pub fn deleted(kind: EntryKind, path: impl Into<PathBuf>) -> Self {
		Self::single(EventType::Deleted, kind, path.into())
	}

	pub fn renamed(kind: EntryKind, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
		Self {
			action: EventType::Renamed,
			kind,
			old_path: from.into(),
			new_path: to.into(),
		}
	}

	fn single(action: EventType, kind: EntryKind, path: PathBuf) -> Self {
		Self {
			action,
			kind,
			old_path: path,
			new_path: PathBuf::new(),
		}
	}

	/// Whether this event touches `path`, as either its old or its new path.
	pub fn involves(&self, path: impl AsRef<Path>) -> bool {
		let path = path.as_ref();
		self.old_path == path || (self.action == EventType::Renamed && self.new_path == path)
	}
}

/// What the platform reported, before any pairing or merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
	Created,
	Modified,
	Removed,
	/// Old half of a rename, `cookie` links it with its [`RawKind::RenamedTo`].
	RenamedFrom,
	RenamedTo,
	/// Both halves at once, `paths` holds `[from, to]`.
	RenamedBoth,
	/// A rename half that doesn't say which side it is (FSEvents, kqueue).
	RenamedAny,
	/// A watched directory reported that it was moved itself; its parent reports the rename.
	MovedSelf,
	/// The kernel dropped notifications, the view of the tree can no longer be trusted.
	Overflow,
}

/// Platform native record, consumed right away by the coalescer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
	pub kind: RawKind,
	pub paths: Vec<PathBuf>,
	pub cookie: Option<usize>,
	pub entry: Option<EntryKind>,
}

impl RawNotification {
	pub fn new(kind: RawKind, path: impl Into<PathBuf>) -> Self {
		Self {
			kind,
			paths: vec![path.into()],
			cookie: None,
			entry: None,
		}
	}

	pub fn both(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
		Self {
			kind: RawKind::RenamedBoth,
			paths: vec![from.into(), to.into()],
			cookie: None,
			entry: None,
		}
	}

	pub fn overflow() -> Self {
		Self {
			kind: RawKind::Overflow,
			paths: vec![],
			cookie: None,
			entry: None,
		}
	}

	#[must_use]
	pub fn with_cookie(mut self, cookie: Option<usize>) -> Self {
		self.cookie = cookie;
		self
	}

	#[must_use]
	pub fn with_entry(mut self, entry: Option<EntryKind>) -> Self {
		self.entry = entry;
		self
	}
}
