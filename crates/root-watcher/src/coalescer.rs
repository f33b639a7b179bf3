//! Per root normalization of raw notifications.
//!
//! The [`Coalescer`] keeps the pending sequence of a root as a list of slots. A slot is
//! either a finished [`NormalizedEvent`] or a rename half still waiting for its
//! counterpart; only the ready prefix of the list is ever emitted, so an unresolved half
//! holds back everything that happened after it.
//!
//! Merging is deliberately narrow: a `modified` is folded into the previous pending event
//! only when that event is a `modified` of the same path, and a raw rename pair becomes a
//! single `renamed`. Everything else is reported as it happened.

use std::{
	collections::{HashMap, HashSet, VecDeque},
	path::{Path, PathBuf},
	time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use super::{
	error::WatchError,
	event::{EntryKind, EventType, NormalizedEvent, RawKind, RawNotification},
};

/// Continuous activity still gets delivered after this many quiescence windows.
const MAX_DELAY_FACTOR: u32 = 10;

/// How many paired rename cookies we remember to skip the trailing `Both` event.
const PAIRED_COOKIES_CAPACITY: usize = 64;

/// Looks at the filesystem when a notification doesn't say what kind of entry it's about.
pub(crate) trait Probe: Send + 'static {
	/// `None` when nothing exists at `path`.
	fn kind_of(&self, path: &Path) -> Option<EntryKind>;
}

#[derive(Debug, Default)]
pub(crate) struct FsProbe;

impl Probe for FsProbe {
	fn kind_of(&self, path: &Path) -> Option<EntryKind> {
		std::fs::symlink_metadata(path).ok().map(|metadata| {
			if metadata.is_dir() {
				EntryKind::Directory
			} else {
				EntryKind::File
			}
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
	From,
	/// FSEvents and kqueue don't tell which half of a rename they report.
	Unknown,
}

#[derive(Debug)]
struct RenameHalf {
	side: Side,
	cookie: Option<usize>,
	path: PathBuf,
	entry: Option<EntryKind>,
	since: Instant,
}

#[derive(Debug)]
enum Slot {
	Ready { event: NormalizedEvent, at: Instant },
	AwaitingRename(RenameHalf),
}

impl Slot {
	const fn queued_at(&self) -> Instant {
		match self {
			Self::Ready { at, .. } => *at,
			Self::AwaitingRename(half) => half.since,
		}
	}
}

/// Last thing that happened to a path, as far as the pending sequence knows.
#[derive(Debug, Clone, Copy)]
struct Seen {
	action: EventType,
	at: Instant,
}

pub(crate) struct Coalescer {
	root: PathBuf,
	quiescence: Duration,
	max_delay: Duration,
	probe: Box<dyn Probe>,

	pending: VecDeque<Slot>,
	last_activity: Option<Instant>,
	last_seen: HashMap<PathBuf, Seen>,
	known_directories: HashSet<PathBuf>,
	paired_cookies: VecDeque<usize>,

	failure: Option<WatchError>,
}

impl Coalescer {
	pub(crate) fn new(root: impl Into<PathBuf>, quiescence: Duration) -> Self {
		Self::with_probe(root, quiescence, FsProbe)
	}

	pub(crate) fn with_probe(
		root: impl Into<PathBuf>,
		quiescence: Duration,
		probe: impl Probe,
	) -> Self {
		Self {
			root: root.into(),
			quiescence,
			max_delay: quiescence * MAX_DELAY_FACTOR,
			probe: Box::new(probe),
			pending: VecDeque::new(),
			last_activity: None,
			last_seen: HashMap::new(),
			known_directories: HashSet::new(),
			paired_cookies: VecDeque::with_capacity(PAIRED_COOKIES_CAPACITY),
			failure: None,
		}
	}

	pub(crate) fn root(&self) -> &Path {
		&self.root
	}

	pub(crate) const fn quiescence(&self) -> Duration {
		self.quiescence
	}

	pub(crate) fn is_idle(&self) -> bool {
		self.pending.is_empty()
	}

	/// The terminal error of this root, if one was observed. Nothing is accepted afterwards.
	pub(crate) fn take_failure(&mut self) -> Option<WatchError> {
		self.failure.take()
	}

	pub(crate) const fn has_failed(&self) -> bool {
		self.failure.is_some()
	}

	/// Record a terminal error that didn't come through the raw stream, like a failed
	/// health check or a backend error.
	pub(crate) fn fail(&mut self, error: WatchError) {
		if self.failure.is_none() {
			self.failure = Some(error);
		}
	}

	pub(crate) fn push(&mut self, raw: RawNotification, now: Instant) {
		if self.failure.is_some() {
			return;
		}

		self.last_activity = Some(now);

		let RawNotification {
			kind,
			mut paths,
			cookie,
			entry,
		} = raw;

		if kind == RawKind::Overflow {
			warn!(root = %self.root.display(), "Native event queue overflowed;");
			self.fail(WatchError::Overflow(self.root.as_path().into()));
			return;
		}

		if kind == RawKind::RenamedBoth && paths.len() == 2 {
			let to = paths.swap_remove(1);
			let from = paths.swap_remove(0);
			self.push_rename_pair(from, to, cookie, entry, now);
			return;
		}

		for path in paths {
			if path == self.root {
				self.root_event(kind);
				return;
			}

			if !path.starts_with(&self.root) {
				trace!(path = %path.display(), "Ignoring event outside of the root;");
				continue;
			}

			match kind {
				RawKind::Created => self.push_created(path, entry, now),
				RawKind::Modified => self.push_modified(path, entry, now),
				RawKind::Removed => self.push_removed(path, entry, now),
				RawKind::RenamedFrom => self.pending.push_back(Slot::AwaitingRename(RenameHalf {
					side: Side::From,
					cookie,
					path,
					entry,
					since: now,
				})),
				RawKind::RenamedTo => self.push_rename_to(path, cookie, entry, now),
				RawKind::RenamedAny | RawKind::RenamedBoth => self.push_ambiguous(path, entry, now),
				// The parent directory reports the rename.
				RawKind::MovedSelf | RawKind::Overflow => {}
			}
		}
	}

	/// Emit the ready prefix if the root has been quiet for a whole window, or if the
	/// oldest pending event waited for too long already.
	pub(crate) fn flush(&mut self, now: Instant) -> Option<Vec<NormalizedEvent>> {
		self.resolve_expired_halves(now, false);

		let quiet = self
			.last_activity
			.map_or(true, |last| now.saturating_duration_since(last) >= self.quiescence);

		let overdue = self
			.pending
			.front()
			.is_some_and(|slot| now.saturating_duration_since(slot.queued_at()) >= self.max_delay);

		if !quiet && !overdue {
			return None;
		}

		self.forget_old_paths(now);

		self.take_ready()
	}

	/// Resolve every pending rename half and emit everything, used before stopping a root.
	pub(crate) fn flush_all(&mut self, now: Instant) -> Option<Vec<NormalizedEvent>> {
		self.resolve_expired_halves(now, true);

		self.take_ready()
	}

	fn take_ready(&mut self) -> Option<Vec<NormalizedEvent>> {
		let mut events = Vec::new();

		while let Some(Slot::Ready { .. }) = self.pending.front() {
			if let Some(Slot::Ready { event, .. }) = self.pending.pop_front() {
				events.push(event);
			}
		}

		(!events.is_empty()).then_some(events)
	}

	fn root_event(&mut self, kind: RawKind) {
		let gone = match kind {
			RawKind::Removed | RawKind::MovedSelf | RawKind::RenamedFrom => true,
			// Something else may have been renamed onto the root path.
			RawKind::RenamedAny | RawKind::RenamedBoth | RawKind::RenamedTo => {
				self.probe.kind_of(&self.root) != Some(EntryKind::Directory)
			}
			RawKind::Created | RawKind::Modified | RawKind::Overflow => false,
		};

		if gone {
			debug!(root = %self.root.display(), ?kind, "Watched root is gone;");
			self.fail(WatchError::RootRemoved(self.root.as_path().into()));
		}
	}

	fn push_created(&mut self, path: PathBuf, entry: Option<EntryKind>, now: Instant) {
		let kind = self.existing_kind(&path, entry);
		self.push_ready(NormalizedEvent::created(kind, path), now);
	}

	fn push_modified(&mut self, path: PathBuf, entry: Option<EntryKind>, now: Instant) {
		let adjacent = matches!(
			self.pending.back(),
			Some(Slot::Ready { event, .. })
				if event.action == EventType::Modified && event.old_path == path
		);

		if adjacent
			&& self
				.last_seen
				.get(&path)
				.is_some_and(|seen| seen.action == EventType::Modified)
		{
			trace!(path = %path.display(), "Merging modification burst;");
			return;
		}

		let kind = self.existing_kind(&path, entry);
		self.push_ready(NormalizedEvent::modified(kind, path), now);
	}

	fn push_removed(&mut self, path: PathBuf, entry: Option<EntryKind>, now: Instant) {
		if self
			.last_seen
			.get(&path)
			.is_some_and(|seen| seen.action == EventType::Deleted)
		{
			// inotify reports a removed directory both from its parent and from itself
			trace!(path = %path.display(), "Skipping duplicated removal;");
			return;
		}

		let kind = self.gone_kind(&path, entry);
		self.push_ready(NormalizedEvent::deleted(kind, path), now);
	}

	fn push_rename_to(
		&mut self,
		path: PathBuf,
		cookie: Option<usize>,
		entry: Option<EntryKind>,
		now: Instant,
	) {
		let position = self.pending.iter().position(|slot| {
			matches!(
				slot,
				Slot::AwaitingRename(half) if half.side == Side::From && half.cookie == cookie
			)
		});

		match position {
			Some(position) => {
				if let Some(cookie) = cookie {
					self.remember_paired(cookie);
				}
				self.complete_rename(position, path, entry, now);
			}
			None => {
				// The old half happened outside of the root, so for us this was a creation
				let kind = self.existing_kind(&path, entry);
				self.push_ready(NormalizedEvent::created(kind, path), now);
			}
		}
	}

	fn push_rename_pair(
		&mut self,
		from: PathBuf,
		to: PathBuf,
		cookie: Option<usize>,
		entry: Option<EntryKind>,
		now: Instant,
	) {
		if cookie.is_some_and(|cookie| self.paired_cookies.contains(&cookie)) {
			trace!(?cookie, "Skipping rename pair that was already linked by its halves;");
			return;
		}

		if from == self.root {
			self.root_event(RawKind::RenamedFrom);
			return;
		}

		if let Some(position) = cookie.and_then(|cookie| {
			self.pending.iter().position(|slot| {
				matches!(
					slot,
					Slot::AwaitingRename(half) if half.side == Side::From && half.cookie == Some(cookie)
				)
			})
		}) {
			if let Some(cookie) = cookie {
				self.remember_paired(cookie);
			}
			self.complete_rename(position, to, entry, now);
			return;
		}

		match (from.starts_with(&self.root), to.starts_with(&self.root)) {
			(true, true) => {
				let event = self.renamed(from, to, entry, now);
				self.pending.push_back(Slot::Ready { event, at: now });
			}
			(true, false) => self.push_removed(from, entry, now),
			(false, true) => self.push_created(to, entry, now),
			(false, false) => {}
		}
	}

	fn push_ambiguous(&mut self, path: PathBuf, entry: Option<EntryKind>, now: Instant) {
		let quiescence = self.quiescence;
		let position = self.pending.iter().position(|slot| {
			matches!(
				slot,
				Slot::AwaitingRename(half)
					if half.side == Side::Unknown
						&& half.path != path
						&& now.saturating_duration_since(half.since) < quiescence
			)
		});

		let Some(position) = position else {
			self.pending.push_back(Slot::AwaitingRename(RenameHalf {
				side: Side::Unknown,
				cookie: None,
				path,
				entry,
				since: now,
			}));
			return;
		};

		let Some(Slot::AwaitingRename(earlier)) = self.pending.get(position) else {
			return;
		};

		let earlier_exists = self.probe.kind_of(&earlier.path).is_some();
		let later_exists = self.probe.kind_of(&path).is_some();

		if earlier_exists && !later_exists {
			// The earlier half was the new path, so swap them around
			let new_path = earlier.path.clone();
			if let Some(Slot::AwaitingRename(half)) = self.pending.get_mut(position) {
				half.path = path;
			}
			self.complete_rename(position, new_path, entry, now);
		} else {
			self.complete_rename(position, path, entry, now);
		}
	}

	/// Replace the half at `position` with a finished rename towards `to`, keeping its slot.
	fn complete_rename(
		&mut self,
		position: usize,
		to: PathBuf,
		entry: Option<EntryKind>,
		now: Instant,
	) {
		let Some(Slot::AwaitingRename(half)) = self.pending.get(position) else {
			return;
		};

		let from = half.path.clone();
		let since = half.since;
		let event = self.renamed(from, to, entry.or(half.entry), now);

		self.pending[position] = Slot::Ready { event, at: since };
	}

	fn renamed(
		&mut self,
		from: PathBuf,
		to: PathBuf,
		entry: Option<EntryKind>,
		now: Instant,
	) -> NormalizedEvent {
		let kind = entry
			.or_else(|| self.probe.kind_of(&to))
			.unwrap_or_else(|| self.remembered_kind(&from));

		self.track(&from, EventType::Renamed, kind, now);
		self.track(&to, EventType::Renamed, kind, now);
		if kind == EntryKind::Directory {
			self.move_known_directories(&from, &to);
		}

		NormalizedEvent::renamed(kind, from, to)
	}

	fn resolve_expired_halves(&mut self, now: Instant, force: bool) {
		for position in 0..self.pending.len() {
			let expired = matches!(
				&self.pending[position],
				Slot::AwaitingRename(half)
					if force || now.saturating_duration_since(half.since) >= self.quiescence
			);

			if !expired {
				continue;
			}

			let Some(Slot::AwaitingRename(half)) = self.pending.get(position) else {
				continue;
			};

			let path = half.path.clone();
			let (side, entry, since) = (half.side, half.entry, half.since);

			let event = match (side, self.probe.kind_of(&path)) {
				// Moved in from outside of the root
				(Side::Unknown, Some(kind)) => {
					self.track(&path, EventType::Created, kind, now);
					NormalizedEvent::created(kind, path)
				}
				// Moved out of the root
				(Side::From | Side::Unknown, _) => {
					let kind = self.gone_kind(&path, entry);
					self.track(&path, EventType::Deleted, kind, now);
					NormalizedEvent::deleted(kind, path)
				}
			};

			trace!(?event, "Rename half timed out;");
			self.pending[position] = Slot::Ready { event, at: since };
		}
	}

	fn push_ready(&mut self, event: NormalizedEvent, now: Instant) {
		self.track(&event.old_path, event.action, event.kind, now);
		self.pending.push_back(Slot::Ready { event, at: now });
	}

	fn track(&mut self, path: &Path, action: EventType, kind: EntryKind, now: Instant) {
		match (action, kind) {
			(EventType::Created, EntryKind::Directory) => {
				self.known_directories.insert(path.to_path_buf());
			}
			(EventType::Deleted, EntryKind::Directory) => {
				self.known_directories
					.retain(|directory| !directory.starts_with(path));
			}
			_ => {}
		}

		self.last_seen
			.insert(path.to_path_buf(), Seen { action, at: now });
	}

	fn move_known_directories(&mut self, from: &Path, to: &Path) {
		let moved = self
			.known_directories
			.iter()
			.filter(|directory| directory.starts_with(from))
			.cloned()
			.collect::<Vec<_>>();

		for directory in moved {
			self.known_directories.remove(&directory);
			if let Ok(relative) = directory.strip_prefix(from) {
				self.known_directories.insert(to.join(relative));
			}
		}

		self.known_directories.insert(to.to_path_buf());
	}

	fn remember_paired(&mut self, cookie: usize) {
		if self.paired_cookies.len() == PAIRED_COOKIES_CAPACITY {
			self.paired_cookies.pop_front();
		}
		self.paired_cookies.push_back(cookie);
	}

	/// Per path history is only needed while a burst can still be going on.
	fn forget_old_paths(&mut self, now: Instant) {
		let max_delay = self.max_delay;
		self.last_seen
			.retain(|_, seen| now.saturating_duration_since(seen.at) < max_delay);
	}

	fn existing_kind(&self, path: &Path, entry: Option<EntryKind>) -> EntryKind {
		entry
			.or_else(|| self.probe.kind_of(path))
			.unwrap_or_else(|| self.remembered_kind(path))
	}

	fn gone_kind(&self, path: &Path, entry: Option<EntryKind>) -> EntryKind {
		entry.unwrap_or_else(|| self.remembered_kind(path))
	}

	fn remembered_kind(&self, path: &Path) -> EntryKind {
		if self.known_directories.contains(path) {
			EntryKind::Directory
		} else {
			EntryKind::File
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use super::*;

	const WINDOW: Duration = Duration::from_millis(100);
	const ROOT: &str = "/root";

	/// Filesystem double: paths in the set exist, with the given kind.
	#[derive(Debug, Clone, Default)]
	struct FakeProbe(Arc<Mutex<HashMap<PathBuf, EntryKind>>>);

	impl FakeProbe {
		fn insert(&self, path: &str, kind: EntryKind) {
			self.0.lock().unwrap().insert(PathBuf::from(path), kind);
		}

		fn remove(&self, path: &str) {
			self.0.lock().unwrap().remove(Path::new(path));
		}
	}

	impl Probe for FakeProbe {
		fn kind_of(&self, path: &Path) -> Option<EntryKind> {
			self.0.lock().unwrap().get(path).copied()
		}
	}

	fn coalescer() -> (Coalescer, FakeProbe, Instant) {
		let probe = FakeProbe::default();
		probe.insert(ROOT, EntryKind::Directory);
		(
			Coalescer::with_probe(ROOT, WINDOW, probe.clone()),
			probe,
			Instant::now(),
		)
	}

	fn raw(kind: RawKind, path: &str) -> RawNotification {
		RawNotification::new(kind, path)
	}

	fn ms(millis: u64) -> Duration {
		Duration::from_millis(millis)
	}

	#[test]
	fn waits_for_quiescence() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(
			raw(RawKind::Created, "/root/a.txt").with_entry(Some(EntryKind::File)),
			start,
		);

		assert!(coalescer.flush(start + ms(50)).is_none());
		assert_eq!(
			coalescer.flush(start + WINDOW).unwrap(),
			vec![NormalizedEvent::created(EntryKind::File, "/root/a.txt")]
		);
		assert!(coalescer.is_idle());
		assert!(coalescer.flush(start + ms(300)).is_none());
	}

	#[test]
	fn delete_recreate_cycles_keep_causal_order() {
		let (mut coalescer, _, start) = coalescer();

		let sequence = [
			(RawKind::Removed, "/root/deleted.txt"),
			(RawKind::Created, "/root/recreated.txt"),
			(RawKind::Removed, "/root/recreated.txt"),
			(RawKind::Created, "/root/recreated.txt"),
			(RawKind::Created, "/root/created.txt"),
		];
		for (offset, (kind, path)) in (0..).zip(sequence) {
			coalescer.push(raw(kind, path), start + ms(offset));
		}

		assert_eq!(
			coalescer.flush(start + ms(200)).unwrap(),
			vec![
				NormalizedEvent::deleted(EntryKind::File, "/root/deleted.txt"),
				NormalizedEvent::created(EntryKind::File, "/root/recreated.txt"),
				NormalizedEvent::deleted(EntryKind::File, "/root/recreated.txt"),
				NormalizedEvent::created(EntryKind::File, "/root/recreated.txt"),
				NormalizedEvent::created(EntryKind::File, "/root/created.txt"),
			]
		);
	}

	#[test]
	fn create_then_delete_reports_both() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(raw(RawKind::Created, "/root/tmp"), start);
		coalescer.push(raw(RawKind::Removed, "/root/tmp"), start + ms(1));

		let events = coalescer.flush(start + ms(150)).unwrap();
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].action, EventType::Created);
		assert_eq!(events[1].action, EventType::Deleted);
	}

	#[test]
	fn only_adjacent_modifications_merge() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(raw(RawKind::Modified, "/root/a.txt"), start);
		coalescer.push(raw(RawKind::Modified, "/root/a.txt"), start + ms(1));
		coalescer.push(raw(RawKind::Modified, "/root/a.txt"), start + ms(2));
		coalescer.push(raw(RawKind::Modified, "/root/b.txt"), start + ms(3));
		coalescer.push(raw(RawKind::Modified, "/root/a.txt"), start + ms(4));

		assert_eq!(
			coalescer.flush(start + ms(200)).unwrap(),
			vec![
				NormalizedEvent::modified(EntryKind::File, "/root/a.txt"),
				NormalizedEvent::modified(EntryKind::File, "/root/b.txt"),
				NormalizedEvent::modified(EntryKind::File, "/root/a.txt"),
			]
		);
	}

	#[test]
	fn modification_after_creation_is_kept() {
		let (mut coalescer, probe, start) = coalescer();
		probe.insert("/root/a.txt", EntryKind::File);

		coalescer.push(raw(RawKind::Created, "/root/a.txt"), start);
		coalescer.push(raw(RawKind::Modified, "/root/a.txt"), start + ms(1));
		coalescer.push(raw(RawKind::Modified, "/root/a.txt"), start + ms(2));

		assert_eq!(
			coalescer.flush(start + ms(200)).unwrap(),
			vec![
				NormalizedEvent::created(EntryKind::File, "/root/a.txt"),
				NormalizedEvent::modified(EntryKind::File, "/root/a.txt"),
			]
		);
	}

	#[test]
	fn cookie_pairs_and_skips_trailing_both() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(
			raw(RawKind::RenamedFrom, "/root/old.txt").with_cookie(Some(3)),
			start,
		);
		coalescer.push(
			raw(RawKind::RenamedTo, "/root/new.txt").with_cookie(Some(3)),
			start + ms(1),
		);
		coalescer.push(
			RawNotification::both("/root/old.txt", "/root/new.txt").with_cookie(Some(3)),
			start + ms(1),
		);

		assert_eq!(
			coalescer.flush(start + ms(200)).unwrap(),
			vec![NormalizedEvent::renamed(
				EntryKind::File,
				"/root/old.txt",
				"/root/new.txt"
			)]
		);
	}

	#[test]
	fn halves_without_cookie_pair_in_order() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(raw(RawKind::RenamedFrom, "/root/a"), start);
		coalescer.push(raw(RawKind::RenamedTo, "/root/b"), start + ms(1));
		coalescer.push(raw(RawKind::RenamedFrom, "/root/c"), start + ms(2));
		coalescer.push(raw(RawKind::RenamedTo, "/root/d"), start + ms(3));

		assert_eq!(
			coalescer.flush(start + ms(200)).unwrap(),
			vec![
				NormalizedEvent::renamed(EntryKind::File, "/root/a", "/root/b"),
				NormalizedEvent::renamed(EntryKind::File, "/root/c", "/root/d"),
			]
		);
	}

	#[test]
	fn unpaired_halves_become_deletions_and_creations() {
		let (mut coalescer, probe, start) = coalescer();
		probe.insert("/root/in.txt", EntryKind::File);

		coalescer.push(
			raw(RawKind::RenamedFrom, "/root/out.txt").with_cookie(Some(1)),
			start,
		);
		coalescer.push(
			raw(RawKind::RenamedTo, "/root/in.txt").with_cookie(Some(2)),
			start + ms(1),
		);

		assert_eq!(
			coalescer.flush(start + ms(200)).unwrap(),
			vec![
				NormalizedEvent::deleted(EntryKind::File, "/root/out.txt"),
				NormalizedEvent::created(EntryKind::File, "/root/in.txt"),
			]
		);
	}

	#[test]
	fn unresolved_half_holds_back_later_events() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(raw(RawKind::Created, "/root/first"), start);
		coalescer.push(
			raw(RawKind::RenamedFrom, "/root/old").with_cookie(Some(9)),
			start + ms(990),
		);
		coalescer.push(raw(RawKind::Created, "/root/after"), start + ms(995));

		// Overdue because of the first event, the half is still within its window
		assert_eq!(
			coalescer.flush(start + ms(1000)).unwrap(),
			vec![NormalizedEvent::created(EntryKind::File, "/root/first")]
		);

		assert_eq!(
			coalescer.flush(start + ms(1095)).unwrap(),
			vec![
				NormalizedEvent::deleted(EntryKind::File, "/root/old"),
				NormalizedEvent::created(EntryKind::File, "/root/after"),
			]
		);
	}

	#[test]
	fn ambiguous_halves_pair_using_the_filesystem() {
		let (mut coalescer, probe, start) = coalescer();
		probe.insert("/root/new.txt", EntryKind::File);

		// FSEvents may report the new path first
		coalescer.push(raw(RawKind::RenamedAny, "/root/new.txt"), start);
		coalescer.push(raw(RawKind::RenamedAny, "/root/old.txt"), start + ms(1));

		assert_eq!(
			coalescer.flush(start + ms(200)).unwrap(),
			vec![NormalizedEvent::renamed(
				EntryKind::File,
				"/root/old.txt",
				"/root/new.txt"
			)]
		);
	}

	#[test]
	fn lonely_ambiguous_half_is_resolved_by_existence() {
		let (mut coalescer, probe, start) = coalescer();
		probe.insert("/root/moved-in", EntryKind::Directory);

		coalescer.push(raw(RawKind::RenamedAny, "/root/moved-in"), start);
		coalescer.push(raw(RawKind::RenamedAny, "/root/moved-out"), start + ms(150));

		// Too far apart to be the halves of the same rename
		assert_eq!(
			coalescer.flush(start + ms(300)).unwrap(),
			vec![
				NormalizedEvent::created(EntryKind::Directory, "/root/moved-in"),
				NormalizedEvent::deleted(EntryKind::File, "/root/moved-out"),
			]
		);
	}

	#[test]
	fn continuous_activity_is_delivered_after_max_delay() {
		let (mut coalescer, _, start) = coalescer();

		let mut delivered = Vec::new();
		for step in 0..30 {
			let now = start + ms(step * 50);
			coalescer.push(raw(RawKind::Created, &format!("/root/{step}")), now);
			if let Some(events) = coalescer.flush(now) {
				delivered.extend(events);
			}
		}

		assert!(!delivered.is_empty());
		assert_eq!(delivered[0].old_path, PathBuf::from("/root/0"));
	}

	#[test]
	fn removing_the_root_is_terminal() {
		let (mut coalescer, probe, start) = coalescer();

		coalescer.push(raw(RawKind::Created, "/root/a"), start);
		probe.remove(ROOT);
		coalescer.push(
			raw(RawKind::Removed, ROOT).with_entry(Some(EntryKind::Directory)),
			start + ms(1),
		);
		coalescer.push(raw(RawKind::Created, "/root/b"), start + ms(2));

		assert!(coalescer.has_failed());
		assert_eq!(coalescer.flush_all(start + ms(3)).unwrap().len(), 1);
		assert!(matches!(
			coalescer.take_failure(),
			Some(WatchError::RootRemoved(_))
		));
	}

	#[test]
	fn overflow_is_terminal() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(RawNotification::overflow(), start);

		assert!(matches!(
			coalescer.take_failure(),
			Some(WatchError::Overflow(_))
		));
	}

	#[test]
	fn duplicated_directory_removal_is_reported_once() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(
			raw(RawKind::Created, "/root/dir").with_entry(Some(EntryKind::Directory)),
			start,
		);
		coalescer.push(raw(RawKind::Removed, "/root/dir"), start + ms(1));
		coalescer.push(raw(RawKind::Removed, "/root/dir"), start + ms(2));

		assert_eq!(
			coalescer.flush(start + ms(200)).unwrap(),
			vec![
				NormalizedEvent::created(EntryKind::Directory, "/root/dir"),
				// Kind remembered from the creation
				NormalizedEvent::deleted(EntryKind::Directory, "/root/dir"),
			]
		);
	}

	#[test]
	fn events_outside_the_root_are_ignored() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(raw(RawKind::Created, "/rooted/a"), start);
		coalescer.push(raw(RawKind::Created, "/elsewhere/b"), start);
		coalescer.push(raw(RawKind::MovedSelf, "/root/sub"), start);

		assert!(coalescer.flush(start + ms(200)).is_none());
		assert!(!coalescer.has_failed());
	}

	#[test]
	fn renamed_directory_keeps_its_kind_when_deleted() {
		let (mut coalescer, _, start) = coalescer();

		coalescer.push(
			raw(RawKind::Created, "/root/dir").with_entry(Some(EntryKind::Directory)),
			start,
		);
		coalescer.push(RawNotification::both("/root/dir", "/root/moved"), start + ms(1));
		coalescer.push(raw(RawKind::Removed, "/root/moved"), start + ms(2));

		let events = coalescer.flush(start + ms(200)).unwrap();
		assert_eq!(
			events[2],
			NormalizedEvent::deleted(EntryKind::Directory, "/root/moved")
		);
	}
}
