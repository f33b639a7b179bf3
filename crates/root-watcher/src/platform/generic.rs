//! Translation for the polling watcher and the backends without dedicated handling
//! (kqueue on the BSDs).
//!
//! Polling only sees snapshots, so a rename shows up as a removal plus a creation.

use notify::{
	event::{ModifyKind, RenameMode},
	Event, EventKind,
};
use tracing::trace;

use super::{
	super::event::{EntryKind, RawKind, RawNotification},
	created_entry, each, halves, removed_entry, rename_pair, EventTranslator,
};

#[derive(Debug, Default)]
pub struct GenericTranslator;

impl EventTranslator for GenericTranslator {
	fn translate(&mut self, event: Event) -> Vec<RawNotification> {
		if event.need_rescan() {
			return vec![RawNotification::overflow()];
		}

		let cookie = event.tracker();
		let Event { kind, paths, .. } = event;

		match kind {
			EventKind::Create(create_kind) => {
				each(RawKind::Created, paths, created_entry(create_kind))
			}

			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
				halves(RawKind::RenamedFrom, paths, cookie)
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
				halves(RawKind::RenamedTo, paths, cookie)
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => rename_pair(paths, cookie),
			EventKind::Modify(ModifyKind::Name(_)) => each(RawKind::RenamedAny, paths, None),
			EventKind::Modify(ModifyKind::Data(_)) => {
				each(RawKind::Modified, paths, Some(EntryKind::File))
			}
			EventKind::Modify(_) => each(RawKind::Modified, paths, None),

			EventKind::Remove(remove_kind) => {
				each(RawKind::Removed, paths, removed_entry(remove_kind))
			}

			other_event_kind => {
				trace!(?other_event_kind, ?paths, "Ignoring event;");
				vec![]
			}
		}
	}
}
