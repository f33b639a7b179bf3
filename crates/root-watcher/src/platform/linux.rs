//! Linux-specific event translation
//!
//! inotify provides proper rename tracking: both halves carry the same cookie, and
//! `notify` follows them with a `Both` event once it matched them. A watched directory
//! that is moved away also reports a `Name(From)` for itself, without a cookie.

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
pub struct InotifyTranslator;

impl EventTranslator for InotifyTranslator {
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

			EventKind::Modify(ModifyKind::Name(RenameMode::From)) if cookie.is_none() => {
				each(RawKind::MovedSelf, paths, Some(EntryKind::Directory))
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
				halves(RawKind::RenamedFrom, paths, cookie)
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
				halves(RawKind::RenamedTo, paths, cookie)
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => rename_pair(paths, cookie),
			EventKind::Modify(ModifyKind::Name(_)) => {
				each(RawKind::MovedSelf, paths, Some(EntryKind::Directory))
			}

			EventKind::Modify(ModifyKind::Data(_)) => {
				each(RawKind::Modified, paths, Some(EntryKind::File))
			}
			EventKind::Modify(_) => each(RawKind::Modified, paths, None),

			EventKind::Remove(remove_kind) => {
				each(RawKind::Removed, paths, removed_entry(remove_kind))
			}

			EventKind::Access(_) => {
				trace!(?paths, "Ignoring access event;");
				vec![]
			}

			other_event_kind => {
				trace!(?other_event_kind, ?paths, "Other Linux event that we don't handle;");
				vec![]
			}
		}
	}
}
