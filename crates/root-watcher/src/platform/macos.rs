//! macOS-specific event translation
//!
//! FSEvents only reports `Name(Any)` for renames, once for the old path and once for the
//! new one, without telling which is which. When a file is moved out of the root we only
//! get the old path, and when moved in only the new one. Linking the halves needs timing
//! and the filesystem, so the coalescer does it; here they're forwarded as ambiguous.

use std::path::PathBuf;

use notify::{
	event::{CreateKind, ModifyKind},
	Event, EventKind,
};
use tracing::trace;

use super::{
	super::event::{EntryKind, RawKind, RawNotification},
	created_entry, each, removed_entry, EventTranslator,
};

#[derive(Debug, Default)]
pub struct FsEventsTranslator {
	latest_created_dir: Option<PathBuf>,
}

impl EventTranslator for FsEventsTranslator {
	fn translate(&mut self, event: Event) -> Vec<RawNotification> {
		if event.need_rescan() {
			return vec![RawNotification::overflow()];
		}

		let Event { kind, paths, .. } = event;

		match kind {
			EventKind::Create(CreateKind::Folder) => {
				if let Some(latest_created_dir) = self.latest_created_dir.take() {
					if paths.first() == Some(&latest_created_dir) {
						// Creating a folder through Finder triggers 2 events in FSEvents
						trace!(path = %latest_created_dir.display(), "Skipping duplicated folder creation;");
						self.latest_created_dir = Some(latest_created_dir);
						return vec![];
					}
				}

				self.latest_created_dir = paths.first().cloned();
				each(RawKind::Created, paths, Some(EntryKind::Directory))
			}
			EventKind::Create(create_kind) => {
				each(RawKind::Created, paths, created_entry(create_kind))
			}

			EventKind::Modify(ModifyKind::Name(_)) => each(RawKind::RenamedAny, paths, None),
			EventKind::Modify(ModifyKind::Data(_)) => {
				each(RawKind::Modified, paths, Some(EntryKind::File))
			}
			EventKind::Modify(_) => each(RawKind::Modified, paths, None),

			EventKind::Remove(remove_kind) => {
				if paths.first() == self.latest_created_dir.as_ref() {
					self.latest_created_dir = None;
				}
				each(RawKind::Removed, paths, removed_entry(remove_kind))
			}

			other_event_kind => {
				trace!(?other_event_kind, ?paths, "Other MacOS event that we don't handle;");
				vec![]
			}
		}
	}
}
