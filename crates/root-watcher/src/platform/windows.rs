//! Windows file system event translation has some caveats due to how events are emitted
//! by `ReadDirectoryChangesW`.
//!
//! Rename halves come as `Name(From)` followed by `Name(To)` with no cookie linking them,
//! and no event says whether the entry is a file or a directory.

use notify::{
	event::{ModifyKind, RenameMode},
	Event, EventKind,
};
use tracing::trace;

use super::{
	super::event::{RawKind, RawNotification},
	each, halves, rename_pair, EventTranslator,
};

#[derive(Debug, Default)]
pub struct ReadDirectoryTranslator;

impl EventTranslator for ReadDirectoryTranslator {
	fn translate(&mut self, event: Event) -> Vec<RawNotification> {
		if event.need_rescan() {
			return vec![RawNotification::overflow()];
		}

		let Event { kind, paths, .. } = event;

		match kind {
			EventKind::Create(_) => each(RawKind::Created, paths, None),

			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
				halves(RawKind::RenamedFrom, paths, None)
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
				halves(RawKind::RenamedTo, paths, None)
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => rename_pair(paths, None),
			EventKind::Modify(ModifyKind::Name(_)) => each(RawKind::RenamedAny, paths, None),
			EventKind::Modify(_) => each(RawKind::Modified, paths, None),

			EventKind::Remove(_) => each(RawKind::Removed, paths, None),

			other_event_kind => {
				trace!(?other_event_kind, ?paths, "Other Windows event that we don't handle;");
				vec![]
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use notify::event::{CreateKind, RemoveKind};

	use super::*;

	#[test]
	fn kinds_are_left_for_the_coalescer() {
		let raws = ReadDirectoryTranslator.translate(
			Event::new(EventKind::Create(CreateKind::Any)).add_path(PathBuf::from("C:\\test\\file")),
		);

		assert_eq!(raws[0].kind, RawKind::Created);
		assert_eq!(raws[0].entry, None);

		let raws = ReadDirectoryTranslator.translate(
			Event::new(EventKind::Remove(RemoveKind::Any)).add_path(PathBuf::from("C:\\test\\file")),
		);

		assert_eq!(raws[0].kind, RawKind::Removed);
		assert_eq!(raws[0].entry, None);
	}

	#[test]
	fn rename_halves_have_no_cookie() {
		let raws = ReadDirectoryTranslator.translate(
			Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
				.add_path(PathBuf::from("C:\\test\\old.txt")),
		);

		assert_eq!(raws[0].kind, RawKind::RenamedFrom);
		assert_eq!(raws[0].cookie, None);
	}
}
