//! Platform adapters: turn `notify` events into [`RawNotification`]s.
//!
//! Every backend flavors its events differently, so each one gets its own translator.
//! All of them are compiled everywhere, only the native one is selected at build time.
//!
//! Events dispatched per backend, as observed through `notify`:
//!
//! | operation     | inotify (linux)                          | FSEvents (macos)        | windows                      |
//! |---------------|------------------------------------------|-------------------------|------------------------------|
//! | create file   | `Create(File)`, `Modify(Data)`, `Access` | `Create(File)`          | `Create(Any)`                |
//! | create dir    | `Create(Folder)`                         | `Create(Folder)` (x2 from Finder) | `Create(Any)`      |
//! | write file    | `Modify(Data)`, `Access(Close(Write))`   | `Modify(Data(Content))` | `Modify(Any)`                |
//! | rename        | `Name(From)`, `Name(To)`, `Name(Both)`   | `Name(Any)` x2          | `Name(From)`, `Name(To)`     |
//! | delete file   | `Remove(File)`                           | `Remove(File)`          | `Remove(Any)`                |
//! | delete dir    | `Remove(Folder)` (+ one from the dir itself) | `Remove(Folder)`    | `Remove(Any)`                |

use std::path::PathBuf;

use notify::{
	event::{CreateKind, RemoveKind},
	Event,
};

use super::event::{EntryKind, RawKind, RawNotification};

pub mod generic;
pub mod linux;
pub mod macos;
pub mod windows;

pub use generic::GenericTranslator;
pub use linux::InotifyTranslator;
pub use macos::FsEventsTranslator;
pub use windows::ReadDirectoryTranslator;

/// Converts one backend event into zero or more raw notifications.
pub trait EventTranslator: Send + 'static {
	fn translate(&mut self, event: Event) -> Vec<RawNotification>;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub type NativeTranslator = InotifyTranslator;

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub type NativeTranslator = FsEventsTranslator;

#[cfg(target_os = "windows")]
pub type NativeTranslator = ReadDirectoryTranslator;

#[cfg(not(any(
	target_os = "linux",
	target_os = "android",
	target_os = "macos",
	target_os = "ios",
	target_os = "windows"
)))]
pub type NativeTranslator = GenericTranslator;

pub(crate) fn native() -> Box<dyn EventTranslator> {
	Box::<NativeTranslator>::default()
}

pub(crate) fn polling() -> Box<dyn EventTranslator> {
	Box::<GenericTranslator>::default()
}

const fn created_entry(kind: CreateKind) -> Option<EntryKind> {
	match kind {
		CreateKind::File => Some(EntryKind::File),
		CreateKind::Folder => Some(EntryKind::Directory),
		_ => None,
	}
}

const fn removed_entry(kind: RemoveKind) -> Option<EntryKind> {
	match kind {
		RemoveKind::File => Some(EntryKind::File),
		RemoveKind::Folder => Some(EntryKind::Directory),
		_ => None,
	}
}

/// One notification per path, all with the same kind.
fn each(kind: RawKind, paths: Vec<PathBuf>, entry: Option<EntryKind>) -> Vec<RawNotification> {
	paths
		.into_iter()
		.map(|path| RawNotification::new(kind, path).with_entry(entry))
		.collect()
}

/// Rename halves, each linked to its counterpart by `cookie` when the backend has one.
fn halves(kind: RawKind, paths: Vec<PathBuf>, cookie: Option<usize>) -> Vec<RawNotification> {
	paths
		.into_iter()
		.map(|path| RawNotification::new(kind, path).with_cookie(cookie))
		.collect()
}

/// Split a two path rename into its halves, or keep the single path.
fn rename_pair(mut paths: Vec<PathBuf>, cookie: Option<usize>) -> Vec<RawNotification> {
	if paths.len() >= 2 {
		let to = paths.swap_remove(1);
		let from = paths.swap_remove(0);
		vec![RawNotification::both(from, to).with_cookie(cookie)]
	} else {
		each(RawKind::RenamedAny, paths, None)
	}
}
