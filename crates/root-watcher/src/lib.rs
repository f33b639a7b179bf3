//!
//! # Root Watcher
//!
//! Watches any number of directory trees and delivers normalized, coalesced change events
//! to one handler per watched root.
//!
//! The platform watchers run on a dedicated worker thread. Raw notifications are
//! translated per platform, then coalesced per root: rename halves are paired, bursts of
//! modifications on the same path are merged, and everything else is reported in the
//! order it happened. Batches are routed back by root identity only, so nested or
//! sibling roots never see each other's events.
//!
//! ## Basic example
//!
//! ```no_run
//! use sd_root_watcher::{ConfigureOptions, Coordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = Coordinator::new();
//!
//!     watcher
//!         .configure(Some(
//!             ConfigureOptions::default()
//!                 .main_log_file("/tmp/watcher/main.log")
//!                 .worker_log_file("/tmp/watcher/worker.log"),
//!         ))
//!         .await?;
//!
//!     let subscription = watcher
//!         .watch("/tmp/watched", |res| match res {
//!             Ok(events) => println!("{events:#?}"),
//!             Err(e) => eprintln!("watch failed: {e}"),
//!         })
//!         .await?;
//!
//!     subscription.unwatch().await?;
//!     watcher.shutdown().await;
//!
//!     Ok(())
//! }
//! ```
#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod coalescer;
mod config;
mod coordinator;
mod engine;
mod error;
mod event;
mod logging;
mod message;
mod registry;
mod worker;

pub mod platform;

pub use config::{ConfigureOptions, WatchOptions};
pub use coordinator::{Coordinator, Status, Subscription};
pub use error::{
	BoundaryError, ConfigurationError, Error, FileIOError, PathError, WatchError,
};
pub use event::{EntryKind, EventType, NormalizedEvent, RawKind, RawNotification, RootId};
pub use logging::{FileLogger, LogWriter, OPENED_MARKER};
pub use registry::Handler;
