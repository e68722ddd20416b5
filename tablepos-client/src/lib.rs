//! Client side of TablePOS licensing.
//!
//! Runs inside the point-of-sale application:
//! - [`OfflineWatcher`] polls the authority, runs the offline countdown and
//!   publishes lock state as a stream of [`WatcherEvent`]s
//! - [`ResetFlow`] checks password-reset codes locally, then remotely
//! - [`StatusCache`] keeps the last known status across restarts
//! - [`AuthorityClient`] is the seam to the authority; [`HttpAuthority`]
//!   implements it over HTTP

mod authority;
mod cache;
mod reset;
mod watcher;

pub use authority::{AuthorityClient, HttpAuthority};
pub use cache::{CachedStatus, StatusCache};
pub use reset::{
    ResetFlow, ResetOutcome, ResetPath, StepResult, ACCEPTED_MESSAGE, UNREACHABLE_MESSAGE,
};
pub use watcher::{
    LockReason, LockState, NetworkChange, OfflineWatcher, WatcherConfig, WatcherCore,
    WatcherEvent, WatcherHandle,
};
