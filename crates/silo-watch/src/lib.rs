//! Job watching: poll a submitted warehouse job until it reaches a terminal state.

mod watcher;

pub use watcher::{
    JobOutcome, JobWatcher, WaitMode, WatchError, WatchReport, DEFAULT_POLL_INTERVAL,
};
