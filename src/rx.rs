//! Promise and event-source flavors of [`Monitor`](crate::monitor::Monitor).
//!
//! A *deferred* value never emits ephemerals and resolves once, an
//! *observable* emits events and completes with `()`. Both are plain
//! monitors, so every operator applies to them.

pub mod background_task;
pub mod event_source;
pub mod promise;

pub use background_task::BackgroundTask;
pub use event_source::{EventSource, FailableEventSource, FailableObservable, Observable};
pub use promise::{Deferred, FailableDeferred, FailablePromise, Promise};
