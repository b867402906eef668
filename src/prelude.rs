//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Dispatching
pub use crate::dispatching::{manual::ManualDispatcher, DispatchFlags, Dispatching, DispatchingExt, TransferMode};
// Errors
pub use crate::error::{AggregatedError, IntoFutureError};
// Operators
#[cfg(feature = "futures-adapters")]
pub use crate::ops::{into_future::MonitorFuture, into_stream::MonitorStream};
pub use crate::ops::{
  mix::{all, all_ok, any, any_ok, collect, mix},
  ConcurrencyLimiter, DirectPass, DoNotMerge, LitteredStrategy, MergeLatest, MergeWith, Mixer, SafetyValve,
  ScanMode,
};
// Promise and event-source flavors
pub use crate::rx::{
  BackgroundTask, Deferred, EventSource, FailableDeferred, FailableEventSource, FailableObservable,
  FailablePromise, Observable, Promise,
};
// Core
pub use crate::{
  context::{ContextAccessor, WeakContextAccessor},
  monitor::{Feed, Monitor, Payload},
  signal::{Signal, StrictOrderedSignal},
  subscription::{
    associate::{associate, associate_in, associate_slot},
    Subscription, SubscriptionGuard, SubscriptionId, Vanishable,
  },
  thread_safety::{
    callee_sync_guaranteed, CalleeSyncGuaranteed, DispatchedThreadSafety, ReadPreferredRwLock,
    ThreadSafety, ThreadSafetyExt,
  },
  transform::Transformer,
};
