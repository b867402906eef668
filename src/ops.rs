//! Operators over [`Monitor`](crate::monitor::Monitor).
//!
//! Each operator is an inherent method on `Monitor` that builds a
//! [`Transformer`](crate::transform::Transformer) and hands it to
//! [`Monitor::transform`](crate::monitor::Monitor::transform). Operators that
//! keep state store it in a [`ContextAccessor`](crate::context::ContextAccessor)
//! and never call out (push, observe, cancel) while holding a write.
//!
//! Operators that accept a `strategy` use it to guard the state that can be
//! reached concurrently. Pass [`callee_sync_guaranteed`] when the upstream
//! contract already serializes delivery.
//!
//! [`callee_sync_guaranteed`]: crate::thread_safety::callee_sync_guaranteed

pub mod debounce;
pub mod distinct;
pub mod extend;
pub mod filter;
pub mod flat_map;
#[cfg(feature = "futures-adapters")]
pub mod into_future;
#[cfg(feature = "futures-adapters")]
pub mod into_stream;
pub mod map;
pub mod mix;
pub mod never;
pub mod reduce_flat_map;
pub mod rewire;
pub mod rewire_all;
pub mod rewire_switch;
pub mod safety_valve;
pub mod scan;
pub mod switch_map;
pub mod throttle;
pub mod transfer;

pub use mix::Mixer;
pub use safety_valve::{
  ConcurrencyLimiter, DirectPass, DoNotMerge, LitteredStrategy, MergeLatest, MergeWith, SafetyValve,
};
pub use scan::ScanMode;

#[cfg(test)]
pub(crate) mod test_util {
  use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
  };

  use crate::{
    monitor::{Monitor, Payload},
    subscription::Subscription,
  };

  pub(crate) type Events = Arc<Mutex<Vec<String>>>;

  /// Observes `monitor`, logging `e:<value>` and `t:<value>` entries.
  pub(crate) fn record<E, T>(monitor: &Monitor<E, T>) -> (Events, Subscription)
  where
    E: Debug + Payload,
    T: Debug + Payload,
  {
    let events: Events = Arc::default();
    let (on_e, on_t) = (events.clone(), events.clone());
    let subscription = monitor.observe(
      move |e| on_e.lock().unwrap().push(format!("e:{e:?}")),
      move |t| on_t.lock().unwrap().push(format!("t:{t:?}")),
    );
    (events, subscription)
  }

  pub(crate) fn snapshot(events: &Events) -> Vec<String> { events.lock().unwrap().clone() }

  /// Collects the feeds of every monitor a factory hands out, so a test can
  /// drive inner monitors after the fact.
  pub(crate) struct Produced<E, T> {
    feeds: Arc<Mutex<Vec<crate::monitor::Feed<E, T>>>>,
  }

  impl<E: Payload, T: Payload> Clone for Produced<E, T> {
    fn clone(&self) -> Self { Produced { feeds: self.feeds.clone() } }
  }

  impl<E: Payload, T: Payload> Produced<E, T> {
    pub(crate) fn new() -> Self { Produced { feeds: Arc::default() } }

    pub(crate) fn make(&self) -> Monitor<E, T> {
      let (monitor, feed) = Monitor::make();
      self.feeds.lock().unwrap().push(feed);
      monitor
    }

    pub(crate) fn len(&self) -> usize { self.feeds.lock().unwrap().len() }

    pub(crate) fn get(&self, index: usize) -> crate::monitor::Feed<E, T> {
      self.feeds.lock().unwrap()[index].clone()
    }
  }
}
