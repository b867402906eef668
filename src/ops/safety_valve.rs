//! Backpressure for transfers between dispatchers.
//!
//! A [`SafetyValve`] counts the deliveries in flight on the target
//! dispatcher and reports when there are too many. While it does, a
//! [`LitteredStrategy`] takes the values that would otherwise be scheduled
//! and decides which of them survive until the running delivery drains it.

use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
  },
};

use crate::{
  thread_safety::{ThreadSafety, ThreadSafetyExt},
  util::lock,
};

/// Admission control for deliveries scheduled on another dispatcher.
pub trait SafetyValve: Send + Sync {
  fn invocation_scheduled(&self);

  fn invocation_complete(&self);

  /// Whether new values should be handed to the littered strategy instead
  /// of being scheduled.
  fn is_littered(&self) -> bool;
}

/// Buffer for the values a saturated valve turned away.
pub trait LitteredStrategy<E>: Send + Sync {
  fn put(&self, element: E);

  /// Takes the next value to deliver, if any is left.
  fn pop(&self) -> Option<E>;
}

/// A valve that never saturates.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectPass;

impl SafetyValve for DirectPass {
  #[inline]
  fn invocation_scheduled(&self) {}

  #[inline]
  fn invocation_complete(&self) {}

  #[inline]
  fn is_littered(&self) -> bool { false }
}

/// Saturates once `max_operations` deliveries are in flight.
///
/// Updates to the count are submitted as writes of `strategy`, so a
/// dispatched strategy applies them in submission order.
pub struct ConcurrencyLimiter {
  active: Arc<AtomicU64>,
  max_operations: u64,
  strategy: Arc<dyn ThreadSafety>,
}

impl ConcurrencyLimiter {
  pub fn new(max_operations: u64, strategy: Arc<dyn ThreadSafety>) -> Self {
    ConcurrencyLimiter { active: Arc::default(), max_operations, strategy }
  }

  pub fn active_operations(&self) -> u64 { self.strategy.read(|| self.active.load(Ordering::Acquire)) }
}

impl SafetyValve for ConcurrencyLimiter {
  fn invocation_scheduled(&self) {
    let active = self.active.clone();
    self.strategy.write(move || {
      active.fetch_add(1, Ordering::AcqRel);
    });
  }

  fn invocation_complete(&self) {
    let active = self.active.clone();
    self.strategy.write(move || {
      let _ = active.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));
    });
  }

  fn is_littered(&self) -> bool {
    let active = self.strategy.read(|| self.active.load(Ordering::Acquire));
    active >= self.max_operations
  }
}

/// Keeps every turned-away value, in arrival order.
pub struct DoNotMerge<E> {
  queue: Mutex<VecDeque<E>>,
}

impl<E> Default for DoNotMerge<E> {
  fn default() -> Self { DoNotMerge { queue: Mutex::new(VecDeque::new()) } }
}

impl<E> DoNotMerge<E> {
  pub fn new() -> Self { Self::default() }
}

impl<E: Send> LitteredStrategy<E> for DoNotMerge<E> {
  fn put(&self, element: E) { lock(&self.queue).push_back(element) }

  fn pop(&self) -> Option<E> { lock(&self.queue).pop_front() }
}

/// Collapses turned-away values with a merge function into a single
/// pending value.
pub struct MergeWith<E, F> {
  pending: Mutex<Option<E>>,
  merge: F,
}

impl<E, F> MergeWith<E, F>
where
  F: Fn(E, E) -> E,
{
  /// `merge` receives the pending value first and the newcomer second.
  pub fn new(merge: F) -> Self { MergeWith { pending: Mutex::new(None), merge } }
}

impl<E, F> LitteredStrategy<E> for MergeWith<E, F>
where
  E: Send,
  F: Fn(E, E) -> E + Send + Sync,
{
  fn put(&self, element: E) {
    let mut pending = lock(&self.pending);
    *pending = Some(match pending.take() {
      Some(previous) => (self.merge)(previous, element),
      None => element,
    });
  }

  fn pop(&self) -> Option<E> { lock(&self.pending).take() }
}

/// Keeps only the most recent turned-away value.
pub struct MergeLatest<E> {
  latest: Mutex<Option<E>>,
}

impl<E> Default for MergeLatest<E> {
  fn default() -> Self { MergeLatest { latest: Mutex::new(None) } }
}

impl<E> MergeLatest<E> {
  pub fn new() -> Self { Self::default() }
}

impl<E: Send> LitteredStrategy<E> for MergeLatest<E> {
  fn put(&self, element: E) { *lock(&self.latest) = Some(element) }

  fn pop(&self) -> Option<E> { lock(&self.latest).take() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    dispatching::manual::ManualDispatcher,
    thread_safety::{DispatchedThreadSafety, ReadPreferredRwLock},
  };

  #[monitor_macro::test]
  fn limiter_saturates_at_its_maximum() {
    let limiter = ConcurrencyLimiter::new(2, Arc::new(ReadPreferredRwLock::new()));
    assert!(!limiter.is_littered());
    limiter.invocation_scheduled();
    limiter.invocation_scheduled();
    assert!(limiter.is_littered());
    assert_eq!(limiter.active_operations(), 2);

    limiter.invocation_complete();
    assert!(!limiter.is_littered());
    limiter.invocation_complete();
    limiter.invocation_complete();
    assert_eq!(limiter.active_operations(), 0);
  }

  #[monitor_macro::test]
  fn dispatched_limiter_applies_updates_before_reads() {
    let dispatcher = ManualDispatcher::new("valve");
    let limiter = ConcurrencyLimiter::new(1, Arc::new(DispatchedThreadSafety::new(dispatcher.clone())));
    limiter.invocation_scheduled();
    limiter.invocation_scheduled();
    limiter.invocation_complete();
    assert_eq!(dispatcher.pending_count(), 3);

    assert!(limiter.is_littered());
    assert_eq!(dispatcher.pending_count(), 0);
    assert_eq!(limiter.active_operations(), 1);
  }

  #[monitor_macro::test]
  fn direct_pass_is_never_littered() {
    let valve = DirectPass;
    valve.invocation_scheduled();
    assert!(!valve.is_littered());
  }

  #[monitor_macro::test]
  fn strategies_drain_what_they_kept() {
    let queue = DoNotMerge::new();
    queue.put(1);
    queue.put(2);
    assert_eq!((queue.pop(), queue.pop(), queue.pop()), (Some(1), Some(2), None));

    let latest = MergeLatest::new();
    latest.put(1);
    latest.put(2);
    assert_eq!((latest.pop(), latest.pop()), (Some(2), None));

    let summed = MergeWith::new(|pending: i32, newcomer| pending + newcomer);
    summed.put(1);
    summed.put(2);
    summed.put(4);
    assert_eq!((summed.pop(), summed.pop()), (Some(7), None));
  }
}
