//! Cancellation handles.
//!
//! Every `observe` call and every unit of work submitted to a dispatcher hands
//! back a [`Subscription`]. A subscription can be cancelled, asked whether it
//! has vanished, and asked to run a callback once it vanishes.
//!
//! Vanishing is a one-shot event: it fires when the handle is cancelled, or
//! when the work behind it completes (a monitor delivering its terminal, a
//! dispatcher task finishing). Callbacks registered after the event fired run
//! immediately.

use std::{
  fmt::{Debug, Formatter},
  sync::{Arc, Mutex},
};

use once_cell::sync::Lazy;
use smallvec::SmallVec;

use crate::util::lock;

pub mod associate;

/// Callback run once a [`Vanishable`] vanishes.
pub type VanishCallback = Box<dyn FnOnce() + Send>;

/// Anything that can be cancelled and reports its own disappearance.
pub trait Vanishable: Send + Sync {
  /// Cancels the underlying work. Calling it more than once is a no-op.
  fn cancel(&self);

  /// Whether the vanish event already fired.
  fn is_vanished(&self) -> bool;

  /// Runs `callback` once this handle vanishes, or immediately if it already
  /// has.
  fn when_vanished(&self, callback: VanishCallback);
}

/// Identity of a [`Subscription`], stable for as long as the handle lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(usize);

/// A cloneable, type-erased cancellation handle.
///
/// Dropping the last clone of a monitor subscription detaches its observers
/// without firing the vanish event; call [`Subscription::cancel`] for an
/// explicit, observable cancellation.
#[derive(Clone)]
#[must_use = "dropping a monitor subscription detaches its observers"]
pub struct Subscription(Arc<dyn Vanishable>);

static VANISHED: Lazy<Subscription> = Lazy::new(|| Subscription(Arc::new(Vanished)));

impl Subscription {
  pub fn new(inner: Arc<dyn Vanishable>) -> Self { Subscription(inner) }

  /// A handle that has already vanished.
  pub fn vanished() -> Self { VANISHED.clone() }

  #[inline]
  pub fn cancel(&self) { self.0.cancel() }

  #[inline]
  pub fn is_vanished(&self) -> bool { self.0.is_vanished() }

  pub fn when_vanished(&self, callback: impl FnOnce() + Send + 'static) {
    self.0.when_vanished(Box::new(callback))
  }

  pub fn id(&self) -> SubscriptionId { SubscriptionId(Arc::as_ptr(&self.0) as *const () as usize) }

  /// Whether both handles refer to the same underlying work.
  pub fn same_as(&self, other: &Subscription) -> bool { self.id() == other.id() }

  /// Activates "RAII" behavior for this subscription: the returned guard
  /// cancels it as soon as it goes out of scope.
  ///
  /// **Attention:** If you don't assign the return value to a variable, the
  /// subscription is cancelled immediately.
  pub fn unsubscribe_when_dropped(self) -> SubscriptionGuard { SubscriptionGuard(self) }
}

impl Debug for Subscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("id", &self.id())
      .field("is_vanished", &self.is_vanished())
      .finish()
  }
}

/// An RAII implementation of a "scoped subscription". When this structure is
/// dropped (falls out of scope), the subscription is cancelled.
///
/// If you want to drop it immediately, wrap it in its own scope.
#[derive(Debug)]
#[must_use]
pub struct SubscriptionGuard(Subscription);

impl SubscriptionGuard {
  pub fn new(subscription: Subscription) -> Self { SubscriptionGuard(subscription) }

  pub fn subscription(&self) -> &Subscription { &self.0 }
}

impl Drop for SubscriptionGuard {
  #[inline]
  fn drop(&mut self) { self.0.cancel() }
}

/// The handle returned when there is nothing left to cancel.
struct Vanished;

impl Vanishable for Vanished {
  fn cancel(&self) {}

  fn is_vanished(&self) -> bool { true }

  fn when_vanished(&self, callback: VanishCallback) { callback() }
}

// ============================================================================
// Vanish event
// ============================================================================

enum VanishState {
  Armed(SmallVec<[VanishCallback; 1]>),
  Fired,
}

/// The one-shot event shared by every [`Vanishable`] in this crate.
pub(crate) struct VanishEvent {
  state: Mutex<VanishState>,
}

impl VanishEvent {
  pub(crate) fn new() -> Self { VanishEvent { state: Mutex::new(VanishState::Armed(SmallVec::new())) } }

  pub(crate) fn has_fired(&self) -> bool { matches!(*lock(&self.state), VanishState::Fired) }

  pub(crate) fn execute(&self, callback: VanishCallback) {
    let mut state = lock(&self.state);
    if let VanishState::Armed(queue) = &mut *state {
      queue.push(callback);
      return;
    }
    drop(state);
    callback();
  }

  /// Fires the event, draining queued callbacks in registration order.
  /// Returns `false` if it had already fired.
  pub(crate) fn fire(&self) -> bool {
    let queued = match std::mem::replace(&mut *lock(&self.state), VanishState::Fired) {
      VanishState::Armed(queue) => queue,
      VanishState::Fired => return false,
    };
    for callback in queued {
      callback();
    }
    true
  }
}
