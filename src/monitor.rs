//! The stream primitive.
//!
//! A [`Monitor`] emits zero or more *ephemeral* values followed by exactly
//! one *terminal* value. It is created together with its write capability, a
//! [`Feed`]:
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use monitor::prelude::*;
//!
//! let (monitor, feed) = Monitor::<i32, &'static str>::make();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_c = seen.clone();
//! let _subscription = monitor.observe(
//!   move |v| seen_c.lock().unwrap().push(v),
//!   |t| assert_eq!(t, "done"),
//! );
//! feed.push_ephemeral(1);
//! feed.push_ephemeral(2);
//! feed.push_terminal("done");
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! ```
//!
//! # Ownership
//!
//! - The monitor holds its subscriptions weakly: dropping every clone of a
//!   [`Subscription`] silently detaches its observers.
//! - A subscription holds its monitor strongly until it is cancelled.
//! - The feed holds the monitor weakly. Once every other owner is gone the
//!   feed is *abandoned* and pushing through it does nothing.
//! - Cancellation observers registered on the feed run when the monitor
//!   terminates or is dropped while still pending, whichever comes first.
//!
//! # Dispatcher binding
//!
//! A monitor can be bound to a [`Dispatching`] context with
//! [`Feed::bind_context`]. It never runs anything there; the dispatcher only
//! serves to assert that observation, cancellation and terminal delivery
//! happen inside the context as barrier work, and ephemeral delivery inside
//! the context at all.

use std::{
  fmt::{Debug, Formatter},
  mem,
  sync::{Arc, Mutex, PoisonError, Weak},
};

use log::trace;
use smallvec::SmallVec;

use crate::{
  dispatching::{DispatchFlags, Dispatching},
  subscription::{Subscription, VanishCallback, VanishEvent, Vanishable},
  util::lock,
};

mod feed;

pub use feed::Feed;
pub(crate) use feed::TerminalInterceptor;

/// Bound shared by every value that flows through a monitor. Values are
/// cloned once per subscriber and may cross threads.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

pub(crate) type EphemeralObserver<E> = Arc<dyn Fn(E) + Send + Sync>;
pub(crate) type TerminalObserver<T> = Box<dyn FnOnce(T) + Send>;
pub(crate) type Finalizer = Box<dyn FnOnce() + Send>;

/// Shared handle to a stream of `E` ephemerals ending with one `T`.
pub struct Monitor<E, T> {
  pub(crate) core: Arc<MonitorCore<E, T>>,
}

impl<E, T> Clone for Monitor<E, T> {
  fn clone(&self) -> Self { Monitor { core: self.core.clone() } }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Creates a pending monitor and the feed that drives it.
  pub fn make() -> (Self, Feed<E, T>) {
    let core = Arc::new(MonitorCore::pending());
    let feed = Feed::new(Arc::downgrade(&core));
    (Monitor { core }, feed)
  }

  /// A monitor that already delivered `terminal`.
  pub fn terminated(terminal: T) -> Self {
    Monitor {
      core: Arc::new(MonitorCore {
        state: Mutex::new(State::Terminated(terminal)),
        dispatcher: Mutex::new(None),
      }),
    }
  }

  /// Registers a pair of observers.
  ///
  /// On a terminated monitor `on_terminal` runs right away, before this
  /// returns, and the returned subscription has already vanished.
  ///
  /// # Panics
  ///
  /// Panics if the monitor is bound to a dispatcher and the caller is not
  /// running inside it as barrier work.
  pub fn observe(
    &self,
    on_ephemeral: impl Fn(E) + Send + Sync + 'static,
    on_terminal: impl FnOnce(T) + Send + 'static,
  ) -> Subscription {
    MonitorCore::observe(&self.core, Arc::new(on_ephemeral), Box::new(on_terminal))
  }

  /// The dispatcher this monitor was bound to, if any.
  pub fn dispatcher(&self) -> Option<Arc<dyn Dispatching>> { self.core.dispatcher() }

  pub fn is_terminated(&self) -> bool { matches!(*lock(&self.core.state), State::Terminated(_)) }

  /// The terminal value, once delivered.
  pub fn terminal(&self) -> Option<T> {
    match &*lock(&self.core.state) {
      State::Terminated(terminal) => Some(terminal.clone()),
      State::Pending { .. } => None,
    }
  }

  /// Whether both handles share the same underlying stream.
  pub fn same_as(&self, other: &Monitor<E, T>) -> bool { Arc::ptr_eq(&self.core, &other.core) }
}

impl<E, T> Debug for Monitor<E, T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let terminated = matches!(*lock(&self.core.state), State::Terminated(_));
    f.debug_struct("Monitor").field("terminated", &terminated).finish()
  }
}

// ============================================================================
// Core state machine
// ============================================================================

enum State<E, T> {
  Pending {
    subscriptions: SmallVec<[Weak<SubscriptionCore<E, T>>; 2]>,
    finalizers: SmallVec<[Finalizer; 1]>,
  },
  Terminated(T),
}

pub(crate) struct MonitorCore<E, T> {
  state: Mutex<State<E, T>>,
  dispatcher: Mutex<Option<Arc<dyn Dispatching>>>,
}

impl<E: Payload, T: Payload> MonitorCore<E, T> {
  fn pending() -> Self {
    MonitorCore {
      state: Mutex::new(State::Pending { subscriptions: SmallVec::new(), finalizers: SmallVec::new() }),
      dispatcher: Mutex::new(None),
    }
  }

  fn dispatcher(&self) -> Option<Arc<dyn Dispatching>> { lock(&self.dispatcher).clone() }

  fn set_dispatcher(&self, dispatcher: Arc<dyn Dispatching>) { *lock(&self.dispatcher) = Some(dispatcher); }

  fn is_bound(&self) -> bool { lock(&self.dispatcher).is_some() }

  fn assert_context(&self, flags: DispatchFlags) {
    if let Some(dispatcher) = self.dispatcher() {
      dispatcher.assert_is_current(flags);
    }
  }

  fn observe(
    this: &Arc<Self>,
    on_ephemeral: EphemeralObserver<E>,
    on_terminal: TerminalObserver<T>,
  ) -> Subscription {
    this.assert_context(DispatchFlags::BARRIER);
    let mut state = lock(&this.state);
    let terminal = match &mut *state {
      State::Pending { subscriptions, .. } => {
        subscriptions.retain(|subscription| subscription.strong_count() > 0);
        let subscription = Arc::new(SubscriptionCore {
          observers: Mutex::new(Observers { ephemeral: Some(on_ephemeral), terminal: Some(on_terminal) }),
          monitor: Mutex::new(Some(this.clone())),
          vanish: VanishEvent::new(),
        });
        subscriptions.push(Arc::downgrade(&subscription));
        return Subscription::new(subscription);
      }
      State::Terminated(terminal) => terminal.clone(),
    };
    drop(state);
    on_terminal(terminal);
    Subscription::vanished()
  }

  fn eat_ephemeral(&self, ephemeral: E) {
    self.assert_context(DispatchFlags::NONE);
    let subscriptions: SmallVec<[Arc<SubscriptionCore<E, T>>; 4]> = match &*lock(&self.state) {
      State::Pending { subscriptions, .. } => subscriptions.iter().filter_map(Weak::upgrade).collect(),
      State::Terminated(_) => return,
    };
    // Observers cancelled by an earlier observer of this same value are
    // skipped.
    for subscription in subscriptions {
      if let Some(observer) = subscription.ephemeral_observer() {
        observer(ephemeral.clone());
      }
    }
  }

  fn eat_terminal(&self, terminal: T) {
    self.assert_context(DispatchFlags::BARRIER);
    let (subscriptions, finalizers) = {
      let mut state = lock(&self.state);
      match mem::replace(&mut *state, State::Terminated(terminal.clone())) {
        State::Pending { subscriptions, finalizers } => (subscriptions, finalizers),
        already @ State::Terminated(_) => {
          *state = already;
          return;
        }
      }
    };

    let subscriptions: SmallVec<[Arc<SubscriptionCore<E, T>>; 4]> =
      subscriptions.iter().filter_map(Weak::upgrade).collect();
    trace!(
      "monitor terminated: {} subscription(s), {} finalizer(s)",
      subscriptions.len(),
      finalizers.len()
    );
    for subscription in &subscriptions {
      if let Some(observer) = subscription.take_terminal_observer() {
        observer(terminal.clone());
      }
    }
    for subscription in &subscriptions {
      subscription.cancel();
    }
    for finalizer in finalizers {
      finalizer();
    }
  }

  fn on_cancel(&self, finalizer: Finalizer) {
    let mut state = lock(&self.state);
    if let State::Pending { finalizers, .. } = &mut *state {
      finalizers.push(finalizer);
      return;
    }
    drop(state);
    finalizer();
  }

  fn remove_subscription(&self, subscription: *const ()) {
    self.assert_context(DispatchFlags::BARRIER);
    if let State::Pending { subscriptions, .. } = &mut *lock(&self.state) {
      subscriptions.retain(|candidate| {
        candidate.strong_count() > 0 && candidate.as_ptr() as *const () != subscription
      });
    }
  }
}

impl<E, T> Drop for MonitorCore<E, T> {
  fn drop(&mut self) {
    let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
    if let State::Pending { finalizers, .. } = state {
      let finalizers = mem::take(finalizers);
      if !finalizers.is_empty() {
        trace!("pending monitor dropped, running {} finalizer(s)", finalizers.len());
      }
      for finalizer in finalizers {
        finalizer();
      }
    }
  }
}

// ============================================================================
// Subscription
// ============================================================================

struct Observers<E, T> {
  ephemeral: Option<EphemeralObserver<E>>,
  terminal: Option<TerminalObserver<T>>,
}

impl<E, T> Default for Observers<E, T> {
  fn default() -> Self { Observers { ephemeral: None, terminal: None } }
}

struct SubscriptionCore<E, T> {
  observers: Mutex<Observers<E, T>>,
  monitor: Mutex<Option<Arc<MonitorCore<E, T>>>>,
  vanish: VanishEvent,
}

impl<E, T> SubscriptionCore<E, T> {
  fn ephemeral_observer(&self) -> Option<EphemeralObserver<E>> { lock(&self.observers).ephemeral.clone() }

  fn take_terminal_observer(&self) -> Option<TerminalObserver<T>> { lock(&self.observers).terminal.take() }
}

impl<E: Payload, T: Payload> Vanishable for SubscriptionCore<E, T> {
  fn cancel(&self) {
    let observers = mem::take(&mut *lock(&self.observers));
    drop(observers);
    let monitor = lock(&self.monitor).take();
    let Some(monitor) = monitor else { return };
    monitor.remove_subscription(self as *const Self as *const ());
    drop(monitor);
    trace!("subscription cancelled");
    self.vanish.fire();
  }

  fn is_vanished(&self) -> bool { self.vanish.has_fired() }

  fn when_vanished(&self, callback: VanishCallback) { self.vanish.execute(callback) }
}
