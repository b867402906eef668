//! Awaiting the terminal of a monitor.
//!
//! ```rust
//! use monitor::prelude::*;
//!
//! # async fn example() {
//! let (monitor, feed) = Monitor::<i32, &'static str>::make();
//! let terminal = monitor.into_future();
//! feed.push_ephemeral(1);
//! feed.push_terminal("done");
//! assert_eq!(terminal.await, Ok("done"));
//! # }
//! ```

use std::{
  future::Future,
  mem,
  pin::Pin,
  sync::{Arc, Mutex},
  task::{Context as TaskContext, Poll, Waker},
};

use crate::{
  error::IntoFutureError,
  monitor::{Monitor, Payload},
  subscription::Subscription,
  util::lock,
};

enum Slot<T> {
  Waiting(Option<Waker>),
  Resolved(Result<T, IntoFutureError>),
  Consumed,
}

/// Lives inside the terminal observer. Dropped without having resolved, it
/// resolves the future as abandoned.
struct Resolver<T> {
  slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Resolver<T> {
  fn resolve(&self, outcome: Result<T, IntoFutureError>) {
    let waker = {
      let mut slot = lock(&self.slot);
      let Slot::Waiting(waker) = &mut *slot else { return };
      let waker = waker.take();
      *slot = Slot::Resolved(outcome);
      waker
    };
    if let Some(waker) = waker {
      waker.wake();
    }
  }
}

impl<T> Drop for Resolver<T> {
  fn drop(&mut self) { self.resolve(Err(IntoFutureError::Abandoned)) }
}

/// Future returned by [`Monitor::into_future`].
///
/// Dropping it cancels its subscription. For a monitor bound to a
/// dispatcher that has to happen inside the dispatcher.
pub struct MonitorFuture<T> {
  slot: Arc<Mutex<Slot<T>>>,
  subscription: Subscription,
}

impl<T> MonitorFuture<T> {
  /// The subscription feeding this future. Cancelling it resolves the
  /// future with [`IntoFutureError::Abandoned`] unless the terminal arrived
  /// first.
  pub fn subscription(&self) -> Subscription { self.subscription.clone() }
}

impl<T> Future for MonitorFuture<T> {
  type Output = Result<T, IntoFutureError>;

  fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
    let mut slot = lock(&self.slot);
    match mem::replace(&mut *slot, Slot::Consumed) {
      Slot::Waiting(_) => {
        *slot = Slot::Waiting(Some(cx.waker().clone()));
        Poll::Pending
      }
      Slot::Resolved(outcome) => Poll::Ready(outcome),
      Slot::Consumed => panic!("MonitorFuture polled after completion"),
    }
  }
}

impl<T> Drop for MonitorFuture<T> {
  fn drop(&mut self) { self.subscription.cancel() }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Resolves with the terminal value. Ephemerals are ignored.
  pub fn into_future(&self) -> MonitorFuture<T> {
    let slot = Arc::new(Mutex::new(Slot::Waiting(None)));
    let resolver = Resolver { slot: slot.clone() };
    let subscription = self.observe(|_| {}, move |terminal| resolver.resolve(Ok(terminal)));
    MonitorFuture { slot, subscription }
  }
}
