use std::{
  fmt::{Debug, Formatter},
  mem,
  sync::{Arc, Mutex, Weak},
};

use super::{MonitorCore, Payload};
use crate::{dispatching::Dispatching, subscription::Subscription, util::lock};

/// The write capability of a [`super::Monitor`].
///
/// A feed never keeps its monitor alive. When nobody else owns the monitor
/// the feed is abandoned: pushes are ignored and cancellation observers run
/// immediately.
pub struct Feed<E, T> {
  monitor: Weak<MonitorCore<E, T>>,
  interceptor: Option<Arc<TerminalInterceptor>>,
}

impl<E, T> Clone for Feed<E, T> {
  fn clone(&self) -> Self { Feed { monitor: self.monitor.clone(), interceptor: self.interceptor.clone() } }
}

impl<E: Payload, T: Payload> Feed<E, T> {
  pub(crate) fn new(monitor: Weak<MonitorCore<E, T>>) -> Self { Feed { monitor, interceptor: None } }

  /// Delivers `ephemeral` to every live subscription, in registration order.
  pub fn push_ephemeral(&self, ephemeral: E) {
    if let Some(monitor) = self.monitor.upgrade() {
      monitor.eat_ephemeral(ephemeral);
    }
  }

  /// Terminates the monitor. Only the first terminal has any effect.
  pub fn push_terminal(&self, terminal: T) {
    let Some(monitor) = self.monitor.upgrade() else { return };
    if let Some(interceptor) = &self.interceptor {
      interceptor.terminal_received();
    }
    monitor.eat_terminal(terminal);
  }

  /// Runs `callback` once the monitor terminates or is dropped. Runs it
  /// right away if either already happened.
  pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
    match self.monitor.upgrade() {
      Some(monitor) => monitor.on_cancel(Box::new(callback)),
      None => callback(),
    }
  }

  pub fn is_abandoned(&self) -> bool { self.monitor.strong_count() == 0 }

  /// Binds the monitor to `dispatcher` for contract assertions.
  pub fn bind_context(&self, dispatcher: Arc<dyn Dispatching>) {
    if let Some(monitor) = self.monitor.upgrade() {
      monitor.set_dispatcher(dispatcher);
    }
  }

  pub(crate) fn is_bound(&self) -> bool {
    self
      .monitor
      .upgrade()
      .map_or(false, |monitor| monitor.is_bound())
  }

  pub(crate) fn intercept_terminal(self, interceptor: Arc<TerminalInterceptor>) -> Self {
    Feed { monitor: self.monitor, interceptor: Some(interceptor) }
  }
}

impl<E, T> Debug for Feed<E, T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Feed")
      .field("abandoned", &(self.monitor.strong_count() == 0))
      .finish()
  }
}

enum InterceptorState {
  Waiting(Vec<Subscription>),
  Fired,
}

/// Cancels upstream subscriptions as soon as a transformed monitor receives
/// its terminal, so no further upstream values are consumed.
pub(crate) struct TerminalInterceptor {
  state: Mutex<InterceptorState>,
}

impl TerminalInterceptor {
  pub(crate) fn new() -> Self { TerminalInterceptor { state: Mutex::new(InterceptorState::Waiting(Vec::new())) } }

  /// Hands over an upstream subscription. It is cancelled right away if the
  /// terminal already went through.
  pub(crate) fn arm(&self, subscription: Subscription) {
    let mut state = lock(&self.state);
    if let InterceptorState::Waiting(subscriptions) = &mut *state {
      subscriptions.push(subscription);
      return;
    }
    drop(state);
    subscription.cancel();
  }

  pub(crate) fn terminal_received(&self) {
    let subscriptions = match mem::replace(&mut *lock(&self.state), InterceptorState::Fired) {
      InterceptorState::Waiting(subscriptions) => subscriptions,
      InterceptorState::Fired => return,
    };
    for subscription in subscriptions {
      subscription.cancel();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};

  use super::*;
  use crate::monitor::Monitor;

  #[monitor_macro::test]
  fn interceptor_cancels_upstream_before_terminal() {
    let (upstream, upstream_feed) = Monitor::<i32, i32>::make();
    let token = upstream.observe(|_| {}, |_| {});

    let interceptor = Arc::new(TerminalInterceptor::new());
    interceptor.arm(token.clone());
    let (downstream, feed) = Monitor::<i32, i32>::make();
    let feed = feed.intercept_terminal(interceptor);

    let observed_cancelled = Arc::new(AtomicBool::new(false));
    let (flag, probe) = (observed_cancelled.clone(), token.clone());
    let _watch = downstream.observe(|_| {}, move |_| flag.store(probe.is_vanished(), Ordering::SeqCst));

    feed.push_terminal(1);
    assert!(observed_cancelled.load(Ordering::SeqCst));
    drop(upstream_feed);
  }

  #[monitor_macro::test]
  fn arming_after_the_terminal_cancels_immediately() {
    let (upstream, _feed) = Monitor::<i32, i32>::make();
    let interceptor = TerminalInterceptor::new();
    interceptor.terminal_received();
    let token = upstream.observe(|_| {}, |_| {});
    interceptor.arm(token.clone());
    assert!(token.is_vanished());
  }

  #[monitor_macro::test]
  fn abandoned_feed_ignores_binding() {
    let (monitor, feed) = Monitor::<i32, i32>::make();
    drop(monitor);
    feed.bind_context(crate::dispatching::manual::ManualDispatcher::new("late"));
    assert!(!feed.is_bound());
  }
}
