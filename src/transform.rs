//! The contract every operator implements.
//!
//! An operator is a [`Transformer`]: it consumes the upstream ephemerals and
//! terminal and writes to a downstream [`Feed`]. [`Monitor::transform`] wires
//! it up:
//!
//! 1. the transformer subscribes to the upstream monitor;
//! 2. when the transformer pushes the downstream terminal, the upstream
//!    subscription is cancelled before the terminal is delivered;
//! 3. when the downstream monitor is dropped while pending, or terminates,
//!    [`Transformer::cancel`] receives the upstream subscription and must
//!    release it together with anything else the operator holds;
//! 4. a downstream monitor that the factory did not bind to a dispatcher
//!    inherits the upstream one.

use std::sync::Arc;

use crate::{
  monitor::{Feed, Monitor, Payload, TerminalInterceptor},
  subscription::Subscription,
};

pub trait Transformer<E, T>: Send + Sync + 'static {
  fn eat_ephemeral(&self, ephemeral: E);

  fn eat_terminal(&self, terminal: T);

  /// Releases the upstream subscription and any inner work.
  fn cancel(&self, source: &Subscription) { source.cancel() }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Builds a downstream monitor driven by the transformer `make` returns.
  pub fn transform<OE, OT, X>(&self, make: impl FnOnce(Feed<OE, OT>) -> X) -> Monitor<OE, OT>
  where
    OE: Payload,
    OT: Payload,
    X: Transformer<E, T>,
  {
    let interceptor = Arc::new(TerminalInterceptor::new());
    let (result, feed) = Monitor::<OE, OT>::make();
    let feed = feed.intercept_terminal(interceptor.clone());

    let transformer = Arc::new(make(feed.clone()));
    let (on_ephemeral, on_terminal) = (transformer.clone(), transformer.clone());
    let subscription = self.observe(
      move |ephemeral| on_ephemeral.eat_ephemeral(ephemeral),
      move |terminal| on_terminal.eat_terminal(terminal),
    );
    interceptor.arm(subscription.clone());
    feed.on_cancel(move || transformer.cancel(&subscription));

    if !feed.is_bound() {
      if let Some(dispatcher) = self.dispatcher() {
        feed.bind_context(dispatcher);
      }
    }
    result
  }
}
