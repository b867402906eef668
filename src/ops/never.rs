//! Conveniences for monitors whose ephemeral type is [`Infallible`], i.e.
//! monitors that only ever deliver a terminal.

use std::convert::Infallible;

use crate::{
  monitor::{Feed, Monitor, Payload},
  subscription::Subscription,
  transform::Transformer,
};

pub struct IgnoreEphemeralsOp<T> {
  feed: Feed<Infallible, T>,
}

impl<E, T: Payload> Transformer<E, T> for IgnoreEphemeralsOp<T> {
  fn eat_ephemeral(&self, _: E) {}

  fn eat_terminal(&self, terminal: T) { self.feed.push_terminal(terminal) }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Drops every ephemeral and erases the ephemeral type.
  pub fn ignore_ephemerals(&self) -> Monitor<Infallible, T> {
    self.transform(|feed| IgnoreEphemeralsOp { feed })
  }
}

impl<T: Payload> Monitor<Infallible, T> {
  pub fn observe_terminal(&self, on_terminal: impl FnOnce(T) + Send + 'static) -> Subscription {
    self.observe(|never| match never {}, on_terminal)
  }

  /// Views the monitor as one with any ephemeral type. No ephemeral is ever
  /// emitted.
  pub fn cast_ephemeral<E: Payload>(&self) -> Monitor<E, T> {
    self.map(|never: Infallible| -> E { match never {} }, |terminal| terminal)
  }
}
