//! Moving delivery from one dispatcher to another.
//!
//! Ephemerals are re-delivered on the target dispatcher with the requested
//! [`TransferMode`]. A [`SafetyValve`] limits how many deliveries are in
//! flight at once; while it is saturated the optional [`LitteredStrategy`]
//! collects new values, and the running delivery drains it before it
//! completes. Terminals bypass the valve and hop to the target as barrier
//! work, so they are observed after every ephemeral scheduled before them
//! and after whatever the littered strategy still holds.

use std::sync::Arc;

use log::trace;

use crate::{
  dispatching::{DispatchFlags, Dispatching, TransferMode},
  monitor::{Feed, Monitor, Payload},
  ops::safety_valve::{DirectPass, LitteredStrategy, SafetyValve},
  subscription::Subscription,
  transform::Transformer,
};

pub struct Transferer<E, T> {
  source: Arc<dyn Dispatching>,
  target: Arc<dyn Dispatching>,
  flags: DispatchFlags,
  valve: Arc<dyn SafetyValve>,
  littered: Option<Arc<dyn LitteredStrategy<E>>>,
  feed: Feed<E, T>,
}

fn drain<E: Payload, T: Payload>(feed: &Feed<E, T>, littered: Option<&dyn LitteredStrategy<E>>) {
  while let Some(next) = littered.and_then(|littered| littered.pop()) {
    feed.push_ephemeral(next);
  }
}

impl<E: Payload, T: Payload> Transformer<E, T> for Transferer<E, T> {
  fn eat_ephemeral(&self, ephemeral: E) {
    self.source.assert_is_current(DispatchFlags::NONE);
    if let Some(littered) = self.littered.as_ref().filter(|_| self.valve.is_littered()) {
      littered.put(ephemeral);
      return;
    }

    self.valve.invocation_scheduled();
    let (feed, valve, littered) = (self.feed.clone(), self.valve.clone(), self.littered.clone());
    let _delivery = self.target.run(
      self.flags,
      Box::new(move || {
        let mut next = Some(ephemeral);
        while let Some(ephemeral) = next {
          feed.push_ephemeral(ephemeral);
          drain(&feed, littered.as_deref());
          valve.invocation_complete();
          // A value may have been littered after the drain but before the
          // valve opened up.
          next = littered.as_ref().and_then(|littered| littered.pop());
          if next.is_some() {
            valve.invocation_scheduled();
          }
        }
      }),
    );
  }

  fn eat_terminal(&self, terminal: T) {
    trace!("transfer: terminal hops to the target dispatcher");
    let (feed, littered) = (self.feed.clone(), self.littered.clone());
    let _delivery = self.target.run(
      DispatchFlags::BARRIER,
      Box::new(move || {
        drain(&feed, littered.as_deref());
        feed.push_terminal(terminal);
      }),
    );
  }

  fn cancel(&self, source: &Subscription) {
    self.target.assert_is_current(DispatchFlags::BARRIER);
    let source = source.clone();
    let _cancellation = self.source.run(DispatchFlags::BARRIER, Box::new(move || source.cancel()));
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Re-delivers this monitor on `target`. The result is bound to `target`.
  ///
  /// Must be called from `source` as barrier work.
  pub fn transfer(
    &self,
    source: Arc<dyn Dispatching>,
    target: Arc<dyn Dispatching>,
    mode: TransferMode,
  ) -> Monitor<E, T> {
    self.transfer_with(source, target, mode, Arc::new(DirectPass), None)
  }

  /// [`Monitor::transfer`] with backpressure. Without a littered strategy
  /// the valve is only informed, every value is still scheduled.
  pub fn transfer_with(
    &self,
    source: Arc<dyn Dispatching>,
    target: Arc<dyn Dispatching>,
    mode: TransferMode,
    valve: Arc<dyn SafetyValve>,
    littered: Option<Arc<dyn LitteredStrategy<E>>>,
  ) -> Monitor<E, T> {
    self.transform(move |feed: Feed<E, T>| {
      feed.bind_context(target.clone());
      Transferer { source, target, flags: mode.flags(), valve, littered, feed }
    })
  }

  /// Re-delivers this monitor into an existing `feed` on `target`.
  ///
  /// # Panics
  ///
  /// Panics unless called from `source` as barrier work.
  pub fn forward(
    &self,
    source: Arc<dyn Dispatching>,
    target: Arc<dyn Dispatching>,
    feed: Feed<E, T>,
    mode: TransferMode,
  ) {
    self.forward_with(source, target, feed, mode, Arc::new(DirectPass), None)
  }

  /// [`Monitor::forward`] with backpressure.
  pub fn forward_with(
    &self,
    source: Arc<dyn Dispatching>,
    target: Arc<dyn Dispatching>,
    feed: Feed<E, T>,
    mode: TransferMode,
    valve: Arc<dyn SafetyValve>,
    littered: Option<Arc<dyn LitteredStrategy<E>>>,
  ) {
    source.assert_is_current(DispatchFlags::BARRIER);
    let transferer = Arc::new(Transferer {
      source,
      target: target.clone(),
      flags: mode.flags(),
      valve,
      littered,
      feed: feed.clone(),
    });
    let (on_ephemeral, on_terminal) = (transferer.clone(), transferer.clone());
    let subscription = self.observe(
      move |ephemeral| on_ephemeral.eat_ephemeral(ephemeral),
      move |terminal| on_terminal.eat_terminal(terminal),
    );
    // The target may only hear about cancellation on its own context.
    let _registration = target.run(
      DispatchFlags::BARRIER,
      Box::new(move || feed.on_cancel(move || transferer.cancel(&subscription))),
    );
  }
}
