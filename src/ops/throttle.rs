use std::{marker::PhantomData, sync::Arc, time::Duration};

use crate::{
  context::ContextAccessor,
  dispatching::{DispatchFlags, Dispatching, TransferMode},
  monitor::{Feed, Monitor, Payload},
  subscription::{associate::associate, Subscription},
  thread_safety::ThreadSafety,
  transform::Transformer,
};

#[derive(Clone)]
struct ThrottleState<E> {
  pending_flush: Option<Subscription>,
  /// Latest value seen since the flush was scheduled. Cleared together with
  /// `pending_flush`.
  latest: Option<E>,
}

pub struct ThrottleOp<E, T> {
  feed: Feed<E, T>,
  timeout: Duration,
  dispatcher: Arc<dyn Dispatching>,
  flags: DispatchFlags,
  context: ContextAccessor<ThrottleState<E>>,
  _source: PhantomData<fn(T)>,
}

impl<E: Payload, T: Payload> ThrottleOp<E, T> {
  fn cancel_pending_flush(&self) {
    if let Some(pending) = self.context.read(|state| state.pending_flush.clone()) {
      pending.cancel();
    }
  }

  fn schedule_flush(&self) {
    let (reader, feed) = (self.context.weakify(), self.feed.clone());
    let flush = self.dispatcher.run_after(
      self.timeout,
      self.flags,
      Box::new(move || {
        if let Some(latest) = reader.read(|state| state.latest.clone()).flatten() {
          feed.push_ephemeral(latest);
        }
      }),
    );
    associate(
      &flush,
      &self.context,
      |state, handle| state.pending_flush = Some(handle),
      |state, id| {
        if state.pending_flush.as_ref().map(Subscription::id) == Some(id) {
          state.pending_flush = None;
          state.latest = None;
        }
      },
      |_| {},
    );
  }
}

impl<E: Payload, T: Payload> Transformer<E, T> for ThrottleOp<E, T> {
  fn eat_ephemeral(&self, ephemeral: E) {
    self.dispatcher.assert_is_current(DispatchFlags::NONE);
    let schedule = self.context.read_write(|state| {
      let first = state.latest.is_none();
      state.latest = Some(ephemeral);
      first
    });
    if schedule {
      self.schedule_flush();
    }
  }

  fn eat_terminal(&self, terminal: T) {
    self.dispatcher.assert_is_current(DispatchFlags::BARRIER);
    self.cancel_pending_flush();
    self.feed.push_terminal(terminal);
  }

  fn cancel(&self, source: &Subscription) {
    self.dispatcher.assert_is_current(DispatchFlags::BARRIER);
    self.cancel_pending_flush();
    source.cancel();
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Forwards at most one ephemeral per `timeout` window.
  ///
  /// The first ephemeral of a window schedules a flush on `dispatcher`.
  /// Later ones only replace the value that flush will push. The terminal
  /// cancels a pending flush and is forwarded right away.
  ///
  /// # Panics
  ///
  /// Must be called from `dispatcher` as barrier work, and the upstream must
  /// deliver there too.
  pub fn throttle(
    &self,
    timeout: Duration,
    dispatcher: Arc<dyn Dispatching>,
    mode: TransferMode,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Monitor<E, T> {
    dispatcher.assert_is_current(DispatchFlags::BARRIER);
    self.transform(move |feed| ThrottleOp {
      feed,
      timeout,
      dispatcher,
      flags: mode.flags(),
      context: ContextAccessor::synchronized(ThrottleState { pending_flush: None, latest: None }, strategy),
      _source: PhantomData,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    dispatching::{manual::ManualDispatcher, DispatchingExt},
    ops::test_util::{record, snapshot, Events},
    thread_safety::callee_sync_guaranteed,
  };

  fn throttled(dispatcher: &Arc<ManualDispatcher>) -> (Feed<i32, ()>, Events, Subscription) {
    let (source, feed) = Monitor::<i32, ()>::make();
    let d: Arc<dyn Dispatching> = dispatcher.clone();
    let (events, subscription) = dispatcher.run_sync(DispatchFlags::BARRIER, move || {
      record(&source.throttle(Duration::from_secs(1), d, TransferMode::Barrier, callee_sync_guaranteed()))
    });
    (feed, events, subscription)
  }

  fn emit(dispatcher: &ManualDispatcher, feed: &Feed<i32, ()>, value: i32) {
    dispatcher.run_sync(DispatchFlags::NONE, || feed.push_ephemeral(value));
  }

  #[monitor_macro::test]
  fn one_value_per_window_and_always_the_latest() {
    let dispatcher = ManualDispatcher::new("main");
    let (feed, events, subscription) = throttled(&dispatcher);

    emit(&dispatcher, &feed, 1);
    dispatcher.advance_by(Duration::from_millis(500));
    emit(&dispatcher, &feed, 2);
    dispatcher.advance_by(Duration::from_millis(400));
    emit(&dispatcher, &feed, 3);
    assert_eq!(dispatcher.pending_count(), 1);
    assert!(snapshot(&events).is_empty());

    dispatcher.advance_by(Duration::from_millis(100));
    assert_eq!(snapshot(&events), vec!["e:3"]);

    emit(&dispatcher, &feed, 4);
    dispatcher.advance_by(Duration::from_millis(999));
    assert_eq!(snapshot(&events), vec!["e:3"]);
    dispatcher.advance_by(Duration::from_millis(1));
    assert_eq!(snapshot(&events), vec!["e:3", "e:4"]);

    dispatcher.run_sync(DispatchFlags::BARRIER, move || drop(subscription));
  }

  #[monitor_macro::test]
  fn quiet_window_flushes_nothing() {
    let dispatcher = ManualDispatcher::new("main");
    let (feed, events, subscription) = throttled(&dispatcher);
    emit(&dispatcher, &feed, 1);
    dispatcher.flush();
    dispatcher.advance_by(Duration::from_secs(5));
    assert_eq!(snapshot(&events), vec!["e:1"]);
    assert_eq!(dispatcher.pending_count(), 0);
    dispatcher.run_sync(DispatchFlags::BARRIER, move || drop(subscription));
  }

  #[monitor_macro::test]
  fn terminal_cancels_the_pending_flush() {
    let dispatcher = ManualDispatcher::new("main");
    let (feed, events, _subscription) = throttled(&dispatcher);
    emit(&dispatcher, &feed, 1);
    dispatcher.run_sync(DispatchFlags::BARRIER, || feed.push_terminal(()));
    dispatcher.flush();
    assert_eq!(snapshot(&events), vec!["t:()"]);
  }
}
