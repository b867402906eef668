use std::{marker::PhantomData, sync::Arc, time::Duration};

use crate::{
  context::ContextAccessor,
  dispatching::{DispatchFlags, Dispatching, TransferMode},
  monitor::{Feed, Monitor, Payload},
  subscription::{associate::associate_slot, Subscription},
  thread_safety::ThreadSafety,
  transform::Transformer,
};

#[derive(Clone, Default)]
struct DebounceState {
  active_task: Option<Subscription>,
}

pub struct DebounceOp<E, T> {
  feed: Feed<E, T>,
  timeout: Duration,
  dispatcher: Arc<dyn Dispatching>,
  flags: DispatchFlags,
  context: ContextAccessor<DebounceState>,
  _source: PhantomData<fn(E, T)>,
}

impl<E: Payload, T: Payload> DebounceOp<E, T> {
  fn cancel_active_task(&self) {
    let active = self.context.read_write(|state| state.active_task.take());
    if let Some(active) = active {
      active.cancel();
    }
  }
}

impl<E: Payload, T: Payload> Transformer<E, T> for DebounceOp<E, T> {
  fn eat_ephemeral(&self, ephemeral: E) {
    self.dispatcher.assert_is_current(DispatchFlags::NONE);
    self.cancel_active_task();
    let feed = self.feed.clone();
    let task = self
      .dispatcher
      .run_after(self.timeout, self.flags, Box::new(move || feed.push_ephemeral(ephemeral)));
    associate_slot(&task, &self.context, |state| &mut state.active_task);
  }

  fn eat_terminal(&self, terminal: T) {
    self.dispatcher.assert_is_current(DispatchFlags::BARRIER);
    self.cancel_active_task();
    self.feed.push_terminal(terminal);
  }

  fn cancel(&self, source: &Subscription) {
    self.dispatcher.assert_is_current(DispatchFlags::BARRIER);
    self.cancel_active_task();
    source.cancel();
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Forwards an ephemeral only once `timeout` passed without a newer one.
  ///
  /// Every ephemeral replaces the pending delayed push on `dispatcher`. The
  /// terminal drops the pending push and is forwarded right away.
  ///
  /// # Panics
  ///
  /// Must be called from `dispatcher` as barrier work, and the upstream must
  /// deliver there too.
  pub fn debounce(
    &self,
    timeout: Duration,
    dispatcher: Arc<dyn Dispatching>,
    mode: TransferMode,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Monitor<E, T> {
    dispatcher.assert_is_current(DispatchFlags::BARRIER);
    self.transform(move |feed| DebounceOp {
      feed,
      timeout,
      dispatcher,
      flags: mode.flags(),
      context: ContextAccessor::synchronized(DebounceState::default(), strategy),
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

  fn debounced(dispatcher: &Arc<ManualDispatcher>) -> (Feed<i32, ()>, Events, Subscription) {
    let (source, feed) = Monitor::<i32, ()>::make();
    let d: Arc<dyn Dispatching> = dispatcher.clone();
    let (events, subscription) = dispatcher.run_sync(DispatchFlags::BARRIER, move || {
      record(&source.debounce(Duration::from_secs(1), d, TransferMode::Default, callee_sync_guaranteed()))
    });
    (feed, events, subscription)
  }

  fn emit(dispatcher: &ManualDispatcher, feed: &Feed<i32, ()>, value: i32) {
    dispatcher.run_sync(DispatchFlags::NONE, || feed.push_ephemeral(value));
  }

  fn release(dispatcher: &ManualDispatcher, subscription: Subscription) {
    dispatcher.run_sync(DispatchFlags::BARRIER, move || drop(subscription));
  }

  #[monitor_macro::test]
  fn forwards_after_the_timeout() {
    let dispatcher = ManualDispatcher::new("main");
    let (feed, events, subscription) = debounced(&dispatcher);

    emit(&dispatcher, &feed, 1);
    dispatcher.advance_by(Duration::from_millis(900));
    assert!(snapshot(&events).is_empty());

    dispatcher.advance_by(Duration::from_millis(100));
    assert_eq!(snapshot(&events), vec!["e:1"]);
    release(&dispatcher, subscription);
    assert_eq!(dispatcher.pending_count(), 0);
  }

  #[monitor_macro::test]
  fn newer_value_restarts_the_timeout() {
    let dispatcher = ManualDispatcher::new("main");
    let (feed, events, subscription) = debounced(&dispatcher);

    emit(&dispatcher, &feed, 1);
    dispatcher.advance_by(Duration::from_millis(900));
    emit(&dispatcher, &feed, 2);
    dispatcher.advance_by(Duration::from_millis(900));
    assert!(snapshot(&events).is_empty());
    assert_eq!(dispatcher.pending_count(), 1);

    dispatcher.advance_by(Duration::from_millis(100));
    assert_eq!(snapshot(&events), vec!["e:2"]);
    release(&dispatcher, subscription);
  }

  #[monitor_macro::test]
  fn filtered_typing_forwards_only_the_settled_text() {
    let dispatcher = ManualDispatcher::new("main");
    let (source, feed) = Monitor::<String, ()>::make();
    let d: Arc<dyn Dispatching> = dispatcher.clone();
    let (events, subscription) = dispatcher.run_sync(DispatchFlags::BARRIER, move || {
      let debounced = source
        .filter(|text| text.len() > 1)
        .debounce(Duration::from_secs(3), d, TransferMode::Default, callee_sync_guaranteed());
      record(&debounced)
    });
    let type_text = |text: &str| {
      let text = text.to_string();
      dispatcher.run_sync(DispatchFlags::NONE, || feed.push_ephemeral(text));
    };

    type_text("1");
    assert_eq!(dispatcher.pending_count(), 0);
    dispatcher.advance_by(Duration::from_secs(6));

    type_text("12");
    dispatcher.advance_by(Duration::from_secs(2));
    assert!(snapshot(&events).is_empty());

    type_text("123");
    dispatcher.advance_by(Duration::from_secs(2));
    assert!(snapshot(&events).is_empty());
    assert_eq!(dispatcher.pending_count(), 1);

    dispatcher.advance_by(Duration::from_secs(1));
    assert_eq!(snapshot(&events), vec!["e:\"123\""]);
    release(&dispatcher, subscription);
    assert_eq!(dispatcher.pending_count(), 0);
  }

  #[monitor_macro::test]
  fn terminal_drops_the_pending_value() {
    let dispatcher = ManualDispatcher::new("main");
    let (feed, events, _subscription) = debounced(&dispatcher);

    emit(&dispatcher, &feed, 1);
    dispatcher.run_sync(DispatchFlags::BARRIER, || feed.push_terminal(()));
    assert_eq!(snapshot(&events), vec!["t:()"]);
    assert_eq!(dispatcher.pending_count(), 0);
    dispatcher.flush();
    assert_eq!(snapshot(&events), vec!["t:()"]);
  }

  #[monitor_macro::test]
  fn dropping_the_result_cancels_the_pending_push() {
    let dispatcher = ManualDispatcher::new("main");
    let (feed, events, subscription) = debounced(&dispatcher);
    emit(&dispatcher, &feed, 1);
    release(&dispatcher, subscription);
    assert!(feed.is_abandoned());
    assert_eq!(dispatcher.pending_count(), 0);
    assert!(snapshot(&events).is_empty());
  }

  #[monitor_macro::test]
  #[should_panic(expected = "no dispatcher is currently executing")]
  fn creating_outside_the_dispatcher_panics() {
    let (source, _feed) = Monitor::<i32, ()>::make();
    let _ = source.debounce(
      Duration::from_secs(1),
      ManualDispatcher::new("main"),
      TransferMode::Default,
      callee_sync_guaranteed(),
    );
  }
}
