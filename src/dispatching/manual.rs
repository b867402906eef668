//! Deterministic dispatcher driven by virtual time.
//!
//! Nothing submitted to a [`ManualDispatcher`] runs until the owner calls
//! [`ManualDispatcher::dispatch_next`], [`ManualDispatcher::advance_by`] or
//! [`ManualDispatcher::flush`]. Time only moves when it is told to, which
//! makes delayed operators such as debounce and throttle testable step by
//! step.
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//! use monitor::prelude::*;
//!
//! let dispatcher = ManualDispatcher::new("main");
//! let _task = dispatcher.run_after(
//!   Duration::from_secs(1),
//!   DispatchFlags::BARRIER,
//!   Box::new(|| println!("one second later")),
//! );
//! assert!(dispatcher.dispatch_next(Duration::from_millis(500)));
//! assert_eq!(dispatcher.pending_count(), 1);
//! dispatcher.advance_by(Duration::from_millis(500));
//! assert_eq!(dispatcher.pending_count(), 0);
//! ```
//!
//! # Concurrency model
//!
//! A dispatcher created with a simultaneous-operation count above one runs
//! up to that many ready default submissions as one batch, all inside the
//! same non-exclusive context. A barrier submission only runs alone, and only
//! once every submission queued before it has run.
//!
//! "Current dispatcher" tracking is thread local: assertions made on a
//! thread that is not dispatching see no current dispatcher at all.

use std::{
  cell::RefCell,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
  time::Duration,
};

use log::trace;

use super::{DispatchFlags, Dispatching, Work};
use crate::{
  subscription::{Subscription, VanishCallback, VanishEvent, Vanishable},
  util::lock,
};

static NEXT_DISPATCHER_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
  static EXECUTING: RefCell<Vec<(usize, DispatchFlags)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a dispatcher as current on this thread until dropped.
struct Executing;

impl Executing {
  fn enter(id: usize, flags: DispatchFlags) -> Self {
    EXECUTING.with(|stack| stack.borrow_mut().push((id, flags)));
    Executing
  }
}

impl Drop for Executing {
  fn drop(&mut self) {
    EXECUTING.with(|stack| {
      stack.borrow_mut().pop();
    });
  }
}

fn current() -> Option<(usize, DispatchFlags)> {
  EXECUTING.with(|stack| stack.borrow().last().copied())
}

// ==================== ManualDispatcher ====================

pub struct ManualDispatcher {
  id: usize,
  name: String,
  simultaneous: usize,
  state: Mutex<State>,
}

#[derive(Default)]
struct State {
  pending: Vec<Arc<ScheduledTask>>,
  now: Duration,
}

impl ManualDispatcher {
  /// A serial dispatcher: one submission at a time.
  pub fn new(name: impl Into<String>) -> Arc<Self> { Self::with_simultaneous_operations(name, 1) }

  /// # Panics
  ///
  /// Panics if `count` is zero.
  pub fn with_simultaneous_operations(name: impl Into<String>, count: usize) -> Arc<Self> {
    assert!(count > 0, "a dispatcher must allow at least one operation");
    Arc::new(ManualDispatcher {
      id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
      name: name.into(),
      simultaneous: count,
      state: Mutex::new(State::default()),
    })
  }

  pub fn name(&self) -> &str { &self.name }

  /// Virtual time accumulated by every dispatch step.
  pub fn now(&self) -> Duration { lock(&self.state).now }

  /// Submissions that were neither run nor cancelled yet.
  pub fn pending_count(&self) -> usize {
    lock(&self.state)
      .pending
      .iter()
      .filter(|task| !task.is_cancelled())
      .count()
  }

  /// Lets `elapsed` pass, then runs the next batch of ready submissions.
  ///
  /// Returns `false` once nothing is pending anymore. A step where time
  /// passes but nothing is ready yet still returns `true`.
  pub fn dispatch_next(&self, elapsed: Duration) -> bool {
    let (batch, flags) = {
      let mut state = lock(&self.state);
      state.now += elapsed;
      state.pending.retain(|task| !task.is_cancelled());
      if state.pending.is_empty() {
        return false;
      }
      for task in &state.pending {
        task.eat(elapsed);
      }
      let (batch, flags) = self.select(&state.pending);
      if batch.is_empty() {
        return true;
      }
      state
        .pending
        .retain(|task| !batch.iter().any(|selected| Arc::ptr_eq(selected, task)));
      (batch, flags)
    };

    trace!("{}: dispatching {} task(s), barrier: {}", self.name, batch.len(), flags.barrier);
    let _executing = Executing::enter(self.id, flags);
    for task in batch {
      task.execute();
    }
    true
  }

  /// Lets `duration` pass in a single step and runs everything that is
  /// ready afterwards, without letting any more time pass.
  pub fn advance_by(&self, duration: Duration) {
    if self.dispatch_next(duration) {
      self.flush_ready();
    }
  }

  /// Runs submissions until nothing is pending, jumping over delays.
  pub fn flush(&self) {
    loop {
      self.flush_ready();
      let delay = {
        let state = lock(&self.state);
        state
          .pending
          .iter()
          .filter(|task| !task.is_cancelled())
          .map(|task| task.remaining())
          .min()
      };
      match delay {
        Some(delay) => {
          self.dispatch_next(delay);
        }
        None => return,
      }
    }
  }

  fn flush_ready(&self) {
    while self.has_ready() {
      self.dispatch_next(Duration::ZERO);
    }
  }

  fn has_ready(&self) -> bool {
    lock(&self.state)
      .pending
      .iter()
      .any(|task| !task.is_cancelled() && task.is_ready())
  }

  fn select(&self, pending: &[Arc<ScheduledTask>]) -> (Vec<Arc<ScheduledTask>>, DispatchFlags) {
    let mut ready = pending.iter().filter(|task| task.is_ready());
    if self.simultaneous == 1 {
      return match ready.next() {
        Some(task) => (vec![task.clone()], task.flags),
        None => (Vec::new(), DispatchFlags::NONE),
      };
    }

    let mut batch = Vec::new();
    for task in ready {
      if task.flags.barrier {
        if batch.is_empty() {
          return (vec![task.clone()], task.flags);
        }
        break;
      }
      batch.push(task.clone());
      if batch.len() == self.simultaneous {
        break;
      }
    }
    (batch, DispatchFlags::NONE)
  }

  fn schedule(&self, delay: Duration, flags: DispatchFlags, work: Work) -> Subscription {
    let task = Arc::new(ScheduledTask {
      flags,
      remaining: Mutex::new(delay),
      work: Mutex::new(Some(work)),
      vanish: VanishEvent::new(),
    });
    lock(&self.state).pending.push(task.clone());
    Subscription::new(task)
  }
}

impl Dispatching for ManualDispatcher {
  fn run(&self, flags: DispatchFlags, work: Work) -> Subscription {
    self.schedule(Duration::ZERO, flags, work)
  }

  fn run_after(&self, delay: Duration, flags: DispatchFlags, work: Work) -> Subscription {
    self.schedule(delay, flags, work)
  }

  fn run_sync_dyn(&self, flags: DispatchFlags, work: &mut dyn FnMut()) {
    self.assert_is_not_current();
    let done = Arc::new(Mutex::new(false));
    let marker = done.clone();
    let _marker = self.run(flags, Box::new(move || *lock(&marker) = true));
    while !*lock(&done) {
      if !self.dispatch_next(Duration::ZERO) {
        panic!("{}: synchronous work was dropped before it ran", self.name);
      }
    }
    let _executing = Executing::enter(self.id, flags);
    work();
  }

  fn assert_is_current(&self, flags: DispatchFlags) {
    match current() {
      None => panic!("{}: no dispatcher is currently executing", self.name),
      Some((id, _)) if id != self.id => {
        panic!("{}: called from another dispatcher's context", self.name)
      }
      Some((_, actual)) => assert!(
        actual.contains(flags),
        "{}: invalid flags, expected {:?}, actual {:?}",
        self.name,
        flags,
        actual
      ),
    }
  }

  fn assert_is_not_current(&self) {
    if let Some((id, _)) = current() {
      assert_ne!(id, self.id, "{}: must not be called from its own context", self.name);
    }
  }
}

// ==================== ScheduledTask ====================

struct ScheduledTask {
  flags: DispatchFlags,
  remaining: Mutex<Duration>,
  work: Mutex<Option<Work>>,
  vanish: VanishEvent,
}

impl ScheduledTask {
  fn is_cancelled(&self) -> bool { lock(&self.work).is_none() }

  fn is_ready(&self) -> bool { self.remaining().is_zero() }

  fn remaining(&self) -> Duration { *lock(&self.remaining) }

  fn eat(&self, elapsed: Duration) {
    let mut remaining = lock(&self.remaining);
    *remaining = remaining.saturating_sub(elapsed);
  }

  /// Runs the work, then vanishes while still inside the context.
  fn execute(&self) {
    let work = lock(&self.work).take();
    if let Some(work) = work {
      work();
      self.vanish.fire();
    }
  }
}

impl Vanishable for ScheduledTask {
  fn cancel(&self) {
    let work = lock(&self.work).take();
    if work.is_some() {
      drop(work);
      self.vanish.fire();
    }
  }

  fn is_vanished(&self) -> bool { self.vanish.has_fired() }

  fn when_vanished(&self, callback: VanishCallback) { self.vanish.execute(callback) }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::dispatching::DispatchingExt;

  fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Work) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_c = log.clone();
    let make = move |tag: &'static str| -> Work {
      let log = log_c.clone();
      Box::new(move || log.lock().unwrap().push(tag))
    };
    (log, make)
  }

  #[monitor_macro::test]
  fn runs_one_task_per_step_in_fifo_order() {
    let dispatcher = ManualDispatcher::new("serial");
    let (log, work) = recorder();
    let _a = dispatcher.run(DispatchFlags::NONE, work("a"));
    let _b = dispatcher.run(DispatchFlags::BARRIER, work("b"));

    assert!(log.lock().unwrap().is_empty());
    assert!(dispatcher.dispatch_next(Duration::ZERO));
    assert_eq!(*log.lock().unwrap(), vec!["a"]);
    assert!(dispatcher.dispatch_next(Duration::ZERO));
    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    assert!(!dispatcher.dispatch_next(Duration::ZERO));
  }

  #[monitor_macro::test]
  fn delayed_task_waits_for_virtual_time() {
    let dispatcher = ManualDispatcher::new("timer");
    let (log, work) = recorder();
    let task = dispatcher.run_after(Duration::from_secs(1), DispatchFlags::BARRIER, work("late"));

    assert!(dispatcher.dispatch_next(Duration::from_millis(900)));
    assert!(log.lock().unwrap().is_empty());
    assert!(!task.is_vanished());

    assert!(dispatcher.dispatch_next(Duration::from_millis(100)));
    assert_eq!(*log.lock().unwrap(), vec!["late"]);
    assert!(task.is_vanished());
    assert_eq!(dispatcher.now(), Duration::from_secs(1));
  }

  #[monitor_macro::test]
  fn cancelled_task_never_runs() {
    let dispatcher = ManualDispatcher::new("cancel");
    let (log, work) = recorder();
    let task = dispatcher.run(DispatchFlags::NONE, work("never"));
    task.cancel();
    assert!(task.is_vanished());
    assert_eq!(dispatcher.pending_count(), 0);
    assert!(!dispatcher.dispatch_next(Duration::ZERO));
    assert!(log.lock().unwrap().is_empty());
  }

  #[monitor_macro::test]
  fn concurrent_batch_stops_at_barrier() {
    let dispatcher = ManualDispatcher::with_simultaneous_operations("pool", 3);
    let (log, work) = recorder();
    let _a = dispatcher.run(DispatchFlags::NONE, work("a"));
    let _b = dispatcher.run(DispatchFlags::NONE, work("b"));
    let _c = dispatcher.run(DispatchFlags::BARRIER, work("c"));
    let _d = dispatcher.run(DispatchFlags::NONE, work("d"));

    dispatcher.dispatch_next(Duration::ZERO);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    dispatcher.dispatch_next(Duration::ZERO);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    dispatcher.dispatch_next(Duration::ZERO);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "d"]);
  }

  #[monitor_macro::test]
  fn batch_runs_without_barrier() {
    let dispatcher = ManualDispatcher::with_simultaneous_operations("pool", 2);
    let d1 = dispatcher.clone();
    let d2 = dispatcher.clone();
    let _a = dispatcher.run(
      DispatchFlags::NONE,
      Box::new(move || d1.assert_is_current(DispatchFlags::NONE)),
    );
    let _b = dispatcher.run(
      DispatchFlags::NONE,
      Box::new(move || d2.assert_is_current(DispatchFlags::NONE)),
    );
    dispatcher.dispatch_next(Duration::ZERO);
    assert_eq!(dispatcher.pending_count(), 0);
  }

  #[monitor_macro::test]
  fn run_sync_drains_work_queued_before_it() {
    let dispatcher = ManualDispatcher::new("sync");
    let (log, work) = recorder();
    let _a = dispatcher.run(DispatchFlags::BARRIER, work("queued"));
    let inner = dispatcher.clone();
    let value = dispatcher.run_sync(DispatchFlags::BARRIER, || {
      inner.assert_is_current(DispatchFlags::BARRIER);
      42
    });
    assert_eq!(value, 42);
    assert_eq!(*log.lock().unwrap(), vec!["queued"]);
  }

  #[monitor_macro::test]
  fn flush_jumps_over_delays() {
    let dispatcher = ManualDispatcher::new("flush");
    let (log, work) = recorder();
    let _late = dispatcher.run_after(Duration::from_secs(5), DispatchFlags::NONE, work("late"));
    let _early = dispatcher.run_after(Duration::from_secs(2), DispatchFlags::NONE, work("early"));
    dispatcher.flush();
    assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
    assert_eq!(dispatcher.now(), Duration::from_secs(5));
  }

  #[monitor_macro::test]
  #[should_panic(expected = "no dispatcher is currently executing")]
  fn asserting_outside_any_context_panics() {
    ManualDispatcher::new("idle").assert_is_current(DispatchFlags::NONE);
  }

  #[monitor_macro::test]
  #[should_panic(expected = "invalid flags")]
  fn asserting_barrier_inside_default_work_panics() {
    let dispatcher = ManualDispatcher::new("flags");
    let inner = dispatcher.clone();
    let _task = dispatcher.run(
      DispatchFlags::NONE,
      Box::new(move || inner.assert_is_current(DispatchFlags::BARRIER)),
    );
    dispatcher.dispatch_next(Duration::ZERO);
  }

  #[monitor_macro::test]
  #[should_panic(expected = "another dispatcher")]
  fn asserting_from_a_foreign_context_panics() {
    let main = ManualDispatcher::new("main");
    let other = ManualDispatcher::new("other");
    let _task = main.run(
      DispatchFlags::BARRIER,
      Box::new(move || other.assert_is_current(DispatchFlags::NONE)),
    );
    main.dispatch_next(Duration::ZERO);
  }
}
