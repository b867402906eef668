//! Merging a homogeneous collection of monitors into one.
//!
//! [`mix`] observes every input and routes its values, tagged with the
//! input's index, into a [`Mixer`] that decides what the merged monitor
//! emits. [`collect`], [`all`], [`all_ok`], [`any`] and [`any_ok`] are the
//! stock mixers.

use std::{convert::Infallible, marker::PhantomData, sync::Arc};

use crate::{
  context::ContextAccessor,
  error::AggregatedError,
  monitor::{Feed, Monitor, Payload, TerminalInterceptor},
  subscription::Subscription,
  thread_safety::ReadPreferredRwLock,
};

/// Consumes the values of every input of [`mix`].
///
/// Inputs may deliver from different threads, so implementations guard
/// their own state.
pub trait Mixer<E, T>: Send + Sync + 'static {
  fn eat_ephemeral(&self, ephemeral: E, index: usize);

  fn eat_terminal(&self, terminal: T, index: usize);

  /// Called once the merged monitor terminates or is dropped.
  fn cancel(&self, sources: &[Subscription]) {
    for source in sources {
      source.cancel();
    }
  }
}

/// Merges `monitors` through the mixer `make` builds. `make` receives the
/// number of inputs and the feed of the merged monitor.
///
/// As soon as the merged monitor receives its terminal every input
/// subscription is cancelled. The result inherits the dispatcher of the
/// first bound input unless `make` bound it already.
pub fn mix<E, T, OE, OT, M>(monitors: &[Monitor<E, T>], make: impl FnOnce(usize, Feed<OE, OT>) -> M) -> Monitor<OE, OT>
where
  E: Payload,
  T: Payload,
  OE: Payload,
  OT: Payload,
  M: Mixer<E, T>,
{
  let interceptor = Arc::new(TerminalInterceptor::new());
  let (result, feed) = Monitor::<OE, OT>::make();
  let feed = feed.intercept_terminal(interceptor.clone());

  let mixer = Arc::new(make(monitors.len(), feed.clone()));
  let sources: Vec<Subscription> = monitors
    .iter()
    .enumerate()
    .map(|(index, monitor)| {
      let (on_ephemeral, on_terminal) = (mixer.clone(), mixer.clone());
      monitor.observe(
        move |ephemeral| on_ephemeral.eat_ephemeral(ephemeral, index),
        move |terminal| on_terminal.eat_terminal(terminal, index),
      )
    })
    .collect();
  for source in &sources {
    interceptor.arm(source.clone());
  }
  feed.on_cancel(move || mixer.cancel(&sources));

  if !feed.is_bound() {
    if let Some(dispatcher) = monitors.iter().find_map(Monitor::dispatcher) {
      feed.bind_context(dispatcher);
    }
  }
  result
}

#[derive(Clone)]
struct CollectState<A> {
  pending: usize,
  accumulator: A,
  done: bool,
}

struct Collector<E, T, OE, A, FE, R> {
  feed: Feed<OE, A>,
  map_ephemeral: FE,
  reduce_terminal: R,
  context: ContextAccessor<CollectState<A>>,
  _source: PhantomData<fn(E, T)>,
}

impl<E, T, OE, A, FE, R> Mixer<E, T> for Collector<E, T, OE, A, FE, R>
where
  E: Payload,
  T: Payload,
  OE: Payload,
  A: Payload,
  FE: Fn(E, usize) -> OE + Send + Sync + 'static,
  R: Fn(&mut A, T, usize) -> bool + Send + Sync + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E, index: usize) {
    self.feed.push_ephemeral((self.map_ephemeral)(ephemeral, index))
  }

  fn eat_terminal(&self, terminal: T, index: usize) {
    let finished = self.context.read_write(|state| {
      if state.done {
        return None;
      }
      let early = (self.reduce_terminal)(&mut state.accumulator, terminal, index);
      state.pending -= 1;
      state.done = early || state.pending == 0;
      state.done.then(|| state.accumulator.clone())
    });
    if let Some(accumulator) = finished {
      self.feed.push_terminal(accumulator);
    }
  }
}

/// Maps every ephemeral with its input index and folds every terminal into
/// `accumulator`.
///
/// The merged monitor terminates with the accumulator once every input
/// terminated, or as soon as `reduce_terminal` returns `true`. With no
/// inputs it is terminated from the start.
pub fn collect<E, T, OE, A, FE, R>(
  monitors: &[Monitor<E, T>],
  map_ephemeral: FE,
  accumulator: A,
  reduce_terminal: R,
) -> Monitor<OE, A>
where
  E: Payload,
  T: Payload,
  OE: Payload,
  A: Payload,
  FE: Fn(E, usize) -> OE + Send + Sync + 'static,
  R: Fn(&mut A, T, usize) -> bool + Send + Sync + 'static,
{
  if monitors.is_empty() {
    return Monitor::terminated(accumulator);
  }
  mix(monitors, move |count, feed| Collector {
    feed,
    map_ephemeral,
    reduce_terminal,
    context: ContextAccessor::synchronized(
      CollectState { pending: count, accumulator, done: false },
      Arc::new(ReadPreferredRwLock::new()),
    ),
    _source: PhantomData,
  })
}

fn unreachable_ephemeral<OE>(never: Infallible, _: usize) -> OE { match never {} }

/// Every terminal, in input order, once all inputs terminated.
pub fn all<T: Payload>(monitors: &[Monitor<Infallible, T>]) -> Monitor<Infallible, Vec<T>> {
  let slots: Vec<Option<T>> = vec![None; monitors.len()];
  collect(monitors, unreachable_ephemeral, slots, |slots, terminal, index| {
    slots[index] = Some(terminal);
    false
  })
  .map_terminal(|slots| slots.into_iter().flatten().collect())
}

/// Like [`all`] for failable inputs. The first `Err` terminates the result
/// and cancels the inputs still pending.
pub fn all_ok<T, Er>(monitors: &[Monitor<Infallible, Result<T, Er>>]) -> Monitor<Infallible, Result<Vec<T>, Er>>
where
  T: Payload,
  Er: Payload,
{
  let slots: Result<Vec<Option<T>>, Er> = Ok(vec![None; monitors.len()]);
  collect(monitors, unreachable_ephemeral, slots, |slots, terminal, index| match terminal {
    Ok(value) => {
      if let Ok(slots) = slots {
        slots[index] = Some(value);
      }
      false
    }
    Err(error) => {
      *slots = Err(error);
      true
    }
  })
  .map_terminal(|slots| slots.map(|slots| slots.into_iter().flatten().collect()))
}

struct FirstTerminal<T> {
  feed: Feed<Infallible, T>,
}

impl<T: Payload> Mixer<Infallible, T> for FirstTerminal<T> {
  fn eat_ephemeral(&self, ephemeral: Infallible, _: usize) { match ephemeral {} }

  fn eat_terminal(&self, terminal: T, _: usize) { self.feed.push_terminal(terminal) }
}

/// The first terminal of any input.
///
/// # Panics
///
/// Panics if `monitors` is empty.
pub fn any<T: Payload>(monitors: &[Monitor<Infallible, T>]) -> Monitor<Infallible, T> {
  assert!(!monitors.is_empty(), "any needs at least one monitor");
  mix(monitors, |_, feed| FirstTerminal { feed })
}

#[derive(Clone)]
struct AnyOkState<Er> {
  pending: usize,
  errors: Vec<Er>,
}

struct FirstSuccess<T, Er> {
  feed: Feed<Infallible, Result<T, AggregatedError<Er>>>,
  context: ContextAccessor<AnyOkState<Er>>,
}

impl<T: Payload, Er: Payload> Mixer<Infallible, Result<T, Er>> for FirstSuccess<T, Er> {
  fn eat_ephemeral(&self, ephemeral: Infallible, _: usize) { match ephemeral {} }

  fn eat_terminal(&self, terminal: Result<T, Er>, _: usize) {
    let error = match terminal {
      Ok(value) => return self.feed.push_terminal(Ok(value)),
      Err(error) => error,
    };
    let exhausted = self.context.read_write(|state| {
      state.errors.push(error);
      (state.errors.len() == state.pending).then(|| state.errors.clone())
    });
    if let Some(errors) = exhausted {
      self.feed.push_terminal(Err(AggregatedError { errors }));
    }
  }
}

/// The first successful terminal of any input, or every error in arrival
/// order once all inputs failed.
///
/// # Panics
///
/// Panics if `monitors` is empty.
pub fn any_ok<T, Er>(monitors: &[Monitor<Infallible, Result<T, Er>>]) -> Monitor<Infallible, Result<T, AggregatedError<Er>>>
where
  T: Payload,
  Er: Payload,
{
  assert!(!monitors.is_empty(), "any_ok needs at least one monitor");
  mix(monitors, |count, feed| FirstSuccess {
    feed,
    context: ContextAccessor::synchronized(
      AnyOkState { pending: count, errors: Vec::with_capacity(count) },
      Arc::new(ReadPreferredRwLock::new()),
    ),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ops::test_util::{record, snapshot};

  #[monitor_macro::test]
  fn collect_maps_by_index_and_folds_terminals() {
    let (m1, f1) = Monitor::<i32, i32>::make();
    let (m2, f2) = Monitor::<i32, i32>::make();
    let result = collect(
      &[m1, m2],
      |value, index| if index == 0 { value * 7 } else { value * 13 },
      0,
      |acc, terminal, index| {
        if index == 0 {
          *acc += terminal * 2;
        } else {
          *acc -= terminal * 3;
        }
        false
      },
    );
    let (events, _s) = record(&result);

    f1.push_ephemeral(5);
    assert_eq!(snapshot(&events), vec!["e:35"]);
    f1.push_terminal(8);
    assert!(!result.is_terminated());
    f2.push_ephemeral(3);
    f2.push_terminal(7);
    assert_eq!(snapshot(&events), vec!["e:35", "e:39", "t:-5"]);
  }

  #[monitor_macro::test]
  fn collect_stops_early_and_releases_the_rest() {
    let (m1, f1) = Monitor::<i32, i32>::make();
    let (m2, f2) = Monitor::<i32, i32>::make();
    let result = collect(&[m1, m2], |value, _| value, 0, |acc, terminal, _| {
      *acc += terminal;
      terminal < 0
    });

    f1.push_terminal(-1);
    assert_eq!(result.terminal(), Some(-1));
    assert!(f2.is_abandoned());
  }

  #[monitor_macro::test]
  fn collect_without_inputs_is_terminated() {
    let result = collect(&[] as &[Monitor<i32, i32>], |value, _| value, 42, |_, _, _| false);
    assert_eq!(result.terminal(), Some(42));
  }

  #[monitor_macro::test]
  fn all_keeps_input_order() {
    let (m1, f1) = Monitor::<Infallible, &str>::make();
    let (m2, f2) = Monitor::<Infallible, &str>::make();
    let result = all(&[m1, m2]);
    f2.push_terminal("second");
    assert!(!result.is_terminated());
    f1.push_terminal("first");
    assert_eq!(result.terminal(), Some(vec!["first", "second"]));
  }

  #[monitor_macro::test]
  fn all_ok_fails_on_the_first_error() {
    let (m1, f1) = Monitor::<Infallible, Result<i32, String>>::make();
    let (m2, f2) = Monitor::<Infallible, Result<i32, String>>::make();
    let result = all_ok(&[m1, m2]);
    f1.push_terminal(Err("boom".into()));
    assert_eq!(result.terminal(), Some(Err("boom".to_string())));
    assert!(f2.is_abandoned());

    let succeeded = all_ok(&[Monitor::terminated(Ok::<_, String>(1)), Monitor::terminated(Ok(2))]);
    assert_eq!(succeeded.terminal(), Some(Ok(vec![1, 2])));
  }

  #[monitor_macro::test]
  fn any_takes_the_first_terminal() {
    let (m1, f1) = Monitor::<Infallible, i32>::make();
    let (m2, f2) = Monitor::<Infallible, i32>::make();
    let result = any(&[m1, m2]);
    f2.push_terminal(2);
    assert_eq!(result.terminal(), Some(2));
    assert!(f1.is_abandoned());
  }

  #[monitor_macro::test]
  fn any_ok_aggregates_when_everything_fails() {
    let (m1, f1) = Monitor::<Infallible, Result<i32, &str>>::make();
    let (m2, f2) = Monitor::<Infallible, Result<i32, &str>>::make();
    let (m3, f3) = Monitor::<Infallible, Result<i32, &str>>::make();
    let result = any_ok(&[m1, m2, m3]);
    f2.push_terminal(Err("b"));
    f1.push_terminal(Err("a"));
    assert!(!result.is_terminated());
    f3.push_terminal(Err("c"));
    assert_eq!(result.terminal(), Some(Err(AggregatedError { errors: vec!["b", "a", "c"] })));
  }

  #[monitor_macro::test]
  fn any_ok_prefers_a_late_success() {
    let (m1, f1) = Monitor::<Infallible, Result<i32, &str>>::make();
    let (m2, f2) = Monitor::<Infallible, Result<i32, &str>>::make();
    let result = any_ok(&[m1, m2]);
    f1.push_terminal(Err("a"));
    f2.push_terminal(Ok(3));
    assert_eq!(result.terminal(), Some(Ok(3)));
  }

  #[monitor_macro::test]
  #[should_panic(expected = "any needs at least one monitor")]
  fn any_without_inputs_panics() { let _ = any::<i32>(&[]); }
}
