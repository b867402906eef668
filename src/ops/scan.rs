use std::{
  convert::Infallible,
  hint,
  marker::PhantomData,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
  },
};

use log::trace;

use crate::{
  context::ContextAccessor,
  monitor::{Feed, Monitor, Payload},
  thread_safety::ThreadSafety,
  transform::Transformer,
  util::lock,
};

/// How concurrent ephemerals are folded into the accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
  /// Every reduction runs inside one read-write of the strategy, so
  /// reductions are fully serialized.
  #[default]
  Interlocked,
  /// Reductions run outside of any lock. A result is only installed if it
  /// wins a compare-and-swap on the generation counter, otherwise the
  /// reduction is retried on the newer accumulator. Works with any strategy.
  Concurrent,
}

/// `generation` is the generation the accumulator was published for.
#[derive(Clone)]
struct ScanState<A> {
  accumulator: A,
  generation: u64,
}

pub struct ScanOp<E, T, A, OT, R, TR> {
  feed: Feed<A, OT>,
  reducer: R,
  terminal_reducer: Mutex<Option<TR>>,
  mode: ScanMode,
  generation: AtomicU64,
  context: ContextAccessor<ScanState<A>>,
  _source: PhantomData<fn(E, T)>,
}

impl<E, T, A, OT, R, TR> ScanOp<E, T, A, OT, R, TR>
where
  A: Payload,
  R: Fn(A, E) -> A,
{
  fn interlocked(&self, ephemeral: E) -> A {
    self.context.read_write(|state| {
      let accumulator = (self.reducer)(state.accumulator.clone(), ephemeral);
      state.accumulator = accumulator.clone();
      state.generation += 1;
      accumulator
    })
  }

  fn concurrent(&self, ephemeral: E) -> A
  where
    E: Clone,
  {
    loop {
      let seen = self.generation.load(Ordering::Acquire);
      let (accumulator, published) = self.context.read(|state| (state.accumulator.clone(), state.generation));
      if published != seen {
        // The winner of `seen` has not published its accumulator yet.
        hint::spin_loop();
        continue;
      }
      let reduced = (self.reducer)(accumulator, ephemeral.clone());
      let won = self
        .generation
        .compare_exchange(seen, seen + 1, Ordering::AcqRel, Ordering::Acquire)
        .is_ok();
      if won {
        // Other reducers spin above until this publish lands.
        let installed = reduced.clone();
        self.context.read_write(move |state| {
          state.accumulator = installed;
          state.generation = seen + 1;
        });
        return reduced;
      }
      trace!("scan: generation {seen} is stale, reducing again");
    }
  }
}

impl<E, T, A, OT, R, TR> Transformer<E, T> for ScanOp<E, T, A, OT, R, TR>
where
  E: Payload,
  T: Payload,
  A: Payload,
  OT: Payload,
  R: Fn(A, E) -> A + Send + Sync + 'static,
  TR: FnOnce(A, T) -> OT + Send + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) {
    let accumulator = match self.mode {
      ScanMode::Interlocked => self.interlocked(ephemeral),
      ScanMode::Concurrent => self.concurrent(ephemeral),
    };
    self.feed.push_ephemeral(accumulator);
  }

  fn eat_terminal(&self, terminal: T) {
    let accumulator = self.context.read(|state| state.accumulator.clone());
    let terminal_reducer = lock(&self.terminal_reducer).take();
    if let Some(terminal_reducer) = terminal_reducer {
      self.feed.push_terminal(terminal_reducer(accumulator, terminal));
    }
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Emits every intermediate accumulator. The terminal is
  /// `terminal_reducer(accumulator, terminal)`.
  ///
  /// `strategy` guards the accumulator. With [`ScanMode::Concurrent`] the
  /// reducer itself runs outside of any write and may be called more than
  /// once for the same ephemeral.
  pub fn scan<A, OT, R, TR>(
    &self,
    accumulator: A,
    reducer: R,
    terminal_reducer: TR,
    mode: ScanMode,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Monitor<A, OT>
  where
    A: Payload,
    OT: Payload,
    R: Fn(A, E) -> A + Send + Sync + 'static,
    TR: FnOnce(A, T) -> OT + Send + 'static,
  {
    self.transform(move |feed| ScanOp {
      feed,
      reducer,
      terminal_reducer: Mutex::new(Some(terminal_reducer)),
      mode,
      generation: AtomicU64::new(0),
      context: ContextAccessor::synchronized(ScanState { accumulator, generation: 0 }, strategy),
      _source: PhantomData,
    })
  }

  /// Like [`Monitor::scan`], but only the reduced terminal is emitted.
  pub fn reduce<A, OT, R, TR>(
    &self,
    accumulator: A,
    reducer: R,
    terminal_reducer: TR,
    mode: ScanMode,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Monitor<Infallible, OT>
  where
    A: Payload,
    OT: Payload,
    R: Fn(A, E) -> A + Send + Sync + 'static,
    TR: FnOnce(A, T) -> OT + Send + 'static,
  {
    self
      .scan(accumulator, reducer, terminal_reducer, mode, strategy)
      .ignore_ephemerals()
  }
}
