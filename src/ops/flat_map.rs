use std::{
  marker::PhantomData,
  sync::{Arc, Mutex},
};

use crate::{
  context::{ContextAccessor, WeakContextAccessor},
  monitor::{Feed, Monitor, Payload},
  subscription::{associate::associate, Subscription},
  thread_safety::ThreadSafety,
  transform::Transformer,
  util::lock,
};

struct FlatMapState<OT> {
  active: Vec<Subscription>,
  upstream_done: bool,
  accumulator: Option<OT>,
}

impl<OT: Clone> Clone for FlatMapState<OT> {
  fn clone(&self) -> Self {
    FlatMapState {
      active: self.active.clone(),
      upstream_done: self.upstream_done,
      accumulator: self.accumulator.clone(),
    }
  }
}

impl<OT> FlatMapState<OT> {
  /// The reduced terminal, once the upstream and every inner monitor are
  /// done.
  fn finish(&mut self) -> Option<OT> {
    if self.upstream_done && self.active.is_empty() {
      self.accumulator.take()
    } else {
      None
    }
  }
}

pub struct FlatMapOp<E, T, OE, OT, FE, FT, R> {
  feed: Feed<OE, OT>,
  map_ephemeral: FE,
  map_terminal: Mutex<Option<FT>>,
  reducer: Arc<R>,
  context: ContextAccessor<FlatMapState<OT>>,
  _source: PhantomData<fn(E, T)>,
}

fn accumulate<OT, R>(context: &WeakContextAccessor<FlatMapState<OT>>, reducer: &R, terminal: OT)
where
  OT: Clone,
  R: Fn(OT, OT) -> OT,
{
  context.read_write(|state| {
    state.accumulator = Some(match state.accumulator.take() {
      Some(accumulator) => reducer(accumulator, terminal),
      None => terminal,
    });
  });
}

impl<E, T, OE, OT, FE, FT, R> FlatMapOp<E, T, OE, OT, FE, FT, R>
where
  OE: Payload,
  OT: Payload,
  R: Fn(OT, OT) -> OT + Send + Sync + 'static,
{
  fn spawn(&self, inner: Monitor<OE, OT>) {
    let on_ephemeral = self.feed.clone();
    let (weak, reducer) = (self.context.weakify(), self.reducer.clone());
    let subscription = inner.observe(
      move |ephemeral| on_ephemeral.push_ephemeral(ephemeral),
      move |terminal| accumulate(&weak, &*reducer, terminal),
    );
    let feed = self.feed.clone();
    associate(
      &subscription,
      &self.context,
      |state, handle| state.active.push(handle),
      |state, id| {
        state.active.retain(|candidate| candidate.id() != id);
        state.finish()
      },
      move |finished| {
        if let Some(terminal) = finished {
          feed.push_terminal(terminal);
        }
      },
    );
  }
}

impl<E, T, OE, OT, FE, FT, R> Transformer<E, T> for FlatMapOp<E, T, OE, OT, FE, FT, R>
where
  E: Payload,
  T: Payload,
  OE: Payload,
  OT: Payload,
  FE: Fn(E) -> Monitor<OE, OT> + Send + Sync + 'static,
  FT: FnOnce(T) -> Monitor<OE, OT> + Send + 'static,
  R: Fn(OT, OT) -> OT + Send + Sync + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) { self.spawn((self.map_ephemeral)(ephemeral)) }

  fn eat_terminal(&self, terminal: T) {
    let map_terminal = lock(&self.map_terminal).take();
    if let Some(map_terminal) = map_terminal {
      self.spawn(map_terminal(terminal));
    }
    let finished = self.context.read_write(|state| {
      state.upstream_done = true;
      state.finish()
    });
    if let Some(terminal) = finished {
      self.feed.push_terminal(terminal);
    }
  }

  fn cancel(&self, source: &Subscription) {
    source.cancel();
    for inner in self.context.read(|state| state.active.clone()) {
      inner.cancel();
    }
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Maps every ephemeral, and finally the terminal, to an inner monitor and
  /// merges all of them.
  ///
  /// Inner ephemerals are forwarded as they arrive. Inner terminals are
  /// folded with `reducer` in arrival order, and the result terminates once
  /// the upstream and every inner monitor have terminated.
  pub fn flat_map<OE, OT, FE, FT, R>(
    &self,
    map_ephemeral: FE,
    map_terminal: FT,
    reducer: R,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Monitor<OE, OT>
  where
    OE: Payload,
    OT: Payload,
    FE: Fn(E) -> Monitor<OE, OT> + Send + Sync + 'static,
    FT: FnOnce(T) -> Monitor<OE, OT> + Send + 'static,
    R: Fn(OT, OT) -> OT + Send + Sync + 'static,
  {
    self.transform(move |feed| FlatMapOp {
      feed,
      map_ephemeral,
      map_terminal: Mutex::new(Some(map_terminal)),
      reducer: Arc::new(reducer),
      context: ContextAccessor::synchronized(
        FlatMapState { active: Vec::new(), upstream_done: false, accumulator: None },
        strategy,
      ),
      _source: PhantomData,
    })
  }
}
