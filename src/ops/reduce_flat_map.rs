use std::{marker::PhantomData, sync::Arc};

use crate::{
  context::ContextAccessor,
  monitor::{Feed, Monitor, Payload},
  subscription::{associate::associate, Subscription},
  thread_safety::ThreadSafety,
  transform::Transformer,
};

#[derive(Clone)]
struct ReduceState<OT> {
  active: Vec<Subscription>,
  terminated: bool,
  accumulator: Option<OT>,
}

impl<OT> ReduceState<OT> {
  fn finish(&mut self) -> Option<OT> {
    if self.terminated && self.active.is_empty() {
      self.accumulator.take()
    } else {
      None
    }
  }
}

pub struct ReduceFlatMapOp<E, T, OE, IT, OT, FE, RI, RT> {
  feed: Feed<OE, OT>,
  map_ephemeral: FE,
  reduce_inner: Arc<RI>,
  reduce_terminal: RT,
  context: ContextAccessor<ReduceState<OT>>,
  _types: PhantomData<fn(E, T, IT)>,
}

impl<E, T, OE, IT, OT, FE, RI, RT> Transformer<E, T> for ReduceFlatMapOp<E, T, OE, IT, OT, FE, RI, RT>
where
  E: Payload,
  T: Payload,
  OE: Payload,
  IT: Payload,
  OT: Payload,
  FE: Fn(E) -> Monitor<OE, IT> + Send + Sync + 'static,
  RI: Fn(OT, IT) -> OT + Send + Sync + 'static,
  RT: Fn(OT, T) -> OT + Send + Sync + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) {
    let on_ephemeral = self.feed.clone();
    let (weak, reduce_inner) = (self.context.weakify(), self.reduce_inner.clone());
    let subscription = (self.map_ephemeral)(ephemeral).observe(
      move |ephemeral| on_ephemeral.push_ephemeral(ephemeral),
      move |terminal| {
        weak.read_write(|state| {
          state.accumulator = state.accumulator.take().map(|accumulator| reduce_inner(accumulator, terminal));
        });
      },
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

  fn eat_terminal(&self, terminal: T) {
    let finished = self.context.read_write(|state| {
      state.accumulator = state.accumulator.take().map(|accumulator| (self.reduce_terminal)(accumulator, terminal));
      state.terminated = true;
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
  /// Like [`Monitor::flat_map`], but folds into a seeded accumulator: every
  /// inner terminal goes through `reduce_inner` and the upstream terminal
  /// through `reduce_terminal`. The accumulator is emitted once the upstream
  /// and every inner monitor have terminated.
  pub fn reduce_flat_map<OE, IT, OT, FE, RI, RT>(
    &self,
    accumulator: OT,
    map_ephemeral: FE,
    reduce_inner: RI,
    reduce_terminal: RT,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Monitor<OE, OT>
  where
    OE: Payload,
    IT: Payload,
    OT: Payload,
    FE: Fn(E) -> Monitor<OE, IT> + Send + Sync + 'static,
    RI: Fn(OT, IT) -> OT + Send + Sync + 'static,
    RT: Fn(OT, T) -> OT + Send + Sync + 'static,
  {
    self.transform(move |feed| ReduceFlatMapOp {
      feed,
      map_ephemeral,
      reduce_inner: Arc::new(reduce_inner),
      reduce_terminal,
      context: ContextAccessor::synchronized(
        ReduceState { active: Vec::new(), terminated: false, accumulator: Some(accumulator) },
        strategy,
      ),
      _types: PhantomData,
    })
  }
}
