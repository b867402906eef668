//! Per-inner-monitor accumulation.
//!
//! `rewire` turns every upstream ephemeral into an inner monitor, folds that
//! monitor's ephemerals with `reduce`, and emits one value when it
//! terminates: `terminal_reduce(inner_terminal, accumulator)`, or the inner
//! terminal alone when the inner monitor emitted nothing. Inner monitors are
//! tracked independently under increasing ids.

use std::{collections::BTreeMap, marker::PhantomData, sync::Arc};

use crate::{
  context::{ContextAccessor, WeakContextAccessor},
  monitor::{Feed, Monitor, Payload},
  subscription::{associate::associate, Subscription},
  thread_safety::ThreadSafety,
  transform::Transformer,
};

#[derive(Clone)]
pub(crate) struct RewireNode<IE> {
  pub(crate) subscription: Option<Subscription>,
  pub(crate) accumulator: Option<IE>,
}

#[derive(Clone)]
pub(crate) struct RewireState<IE, T> {
  pub(crate) next_id: u64,
  pub(crate) nodes: BTreeMap<u64, RewireNode<IE>>,
  /// Upstream terminal waiting for the inner monitors, if they are awaited.
  pub(crate) terminal: Option<T>,
}

impl<IE, T> RewireState<IE, T> {
  pub(crate) fn new() -> Self { RewireState { next_id: 0, nodes: BTreeMap::new(), terminal: None } }

  /// The withheld terminal, once no inner monitor is left.
  pub(crate) fn drained(&mut self) -> Option<T> {
    if self.nodes.is_empty() {
      self.terminal.take()
    } else {
      None
    }
  }
}

/// Folds one inner ephemeral into the node `id`.
///
/// # Panics
///
/// Panics if the node is unknown.
pub(crate) fn reduce_into<IE, T, R>(state: &mut RewireState<IE, T>, id: u64, ephemeral: IE, reduce: &R)
where
  R: Fn(IE, IE) -> IE,
{
  let Some(node) = state.nodes.get_mut(&id) else {
    panic!("misplaced rewire node {id}");
  };
  node.accumulator = Some(match node.accumulator.take() {
    Some(accumulator) => reduce(accumulator, ephemeral),
    None => ephemeral,
  });
}

pub(crate) struct Rewiring<E, T, IE, RT, FE, R, TR> {
  pub(crate) feed: Feed<RT, T>,
  pub(crate) map_ephemeral: FE,
  pub(crate) reduce: Arc<R>,
  pub(crate) terminal_reduce: Arc<TR>,
  pub(crate) context: ContextAccessor<RewireState<IE, T>>,
  _source: PhantomData<fn(E)>,
}

impl<E, T, IE, RT, FE, R, TR> Rewiring<E, T, IE, RT, FE, R, TR>
where
  E: Payload,
  T: Payload,
  IE: Payload,
  RT: Payload,
  FE: Fn(E) -> Monitor<IE, RT> + Send + Sync + 'static,
  R: Fn(IE, IE) -> IE + Send + Sync + 'static,
  TR: Fn(RT, IE) -> RT + Send + Sync + 'static,
{
  pub(crate) fn new(
    feed: Feed<RT, T>,
    map_ephemeral: FE,
    reduce: R,
    terminal_reduce: TR,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Self {
    Rewiring {
      feed,
      map_ephemeral,
      reduce: Arc::new(reduce),
      terminal_reduce: Arc::new(terminal_reduce),
      context: ContextAccessor::synchronized(RewireState::new(), strategy),
      _source: PhantomData,
    }
  }

  /// Spawns the inner monitor for `ephemeral`. Once it vanishes, its node is
  /// removed and `settle` receives the withheld terminal if that was the last
  /// node.
  pub(crate) fn spawn(&self, ephemeral: E, settle: impl FnOnce(Option<T>) + Send + 'static) {
    let id = self.context.read_write(|state| {
      let id = state.next_id;
      state.next_id += 1;
      state.nodes.insert(id, RewireNode { subscription: None, accumulator: None });
      id
    });

    let (weak, reduce) = (self.context.weakify(), self.reduce.clone());
    let (on_terminal, terminal_reduce) = (self.context.weakify(), self.terminal_reduce.clone());
    let feed = self.feed.clone();
    let subscription = (self.map_ephemeral)(ephemeral).observe(
      move |ephemeral| {
        weak.read_write(|state| reduce_into(state, id, ephemeral, &*reduce));
      },
      move |terminal| emit_reduced(&on_terminal, id, terminal, &*terminal_reduce, &feed),
    );

    associate(
      &subscription,
      &self.context,
      move |state, handle| {
        if let Some(node) = state.nodes.get_mut(&id) {
          node.subscription = Some(handle);
        }
      },
      move |state, _| {
        state.nodes.remove(&id);
        state.drained()
      },
      settle,
    );
  }

  pub(crate) fn cancel_all(&self, source: &Subscription) {
    let inner: Vec<Subscription> =
      self.context.read(|state| state.nodes.values().filter_map(|node| node.subscription.clone()).collect());
    for subscription in inner {
      subscription.cancel();
    }
    source.cancel();
  }
}

fn emit_reduced<IE, T, RT, TR>(
  context: &WeakContextAccessor<RewireState<IE, T>>,
  id: u64,
  terminal: RT,
  terminal_reduce: &TR,
  feed: &Feed<RT, T>,
) where
  IE: Clone,
  T: Payload,
  RT: Payload,
  TR: Fn(RT, IE) -> RT,
{
  let accumulator = context
    .read(|state| state.nodes.get(&id).and_then(|node| node.accumulator.clone()))
    .flatten();
  let reduced = match accumulator {
    Some(accumulator) => terminal_reduce(terminal, accumulator),
    None => terminal,
  };
  feed.push_ephemeral(reduced);
}

pub struct RewireOp<E, T, IE, RT, FE, R, TR> {
  rewiring: Rewiring<E, T, IE, RT, FE, R, TR>,
}

impl<E, T, IE, RT, FE, R, TR> Transformer<E, T> for RewireOp<E, T, IE, RT, FE, R, TR>
where
  E: Payload,
  T: Payload,
  IE: Payload,
  RT: Payload,
  FE: Fn(E) -> Monitor<IE, RT> + Send + Sync + 'static,
  R: Fn(IE, IE) -> IE + Send + Sync + 'static,
  TR: Fn(RT, IE) -> RT + Send + Sync + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) { self.rewiring.spawn(ephemeral, |_| {}) }

  fn eat_terminal(&self, terminal: T) { self.rewiring.feed.push_terminal(terminal) }

  fn cancel(&self, source: &Subscription) { self.rewiring.cancel_all(source) }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Emits one reduced value per inner monitor, as each of them terminates.
  /// The upstream terminal is forwarded right away and cancels the inner
  /// monitors still running.
  pub fn rewire<IE, RT, FE, R, TR>(
    &self,
    map_ephemeral: FE,
    reduce: R,
    terminal_reduce: TR,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Monitor<RT, T>
  where
    IE: Payload,
    RT: Payload,
    FE: Fn(E) -> Monitor<IE, RT> + Send + Sync + 'static,
    R: Fn(IE, IE) -> IE + Send + Sync + 'static,
    TR: Fn(RT, IE) -> RT + Send + Sync + 'static,
  {
    self.transform(move |feed| RewireOp {
      rewiring: Rewiring::new(feed, map_ephemeral, reduce, terminal_reduce, strategy),
    })
  }
}
