use std::{marker::PhantomData, sync::Arc};

use crate::{
  context::ContextAccessor,
  monitor::{Feed, Monitor, Payload},
  subscription::{associate::associate_slot, Subscription},
  thread_safety::ThreadSafety,
  transform::Transformer,
};

#[derive(Clone)]
struct SwitchState<IE> {
  active: Option<Subscription>,
  accumulator: Option<IE>,
}

pub struct RewireSwitchOp<E, T, IE, RT, FE, R, TR> {
  feed: Feed<RT, T>,
  map_ephemeral: FE,
  reduce: Arc<R>,
  terminal_reduce: Arc<TR>,
  context: ContextAccessor<SwitchState<IE>>,
  _source: PhantomData<fn(E)>,
}

impl<E, T, IE, RT, FE, R, TR> Transformer<E, T> for RewireSwitchOp<E, T, IE, RT, FE, R, TR>
where
  E: Payload,
  T: Payload,
  IE: Payload,
  RT: Payload,
  FE: Fn(E) -> Monitor<IE, RT> + Send + Sync + 'static,
  R: Fn(IE, IE) -> IE + Send + Sync + 'static,
  TR: Fn(RT, IE) -> RT + Send + Sync + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) {
    let previous = self.context.read_write(|state| {
      state.accumulator = None;
      state.active.take()
    });
    if let Some(previous) = previous {
      previous.cancel();
    }

    let (on_ephemeral, reduce) = (self.context.weakify(), self.reduce.clone());
    let (on_terminal, terminal_reduce) = (self.context.weakify(), self.terminal_reduce.clone());
    let feed = self.feed.clone();
    let subscription = (self.map_ephemeral)(ephemeral).observe(
      move |ephemeral| {
        on_ephemeral.read_write(|state| {
          state.accumulator = Some(match state.accumulator.take() {
            Some(accumulator) => reduce(accumulator, ephemeral),
            None => ephemeral,
          });
        });
      },
      move |terminal| {
        let accumulator = on_terminal.read_write(|state| state.accumulator.take()).flatten();
        feed.push_ephemeral(match accumulator {
          Some(accumulator) => terminal_reduce(terminal, accumulator),
          None => terminal,
        });
      },
    );
    associate_slot(&subscription, &self.context, |state| &mut state.active);
  }

  fn eat_terminal(&self, terminal: T) { self.feed.push_terminal(terminal) }

  fn cancel(&self, source: &Subscription) {
    if let Some(active) = self.context.read(|state| state.active.clone()) {
      active.cancel();
    }
    source.cancel();
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Like [`Monitor::rewire`], but only the latest inner monitor is followed.
  /// A new upstream ephemeral cancels the previous inner monitor and discards
  /// its partial accumulator.
  pub fn rewire_switch<IE, RT, FE, R, TR>(
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
    self.transform(move |feed| RewireSwitchOp {
      feed,
      map_ephemeral,
      reduce: Arc::new(reduce),
      terminal_reduce: Arc::new(terminal_reduce),
      context: ContextAccessor::synchronized(SwitchState { active: None, accumulator: None }, strategy),
      _source: PhantomData,
    })
  }
}
