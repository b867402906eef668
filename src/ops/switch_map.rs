use std::{
  marker::PhantomData,
  sync::{Arc, Mutex},
};

use crate::{
  context::ContextAccessor,
  monitor::{Feed, Monitor, Payload},
  subscription::{associate::associate_slot, Subscription},
  thread_safety::ThreadSafety,
  transform::Transformer,
  util::lock,
};

#[derive(Clone, Default)]
struct SwitchState {
  active: Option<Subscription>,
}

pub struct SwitchMapOp<E, T, OE, OT, FE, FT> {
  feed: Feed<OE, OT>,
  map_ephemeral: FE,
  map_terminal: Mutex<Option<FT>>,
  context: ContextAccessor<SwitchState>,
  _source: PhantomData<fn(E, T)>,
}

impl<E, T, OE, OT, FE, FT> SwitchMapOp<E, T, OE, OT, FE, FT>
where
  OE: Payload,
  OT: Payload,
{
  fn switch_to(&self, inner: Monitor<OE, OT>) {
    let previous = self.context.read_write(|state| state.active.take());
    if let Some(previous) = previous {
      previous.cancel();
    }
    let (on_ephemeral, on_terminal) = (self.feed.clone(), self.feed.clone());
    let subscription = inner.observe(
      move |ephemeral| on_ephemeral.push_ephemeral(ephemeral),
      move |terminal| on_terminal.push_terminal(terminal),
    );
    associate_slot(&subscription, &self.context, |state| &mut state.active);
  }
}

impl<E, T, OE, OT, FE, FT> Transformer<E, T> for SwitchMapOp<E, T, OE, OT, FE, FT>
where
  E: Payload,
  T: Payload,
  OE: Payload,
  OT: Payload,
  FE: Fn(E) -> Monitor<OE, OT> + Send + Sync + 'static,
  FT: FnOnce(T) -> Monitor<OE, OT> + Send + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) { self.switch_to((self.map_ephemeral)(ephemeral)) }

  fn eat_terminal(&self, terminal: T) {
    let map_terminal = lock(&self.map_terminal).take();
    if let Some(map_terminal) = map_terminal {
      self.switch_to(map_terminal(terminal));
    }
  }

  fn cancel(&self, source: &Subscription) {
    source.cancel();
    if let Some(active) = self.context.read(|state| state.active.clone()) {
      active.cancel();
    }
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Maps every ephemeral, and finally the terminal, to an inner monitor and
  /// only follows the latest one. Each new inner monitor cancels the
  /// previous. The first inner terminal terminates the result.
  pub fn switch_map<OE, OT, FE, FT>(
    &self,
    map_ephemeral: FE,
    map_terminal: FT,
    strategy: Arc<dyn ThreadSafety>,
  ) -> Monitor<OE, OT>
  where
    OE: Payload,
    OT: Payload,
    FE: Fn(E) -> Monitor<OE, OT> + Send + Sync + 'static,
    FT: FnOnce(T) -> Monitor<OE, OT> + Send + 'static,
  {
    self.transform(move |feed| SwitchMapOp {
      feed,
      map_ephemeral,
      map_terminal: Mutex::new(Some(map_terminal)),
      context: ContextAccessor::synchronized(SwitchState::default(), strategy),
      _source: PhantomData,
    })
  }
}
