use std::marker::PhantomData;

use crate::{
  context::ContextAccessor,
  monitor::{Feed, Monitor, Payload},
  subscription::{associate::associate_slot, Subscription},
  transform::Transformer,
};

#[derive(Clone, Default)]
struct ExtendState {
  extension: Option<Subscription>,
}

pub struct ExtendOp<E, T, RT, X> {
  feed: Feed<E, RT>,
  extender: X,
  context: ContextAccessor<ExtendState>,
  _terminal: PhantomData<fn(T)>,
}

impl<E, T, RT, X> Transformer<E, T> for ExtendOp<E, T, RT, X>
where
  E: Payload,
  T: Payload,
  RT: Payload,
  X: Fn(T) -> Monitor<E, RT> + Send + Sync + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) { self.feed.push_ephemeral(ephemeral) }

  fn eat_terminal(&self, terminal: T) {
    let (on_ephemeral, on_terminal) = (self.feed.clone(), self.feed.clone());
    let subscription = (self.extender)(terminal).observe(
      move |ephemeral| on_ephemeral.push_ephemeral(ephemeral),
      move |terminal| on_terminal.push_terminal(terminal),
    );
    associate_slot(&subscription, &self.context, |state| &mut state.extension);
  }

  fn cancel(&self, source: &Subscription) {
    source.cancel();
    if let Some(extension) = self.context.read(|state| state.extension.clone()) {
      extension.cancel();
    }
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Continues the stream with the monitor `extender` builds from the
  /// terminal. Its ephemerals follow the upstream ones and its terminal
  /// becomes the result's terminal.
  pub fn extend<RT, X>(&self, extender: X) -> Monitor<E, RT>
  where
    RT: Payload,
    X: Fn(T) -> Monitor<E, RT> + Send + Sync + 'static,
  {
    self.transform(move |feed| ExtendOp {
      feed,
      extender,
      context: ContextAccessor::free(ExtendState::default()),
      _terminal: PhantomData,
    })
  }
}
