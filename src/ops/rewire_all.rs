use std::sync::Arc;

use crate::{
  monitor::{Monitor, Payload},
  ops::rewire::Rewiring,
  subscription::Subscription,
  thread_safety::ThreadSafety,
  transform::Transformer,
};

pub struct RewireAllOp<E, T, IE, RT, FE, R, TR> {
  rewiring: Rewiring<E, T, IE, RT, FE, R, TR>,
}

impl<E, T, IE, RT, FE, R, TR> Transformer<E, T> for RewireAllOp<E, T, IE, RT, FE, R, TR>
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
    let feed = self.rewiring.feed.clone();
    self.rewiring.spawn(ephemeral, move |drained| {
      if let Some(terminal) = drained {
        feed.push_terminal(terminal);
      }
    });
  }

  fn eat_terminal(&self, terminal: T) {
    let drained = self.rewiring.context.read_write(|state| {
      state.terminal = Some(terminal);
      state.drained()
    });
    if let Some(terminal) = drained {
      self.rewiring.feed.push_terminal(terminal);
    }
  }

  fn cancel(&self, source: &Subscription) { self.rewiring.cancel_all(source) }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Like [`Monitor::rewire`], but the upstream terminal is withheld until
  /// every inner monitor has terminated.
  pub fn rewire_all<IE, RT, FE, R, TR>(
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
    self.transform(move |feed| RewireAllOp {
      rewiring: Rewiring::new(feed, map_ephemeral, reduce, terminal_reduce, strategy),
    })
  }
}
