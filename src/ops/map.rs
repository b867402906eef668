use std::sync::Mutex;

use crate::{
  monitor::{Feed, Monitor, Payload},
  transform::Transformer,
  util::lock,
};

pub struct MapOp<OE, OT, FE, FT> {
  feed: Feed<OE, OT>,
  map_ephemeral: FE,
  map_terminal: Mutex<Option<FT>>,
}

impl<E, T, OE, OT, FE, FT> Transformer<E, T> for MapOp<OE, OT, FE, FT>
where
  OE: Payload,
  OT: Payload,
  FE: Fn(E) -> OE + Send + Sync + 'static,
  FT: FnOnce(T) -> OT + Send + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) { self.feed.push_ephemeral((self.map_ephemeral)(ephemeral)) }

  fn eat_terminal(&self, terminal: T) {
    let map_terminal = lock(&self.map_terminal).take();
    if let Some(map_terminal) = map_terminal {
      self.feed.push_terminal(map_terminal(terminal));
    }
  }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Creates a monitor which calls `map_ephemeral` on each ephemeral and
  /// `map_terminal` on the terminal, emitting their results.
  pub fn map<OE, OT, FE, FT>(&self, map_ephemeral: FE, map_terminal: FT) -> Monitor<OE, OT>
  where
    OE: Payload,
    OT: Payload,
    FE: Fn(E) -> OE + Send + Sync + 'static,
    FT: FnOnce(T) -> OT + Send + 'static,
  {
    self.transform(move |feed| MapOp { feed, map_ephemeral, map_terminal: Mutex::new(Some(map_terminal)) })
  }

  pub fn map_ephemeral<OE, FE>(&self, map_ephemeral: FE) -> Monitor<OE, T>
  where
    OE: Payload,
    FE: Fn(E) -> OE + Send + Sync + 'static,
  {
    self.map(map_ephemeral, |terminal| terminal)
  }

  pub fn map_terminal<OT, FT>(&self, map_terminal: FT) -> Monitor<E, OT>
  where
    OT: Payload,
    FT: FnOnce(T) -> OT + Send + 'static,
  {
    self.map(|ephemeral| ephemeral, map_terminal)
  }
}
