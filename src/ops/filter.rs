use crate::{
  monitor::{Feed, Monitor, Payload},
  transform::Transformer,
};

pub struct FilterOp<E, T, P> {
  feed: Feed<E, T>,
  predicate: P,
}

impl<E, T, P> Transformer<E, T> for FilterOp<E, T, P>
where
  E: Payload,
  T: Payload,
  P: Fn(&E) -> bool + Send + Sync + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) {
    if (self.predicate)(&ephemeral) {
      self.feed.push_ephemeral(ephemeral);
    }
  }

  fn eat_terminal(&self, terminal: T) { self.feed.push_terminal(terminal) }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Emits only the ephemerals that satisfy `predicate`. The terminal always
  /// passes.
  pub fn filter<P>(&self, predicate: P) -> Monitor<E, T>
  where
    P: Fn(&E) -> bool + Send + Sync + 'static,
  {
    self.transform(move |feed| FilterOp { feed, predicate })
  }

  /// Drops every ephemeral, keeping the ephemeral type.
  pub fn filter_all(&self) -> Monitor<E, T> { self.filter(|_| false) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ops::test_util::{record, snapshot};

  #[monitor_macro::test]
  fn keeps_matching_ephemerals() {
    let (source, feed) = Monitor::<i32, ()>::make();
    let (events, _s) = record(&source.filter(|v| v % 2 == 0));
    for v in 0..6 {
      feed.push_ephemeral(v);
    }
    feed.push_terminal(());
    assert_eq!(snapshot(&events), vec!["e:0", "e:2", "e:4", "t:()"]);
  }

  #[monitor_macro::test]
  fn filter_all_forwards_only_the_terminal() {
    let (source, feed) = Monitor::<i32, &str>::make();
    let (events, _s) = record(&source.filter_all());
    feed.push_ephemeral(1);
    feed.push_terminal("end");
    assert_eq!(snapshot(&events), vec!["t:\"end\""]);
  }
}
