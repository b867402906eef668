use std::sync::Arc;

use crate::{
  context::ContextAccessor,
  monitor::{Feed, Monitor, Payload},
  thread_safety::{callee_sync_guaranteed, ThreadSafety},
  transform::Transformer,
};

pub struct DistinctOp<E, T, Q> {
  feed: Feed<E, T>,
  is_equal: Q,
  previous: ContextAccessor<Option<E>>,
}

impl<E, T, Q> Transformer<E, T> for DistinctOp<E, T, Q>
where
  E: Payload,
  T: Payload,
  Q: Fn(&E, &E) -> bool + Send + Sync + 'static,
{
  fn eat_ephemeral(&self, ephemeral: E) {
    let emit = self.previous.read_write(|previous| {
      if previous.as_ref().map_or(false, |previous| (self.is_equal)(previous, &ephemeral)) {
        return false;
      }
      *previous = Some(ephemeral.clone());
      true
    });
    if emit {
      self.feed.push_ephemeral(ephemeral);
    }
  }

  fn eat_terminal(&self, terminal: T) { self.feed.push_terminal(terminal) }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Suppresses an ephemeral that `is_equal` considers equal to the last one
  /// emitted. The first ephemeral always passes.
  pub fn distinct_by<Q>(&self, is_equal: Q, strategy: Arc<dyn ThreadSafety>) -> Monitor<E, T>
  where
    Q: Fn(&E, &E) -> bool + Send + Sync + 'static,
  {
    self.transform(move |feed| DistinctOp {
      feed,
      is_equal,
      previous: ContextAccessor::synchronized(None, strategy),
    })
  }
}

impl<E: Payload + PartialEq, T: Payload> Monitor<E, T> {
  /// Suppresses consecutive duplicates. Delivery must already be serialized.
  pub fn distinct(&self) -> Monitor<E, T> { self.distinct_by(E::eq, callee_sync_guaranteed()) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    ops::test_util::{record, snapshot},
    thread_safety::ReadPreferredRwLock,
  };

  #[monitor_macro::test]
  fn drops_consecutive_duplicates_only() {
    let (source, feed) = Monitor::<i32, ()>::make();
    let (events, _s) = record(&source.distinct());
    for v in [1, 1, 2, 2, 2, 1, 3, 3] {
      feed.push_ephemeral(v);
    }
    feed.push_terminal(());
    assert_eq!(snapshot(&events), vec!["e:1", "e:2", "e:1", "e:3", "t:()"]);
  }

  #[monitor_macro::test]
  fn custom_comparator() {
    let (source, feed) = Monitor::<&str, ()>::make();
    let distinct = source.distinct_by(|a, b| a.len() == b.len(), Arc::new(ReadPreferredRwLock::new()));
    let (events, _s) = record(&distinct);
    for v in ["a", "b", "cc", "dd", "e"] {
      feed.push_ephemeral(v);
    }
    assert_eq!(snapshot(&events), vec!["e:\"a\"", "e:\"cc\"", "e:\"e\""]);
  }
}
