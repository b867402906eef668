//! Producer-side wrappers around a [`Feed`].
//!
//! [`Signal`] is a plain feed with producer-flavoured names.
//! [`StrictOrderedSignal`] additionally protects delivery order against
//! observers that push back into the signal while a value is propagating:
//! such pushes are queued and delivered after the current value reached
//! every subscriber.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
};

use crate::{
  monitor::{Feed, Monitor, Payload},
  util::lock,
};

#[derive(Clone)]
pub struct Signal<E, T> {
  feed: Feed<E, T>,
}

impl<E: Payload, T: Payload> Signal<E, T> {
  pub fn make() -> (Monitor<E, T>, Self) {
    let (monitor, feed) = Monitor::make();
    (monitor, Signal { feed })
  }

  pub fn emit(&self, ephemeral: E) { self.feed.push_ephemeral(ephemeral) }

  pub fn terminate(&self, terminal: T) { self.feed.push_terminal(terminal) }

  pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) { self.feed.on_cancel(callback) }

  pub fn is_abandoned(&self) -> bool { self.feed.is_abandoned() }
}

struct InFlight<E, T> {
  queue: VecDeque<E>,
  terminal: Option<T>,
}

enum Next<E, T> {
  Ephemeral(E),
  Terminal(T),
}

struct Inner<E, T> {
  feed: Feed<E, T>,
  in_flight: Mutex<Option<InFlight<E, T>>>,
}

/// A signal that never lets a re-entrant push overtake the value currently
/// being delivered.
///
/// - An ephemeral emitted while another one propagates is queued.
/// - A terminal emitted while something propagates is deferred until the
///   queue drained. The first deferred terminal wins.
/// - Ephemerals emitted once a terminal is deferred are dropped.
pub struct StrictOrderedSignal<E, T> {
  inner: Arc<Inner<E, T>>,
}

impl<E, T> Clone for StrictOrderedSignal<E, T> {
  fn clone(&self) -> Self { StrictOrderedSignal { inner: self.inner.clone() } }
}

impl<E: Payload, T: Payload> StrictOrderedSignal<E, T> {
  pub fn make() -> (Monitor<E, T>, Self) {
    let (monitor, feed) = Monitor::make();
    let signal = StrictOrderedSignal { inner: Arc::new(Inner { feed, in_flight: Mutex::new(None) }) };
    (monitor, signal)
  }

  pub fn emit(&self, ephemeral: E) {
    {
      let mut in_flight = lock(&self.inner.in_flight);
      match &mut *in_flight {
        Some(pending) => {
          if pending.terminal.is_none() {
            pending.queue.push_back(ephemeral);
          }
          return;
        }
        None => *in_flight = Some(InFlight { queue: VecDeque::new(), terminal: None }),
      }
    }
    self.propagate(Next::Ephemeral(ephemeral));
  }

  pub fn terminate(&self, terminal: T) {
    {
      let mut in_flight = lock(&self.inner.in_flight);
      if let Some(pending) = &mut *in_flight {
        if pending.terminal.is_none() {
          pending.terminal = Some(terminal);
        }
        return;
      }
    }
    self.inner.feed.push_terminal(terminal);
  }

  pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) { self.inner.feed.on_cancel(callback) }

  pub fn is_abandoned(&self) -> bool { self.inner.feed.is_abandoned() }

  fn propagate(&self, mut next: Next<E, T>) {
    loop {
      match next {
        Next::Ephemeral(ephemeral) => self.inner.feed.push_ephemeral(ephemeral),
        Next::Terminal(terminal) => {
          self.inner.feed.push_terminal(terminal);
          return;
        }
      }
      next = {
        let mut in_flight = lock(&self.inner.in_flight);
        let Some(pending) = in_flight.as_mut() else { return };
        if let Some(ephemeral) = pending.queue.pop_front() {
          Next::Ephemeral(ephemeral)
        } else if let Some(terminal) = pending.terminal.take() {
          *in_flight = None;
          Next::Terminal(terminal)
        } else {
          *in_flight = None;
          return;
        }
      };
    }
  }
}
