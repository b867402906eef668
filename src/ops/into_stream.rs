//! Consuming the ephemerals of a monitor as a [`futures::Stream`].
//!
//! ```rust
//! use futures::StreamExt;
//! use monitor::prelude::*;
//!
//! # async fn example() {
//! let (monitor, feed) = Monitor::<i32, ()>::make();
//! let mut stream = monitor.into_stream();
//! feed.push_ephemeral(1);
//! feed.push_terminal(());
//! assert_eq!(stream.next().await, Some(1));
//! assert_eq!(stream.next().await, None);
//! # }
//! ```

use std::{
  collections::VecDeque,
  pin::Pin,
  sync::{Arc, Mutex},
  task::{Context as TaskContext, Poll},
};

use futures::{task::AtomicWaker, Stream};

use crate::{
  monitor::{Monitor, Payload},
  subscription::Subscription,
  util::lock,
};

struct Buffer<E, T> {
  queue: VecDeque<E>,
  closed: bool,
  terminal: Option<T>,
}

struct Shared<E, T> {
  buffer: Mutex<Buffer<E, T>>,
  waker: AtomicWaker,
}

impl<E, T> Shared<E, T> {
  fn update(&self, f: impl FnOnce(&mut Buffer<E, T>)) {
    f(&mut lock(&self.buffer));
    self.waker.wake();
  }
}

/// Closes the stream when the terminal observer goes away, whether it ran
/// or the subscription was cancelled.
struct Closer<E, T> {
  shared: Arc<Shared<E, T>>,
}

impl<E, T> Drop for Closer<E, T> {
  fn drop(&mut self) { self.shared.update(|buffer| buffer.closed = true) }
}

/// Stream returned by [`Monitor::into_stream`].
///
/// Yields every ephemeral delivered after its creation and ends once the
/// monitor terminates. Dropping it cancels its subscription.
pub struct MonitorStream<E, T> {
  shared: Arc<Shared<E, T>>,
  subscription: Subscription,
}

impl<E, T: Clone> MonitorStream<E, T> {
  /// The terminal that ended the stream, if one did.
  pub fn terminal(&self) -> Option<T> { lock(&self.shared.buffer).terminal.clone() }
}

impl<E, T> Stream for MonitorStream<E, T> {
  type Item = E;

  fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<E>> {
    self.shared.waker.register(cx.waker());
    let mut buffer = lock(&self.shared.buffer);
    if let Some(ephemeral) = buffer.queue.pop_front() {
      return Poll::Ready(Some(ephemeral));
    }
    if buffer.closed {
      return Poll::Ready(None);
    }
    Poll::Pending
  }
}

impl<E, T> Drop for MonitorStream<E, T> {
  fn drop(&mut self) { self.subscription.cancel() }
}

impl<E: Payload, T: Payload> Monitor<E, T> {
  /// Buffers ephemerals until the stream polls them.
  pub fn into_stream(&self) -> MonitorStream<E, T> {
    let shared = Arc::new(Shared {
      buffer: Mutex::new(Buffer { queue: VecDeque::new(), closed: false, terminal: None }),
      waker: AtomicWaker::new(),
    });
    let on_ephemeral = shared.clone();
    let closer = Closer { shared: shared.clone() };
    let subscription = self.observe(
      move |ephemeral| on_ephemeral.update(|buffer| buffer.queue.push_back(ephemeral)),
      move |terminal| closer.shared.update(|buffer| buffer.terminal = Some(terminal)),
    );
    MonitorStream { shared, subscription }
  }
}

#[cfg(test)]
mod tests {
  use futures::StreamExt;

  use super::*;

  #[monitor_macro::test]
  async fn yields_ephemerals_until_the_terminal() {
    let (monitor, feed) = Monitor::<i32, &str>::make();
    let mut stream = monitor.into_stream();
    feed.push_ephemeral(1);
    feed.push_ephemeral(2);
    feed.push_terminal("end");
    feed.push_ephemeral(3);

    let values: Vec<i32> = (&mut stream).collect().await;
    assert_eq!(values, vec![1, 2]);
    assert_eq!(stream.terminal(), Some("end"));
  }

  #[monitor_macro::test]
  async fn wakes_the_consumer() {
    let (monitor, feed) = Monitor::<i32, ()>::make();
    let consumer = tokio::spawn(monitor.into_stream().collect::<Vec<_>>());
    tokio::task::yield_now().await;
    feed.push_ephemeral(4);
    tokio::task::yield_now().await;
    feed.push_terminal(());
    assert_eq!(consumer.await.unwrap(), vec![4]);
  }

  #[monitor_macro::test]
  async fn cancelled_subscription_ends_the_stream() {
    let (monitor, _feed) = Monitor::<i32, ()>::make();
    let mut stream = monitor.into_stream();
    stream.subscription.cancel();
    assert_eq!(stream.next().await, None);
    assert_eq!(stream.terminal(), None);
  }

  #[monitor_macro::test]
  fn dropping_the_stream_releases_the_monitor() {
    let (monitor, feed) = Monitor::<i32, ()>::make();
    let stream = monitor.into_stream();
    drop(monitor);
    assert!(!feed.is_abandoned());
    drop(stream);
    assert!(feed.is_abandoned());
  }
}
