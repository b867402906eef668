use crate::monitor::{Feed, Monitor, Payload};

/// A monitor of events that completes with `()`.
pub type Observable<T> = Monitor<T, ()>;

/// An observable that may end with an error instead.
pub type FailableObservable<T, Er> = Monitor<T, Result<(), Er>>;

/// The write side of an [`Observable`].
pub struct EventSource<T> {
  feed: Feed<T, ()>,
}

impl<T: Payload> EventSource<T> {
  pub fn make() -> (Observable<T>, Self) {
    let (observable, feed) = Monitor::make();
    (observable, EventSource { feed })
  }

  pub fn next(&self, event: T) { self.feed.push_ephemeral(event) }

  pub fn complete(&self) { self.feed.push_terminal(()) }

  pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) { self.feed.on_cancel(callback) }

  pub fn is_abandoned(&self) -> bool { self.feed.is_abandoned() }
}

/// The write side of a [`FailableObservable`].
pub struct FailableEventSource<T, Er> {
  feed: Feed<T, Result<(), Er>>,
}

impl<T: Payload, Er: Payload> FailableEventSource<T, Er> {
  pub fn make() -> (FailableObservable<T, Er>, Self) {
    let (observable, feed) = Monitor::make();
    (observable, FailableEventSource { feed })
  }

  pub fn next(&self, event: T) { self.feed.push_ephemeral(event) }

  pub fn complete(&self) { self.feed.push_terminal(Ok(())) }

  pub fn fail(&self, error: Er) { self.feed.push_terminal(Err(error)) }

  pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) { self.feed.on_cancel(callback) }

  pub fn is_abandoned(&self) -> bool { self.feed.is_abandoned() }
}
