use std::convert::Infallible;

use crate::{
  monitor::{Feed, Monitor, Payload},
  subscription::Subscription,
};

/// A monitor that only ever delivers its terminal.
pub type Deferred<T> = Monitor<Infallible, T>;

/// A deferred value that may fail with `Er`.
pub type FailableDeferred<T, Er> = Monitor<Infallible, Result<T, Er>>;

/// The write side of a [`Deferred`].
pub struct Promise<T> {
  feed: Feed<Infallible, T>,
}

impl<T: Payload> Promise<T> {
  pub fn make() -> (Deferred<T>, Self) {
    let (deferred, feed) = Monitor::make();
    (deferred, Promise { feed })
  }

  pub fn resolve(&self, value: T) { self.feed.push_terminal(value) }

  /// Runs `callback` once the deferred resolves or nobody waits for it
  /// anymore.
  pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) { self.feed.on_cancel(callback) }

  pub fn is_abandoned(&self) -> bool { self.feed.is_abandoned() }
}

/// The write side of a [`FailableDeferred`].
pub struct FailablePromise<T, Er> {
  feed: Feed<Infallible, Result<T, Er>>,
}

impl<T: Payload, Er: Payload> FailablePromise<T, Er> {
  pub fn make() -> (FailableDeferred<T, Er>, Self) {
    let (deferred, feed) = Monitor::make();
    (deferred, FailablePromise { feed })
  }

  pub fn resolve(&self, value: T) { self.feed.push_terminal(Ok(value)) }

  pub fn reject(&self, error: Er) { self.feed.push_terminal(Err(error)) }

  pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) { self.feed.on_cancel(callback) }

  pub fn is_abandoned(&self) -> bool { self.feed.is_abandoned() }
}

impl<T: Payload> Monitor<Infallible, T> {
  pub fn resolved(&self, handler: impl FnOnce(T) + Send + 'static) -> Subscription {
    self.observe_terminal(handler)
  }

  pub fn then<U: Payload>(&self, transform: impl FnOnce(T) -> U + Send + 'static) -> Deferred<U> {
    self.map_terminal(transform)
  }

  /// Chains a deferred built from the resolved value.
  pub fn then_extend<U: Payload>(&self, transform: impl Fn(T) -> Deferred<U> + Send + Sync + 'static) -> Deferred<U> {
    self.extend(transform)
  }
}

impl<T: Payload, Er: Payload> Monitor<Infallible, Result<T, Er>> {
  /// Runs `handler` with the value if the deferred succeeds.
  pub fn succeeded(&self, handler: impl FnOnce(T) + Send + 'static) -> Subscription {
    self.observe_terminal(move |terminal| {
      if let Ok(value) = terminal {
        handler(value);
      }
    })
  }

  /// Runs `handler` with the error if the deferred fails.
  pub fn rejected(&self, handler: impl FnOnce(Er) + Send + 'static) -> Subscription {
    self.observe_terminal(move |terminal| {
      if let Err(error) = terminal {
        handler(error);
      }
    })
  }

  pub fn fulfilled(
    &self,
    on_resolved: impl FnOnce(T) + Send + 'static,
    on_rejected: impl FnOnce(Er) + Send + 'static,
  ) -> Subscription {
    self.observe_terminal(move |terminal| match terminal {
      Ok(value) => on_resolved(value),
      Err(error) => on_rejected(error),
    })
  }

  /// Maps the value of a success. Errors pass through.
  pub fn then_ok<U: Payload>(
    &self,
    transform: impl FnOnce(T) -> Result<U, Er> + Send + 'static,
  ) -> FailableDeferred<U, Er> {
    self.map_terminal(move |terminal| terminal.and_then(transform))
  }

  /// Chains a failable deferred built from the value of a success.
  pub fn then_ok_extend<U: Payload>(
    &self,
    transform: impl Fn(T) -> FailableDeferred<U, Er> + Send + Sync + 'static,
  ) -> FailableDeferred<U, Er> {
    self.extend(move |terminal| match terminal {
      Ok(value) => transform(value),
      Err(error) => Monitor::terminated(Err(error)),
    })
  }

  /// Replaces an error with a value.
  pub fn handle(&self, transform: impl FnOnce(Er) -> T + Send + 'static) -> Deferred<T> {
    self.map_terminal(move |terminal| terminal.unwrap_or_else(transform))
  }

  /// Replaces an error with the deferred `transform` builds.
  pub fn handle_extend(&self, transform: impl Fn(Er) -> Deferred<T> + Send + Sync + 'static) -> Deferred<T> {
    self.extend(move |terminal| match terminal {
      Ok(value) => Monitor::terminated(value),
      Err(error) => transform(error),
    })
  }

  /// Gives an error a second chance that may itself fail.
  pub fn recover(
    &self,
    transform: impl FnOnce(Er) -> Result<T, Er> + Send + 'static,
  ) -> FailableDeferred<T, Er> {
    self.map_terminal(move |terminal| terminal.or_else(transform))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;

  #[monitor_macro::test]
  fn promise_resolves_once() {
    let (deferred, promise) = Promise::make();
    let doubled = deferred.then(|value: i32| value * 2);
    promise.resolve(21);
    promise.resolve(0);
    assert_eq!(deferred.terminal(), Some(21));
    assert_eq!(doubled.terminal(), Some(42));
  }

  #[monitor_macro::test]
  fn then_extend_waits_for_the_chained_deferred() {
    let (first, first_promise) = Promise::<i32>::make();
    let second: Arc<Mutex<Option<Promise<String>>>> = Arc::default();
    let stash = second.clone();
    let chained = first.then_extend(move |value| {
      let (deferred, promise) = Promise::make();
      *stash.lock().unwrap() = Some(promise);
      deferred.then(move |suffix: String| format!("{value}{suffix}"))
    });

    first_promise.resolve(4);
    assert!(!chained.is_terminated());
    second.lock().unwrap().take().unwrap().resolve("2".into());
    assert_eq!(chained.terminal(), Some("42".to_string()));
  }

  #[monitor_macro::test]
  fn cancellation_reaches_the_promise() {
    let (deferred, promise) = Promise::<i32>::make();
    let cancelled = Arc::new(Mutex::new(false));
    let flag = cancelled.clone();
    promise.on_cancel(move || *flag.lock().unwrap() = true);
    drop(deferred);
    assert!(*cancelled.lock().unwrap());
    assert!(promise.is_abandoned());
  }

  #[monitor_macro::test]
  fn failable_handlers() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (deferred, promise) = FailablePromise::<i32, String>::make();
    let (ok, err, both) = (seen.clone(), seen.clone(), seen.clone());
    let _s1 = deferred.succeeded(move |value| ok.lock().unwrap().push(format!("ok:{value}")));
    let _s2 = deferred.rejected(move |error| err.lock().unwrap().push(format!("err:{error}")));
    let _s3 = deferred.fulfilled(
      |_| unreachable!(),
      move |error| both.lock().unwrap().push(format!("fulfilled:{error}")),
    );
    promise.reject("boom".into());
    assert_eq!(*seen.lock().unwrap(), vec!["err:boom", "fulfilled:boom"]);
  }

  #[monitor_macro::test]
  fn then_ok_short_circuits_errors() {
    let (deferred, promise) = FailablePromise::<i32, String>::make();
    let parsed = deferred
      .then_ok(|value| if value > 0 { Ok(value * 10) } else { Err("not positive".into()) })
      .then_ok(|value| Ok::<_, String>(value + 1));
    promise.resolve(-3);
    assert_eq!(parsed.terminal(), Some(Err("not positive".to_string())));
  }

  #[monitor_macro::test]
  fn then_ok_extend_chains_only_successes() {
    let ok = FailableDeferred::<i32, String>::terminated(Ok(2))
      .then_ok_extend(|value| Monitor::terminated(Ok(value + 1)));
    assert_eq!(ok.terminal(), Some(Ok(3)));

    let failed = FailableDeferred::<i32, String>::terminated(Err("early".into()))
      .then_ok_extend(|_| -> FailableDeferred<i32, String> { unreachable!() });
    assert_eq!(failed.terminal(), Some(Err("early".to_string())));
  }

  #[monitor_macro::test]
  fn handle_and_recover() {
    let failed = || FailableDeferred::<i32, String>::terminated(Err("nope".into()));
    assert_eq!(failed().handle(|error| error.len() as i32).terminal(), Some(4));
    assert_eq!(
      failed().handle_extend(|_| Monitor::terminated(7)).terminal(),
      Some(7)
    );
    assert_eq!(
      failed().recover(|error| Err(format!("still {error}"))).terminal(),
      Some(Err("still nope".to_string()))
    );
    assert_eq!(
      FailableDeferred::<i32, String>::terminated(Ok(1)).handle(|_| 0).terminal(),
      Some(1)
    );
  }
}
