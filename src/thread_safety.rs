//! Pluggable mutual-exclusion policies.
//!
//! Operator state lives in a [`crate::context::ContextAccessor`], and the
//! accessor delegates every access to one of these strategies:
//!
//! - [`CalleeSyncGuaranteed`]: no synchronization, the caller already
//!   serializes access (for example because every call happens on one
//!   dispatcher).
//! - [`ReadPreferredRwLock`]: readers share, writers exclude everybody.
//! - [`DispatchedThreadSafety`]: accesses are funnelled through a dispatcher.

use std::sync::Arc;

mod dispatched;
mod reader_writer;

pub use dispatched::DispatchedThreadSafety;
pub use reader_writer::ReadPreferredRwLock;

/// The object-safe strategy interface. Prefer the generic helpers of
/// [`ThreadSafetyExt`] when calling it.
pub trait ThreadSafety: Send + Sync {
  /// Runs `f` while no writer is active.
  fn interlocked_read(&self, f: &mut dyn FnMut());

  /// Runs `f` exclusively. The strategy may defer it.
  fn interlocked_write(&self, f: Box<dyn FnOnce() + Send>);

  /// Runs `f` exclusively and waits for it.
  fn interlocked_read_write(&self, f: &mut dyn FnMut());
}

pub trait ThreadSafetyExt: ThreadSafety {
  fn read<R>(&self, f: impl FnOnce() -> R) -> R {
    let mut slot = Once::new(f);
    self.interlocked_read(&mut || slot.call());
    slot.into_result()
  }

  fn read_write<R>(&self, f: impl FnOnce() -> R) -> R {
    let mut slot = Once::new(f);
    self.interlocked_read_write(&mut || slot.call());
    slot.into_result()
  }

  fn write(&self, f: impl FnOnce() + Send + 'static) { self.interlocked_write(Box::new(f)) }
}

impl<S: ThreadSafety + ?Sized> ThreadSafetyExt for S {}

/// Adapts a `FnOnce` to the `FnMut` the object-safe interface takes.
struct Once<F, R> {
  f: Option<F>,
  result: Option<R>,
}

impl<F: FnOnce() -> R, R> Once<F, R> {
  fn new(f: F) -> Self { Once { f: Some(f), result: None } }

  fn call(&mut self) {
    if let Some(f) = self.f.take() {
      self.result = Some(f());
    }
  }

  fn into_result(self) -> R {
    match self.result {
      Some(result) => result,
      None => panic!("thread safety strategy returned without running the block"),
    }
  }
}

/// No-op strategy: the caller guarantees exclusive access.
#[derive(Clone, Copy, Debug, Default)]
pub struct CalleeSyncGuaranteed;

impl ThreadSafety for CalleeSyncGuaranteed {
  #[inline]
  fn interlocked_read(&self, f: &mut dyn FnMut()) { f() }

  #[inline]
  fn interlocked_write(&self, f: Box<dyn FnOnce() + Send>) { f() }

  #[inline]
  fn interlocked_read_write(&self, f: &mut dyn FnMut()) { f() }
}

/// The default strategy for operator state.
pub fn callee_sync_guaranteed() -> Arc<dyn ThreadSafety> { Arc::new(CalleeSyncGuaranteed) }

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  #[monitor_macro::test]
  fn callee_sync_runs_inline() {
    let strategy = CalleeSyncGuaranteed;
    assert_eq!(strategy.read(|| 1), 1);
    assert_eq!(strategy.read_write(|| "rw"), "rw");

    let hit = Arc::new(Mutex::new(false));
    let hit_c = hit.clone();
    strategy.write(move || *hit_c.lock().unwrap() = true);
    assert!(*hit.lock().unwrap());
  }

  #[monitor_macro::test]
  fn helpers_work_through_trait_objects() {
    let strategy: Arc<dyn ThreadSafety> = callee_sync_guaranteed();
    let owned = String::from("moved in");
    assert_eq!(strategy.read(move || owned.len()), 8);
  }
}
