//! Controlled mutation of operator state.
//!
//! A [`ContextAccessor`] owns a value and hands out read and read-write
//! access through a [`ThreadSafety`] strategy. The value is published as an
//! immutable snapshot: a writer works on a private draft and publishes it
//! when its block returns, so a reader that runs while a write is in
//! progress sees the value from before the write, never a half-mutated one.
//!
//! Blocks passed to [`ContextAccessor::read_write`] should only compute.
//! Pushing values, observing monitors or cancelling subscriptions from
//! inside a write can re-enter the same accessor; return what needs to be
//! done and do it after the write instead.

use std::{
  fmt::{Debug, Formatter},
  sync::{Arc, Mutex, Weak},
};

use crate::{
  thread_safety::{CalleeSyncGuaranteed, ThreadSafety, ThreadSafetyExt},
  util::lock,
};

pub(crate) struct SynchronizedContext<C> {
  current: Mutex<Arc<C>>,
}

impl<C> SynchronizedContext<C> {
  fn new(content: C) -> Self { SynchronizedContext { current: Mutex::new(Arc::new(content)) } }

  fn snapshot(&self) -> Arc<C> { lock(&self.current).clone() }

  fn read<R>(&self, strategy: &dyn ThreadSafety, f: impl FnOnce(&C) -> R) -> R {
    strategy.read(|| f(&*self.snapshot()))
  }

  fn read_write<R>(&self, strategy: &dyn ThreadSafety, f: impl FnOnce(&mut C) -> R) -> R
  where
    C: Clone,
  {
    strategy.read_write(|| {
      let mut draft = C::clone(&*self.snapshot());
      let result = f(&mut draft);
      *lock(&self.current) = Arc::new(draft);
      result
    })
  }
}

/// Shared access to a value guarded by a thread-safety strategy.
pub struct ContextAccessor<C> {
  context: Arc<SynchronizedContext<C>>,
  strategy: Arc<dyn ThreadSafety>,
}

impl<C> Clone for ContextAccessor<C> {
  fn clone(&self) -> Self {
    ContextAccessor { context: self.context.clone(), strategy: self.strategy.clone() }
  }
}

impl<C> ContextAccessor<C> {
  /// For content whose callers already serialize every access.
  pub fn free(content: C) -> Self { Self::synchronized(content, Arc::new(CalleeSyncGuaranteed)) }

  pub fn synchronized(content: C, strategy: Arc<dyn ThreadSafety>) -> Self {
    ContextAccessor { context: Arc::new(SynchronizedContext::new(content)), strategy }
  }

  pub fn read<R>(&self, f: impl FnOnce(&C) -> R) -> R { self.context.read(&*self.strategy, f) }

  pub fn read_write<R>(&self, f: impl FnOnce(&mut C) -> R) -> R
  where
    C: Clone,
  {
    self.context.read_write(&*self.strategy, f)
  }

  pub fn strategy(&self) -> &Arc<dyn ThreadSafety> { &self.strategy }

  /// A handle that does not keep the content alive.
  pub fn weakify(&self) -> WeakContextAccessor<C> {
    WeakContextAccessor { context: Arc::downgrade(&self.context), strategy: self.strategy.clone() }
  }
}

impl<C: Debug> Debug for ContextAccessor<C> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("ContextAccessor").field(&*self.context.snapshot()).finish()
  }
}

/// Non-owning counterpart of [`ContextAccessor`]. Every access returns
/// `None` once the content is gone.
pub struct WeakContextAccessor<C> {
  context: Weak<SynchronizedContext<C>>,
  strategy: Arc<dyn ThreadSafety>,
}

impl<C> Clone for WeakContextAccessor<C> {
  fn clone(&self) -> Self {
    WeakContextAccessor { context: self.context.clone(), strategy: self.strategy.clone() }
  }
}

impl<C> WeakContextAccessor<C> {
  pub fn read<R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
    let context = self.context.upgrade()?;
    Some(context.read(&*self.strategy, f))
  }

  pub fn read_write<R>(&self, f: impl FnOnce(&mut C) -> R) -> Option<R>
  where
    C: Clone,
  {
    let context = self.context.upgrade()?;
    Some(context.read_write(&*self.strategy, f))
  }

  pub fn strongify(&self) -> Option<ContextAccessor<C>> {
    let context = self.context.upgrade()?;
    Some(ContextAccessor { context, strategy: self.strategy.clone() })
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;
  use crate::thread_safety::ReadPreferredRwLock;

  #[monitor_macro::test]
  fn reader_inside_a_write_sees_the_previous_value() {
    let accessor = ContextAccessor::free(vec![1, 2]);
    let reader = accessor.clone();
    let seen = accessor.read_write(|content| {
      content.push(3);
      reader.read(|content| content.clone())
    });
    assert_eq!(seen, vec![1, 2]);
    assert_eq!(accessor.read(|content| content.clone()), vec![1, 2, 3]);
  }

  #[monitor_macro::test]
  fn weak_accessor_follows_the_owner() {
    let accessor = ContextAccessor::free(5);
    let weak = accessor.weakify();
    assert_eq!(weak.read(|value| *value), Some(5));
    let incremented = weak.read_write(|value| {
      *value += 1;
      *value
    });
    assert_eq!(incremented, Some(6));
    assert!(weak.strongify().is_some());

    drop(accessor);
    assert_eq!(weak.read(|value| *value), None);
    assert!(weak.read_write(|value| *value += 1).is_none());
    assert!(weak.strongify().is_none());
  }

  #[monitor_macro::test]
  fn synchronized_writes_do_not_lose_updates() {
    let accessor = ContextAccessor::synchronized(0usize, Arc::new(ReadPreferredRwLock::new()));
    let handles: Vec<_> = (0..4)
      .map(|_| {
        let accessor = accessor.clone();
        thread::spawn(move || {
          for _ in 0..250 {
            accessor.read_write(|value| *value += 1);
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(accessor.read(|value| *value), 1000);
  }
}
