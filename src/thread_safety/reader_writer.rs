use std::sync::{Condvar, Mutex};

use super::ThreadSafety;
use crate::util::lock;

/// Reader-preferring reader/writer lock.
///
/// The first reader in takes the write permit and the last reader out gives
/// it back, so a steady stream of readers can starve writers. The permit is a
/// binary semaphore rather than a mutex guard because it is released by
/// whichever reader leaves last, not necessarily the one that took it.
#[derive(Default)]
pub struct ReadPreferredRwLock {
  readers: Mutex<usize>,
  write_allowed: Semaphore,
}

impl ReadPreferredRwLock {
  pub fn new() -> Self { Self::default() }
}

impl ThreadSafety for ReadPreferredRwLock {
  fn interlocked_read(&self, f: &mut dyn FnMut()) {
    let _reader = ReadGuard::enter(self);
    f()
  }

  fn interlocked_write(&self, f: Box<dyn FnOnce() + Send>) {
    let _writer = WriteGuard::enter(&self.write_allowed);
    f()
  }

  fn interlocked_read_write(&self, f: &mut dyn FnMut()) {
    let _writer = WriteGuard::enter(&self.write_allowed);
    f()
  }
}

struct ReadGuard<'a>(&'a ReadPreferredRwLock);

impl<'a> ReadGuard<'a> {
  fn enter(rw: &'a ReadPreferredRwLock) -> Self {
    let mut readers = lock(&rw.readers);
    *readers += 1;
    if *readers == 1 {
      rw.write_allowed.acquire();
    }
    ReadGuard(rw)
  }
}

impl Drop for ReadGuard<'_> {
  fn drop(&mut self) {
    let mut readers = lock(&self.0.readers);
    *readers -= 1;
    if *readers == 0 {
      self.0.write_allowed.release();
    }
  }
}

struct WriteGuard<'a>(&'a Semaphore);

impl<'a> WriteGuard<'a> {
  fn enter(semaphore: &'a Semaphore) -> Self {
    semaphore.acquire();
    WriteGuard(semaphore)
  }
}

impl Drop for WriteGuard<'_> {
  fn drop(&mut self) { self.0.release() }
}

/// Binary semaphore, initially available.
struct Semaphore {
  taken: Mutex<bool>,
  released: Condvar,
}

impl Default for Semaphore {
  fn default() -> Self { Semaphore { taken: Mutex::new(false), released: Condvar::new() } }
}

impl Semaphore {
  fn acquire(&self) {
    let mut taken = lock(&self.taken);
    while *taken {
      taken = self
        .released
        .wait(taken)
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    }
    *taken = true;
  }

  fn release(&self) {
    *lock(&self.taken) = false;
    self.released.notify_one();
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::{
      atomic::{AtomicUsize, Ordering},
      Arc,
    },
    thread,
  };

  use super::*;
  use crate::thread_safety::ThreadSafetyExt;

  #[monitor_macro::test]
  fn readers_nest_without_blocking() {
    let strategy = ReadPreferredRwLock::new();
    let value = strategy.read(|| strategy.read(|| 7));
    assert_eq!(value, 7);
    assert_eq!(strategy.read_write(|| 8), 8);
  }

  #[monitor_macro::test]
  fn writers_exclude_each_other() {
    let strategy = Arc::new(ReadPreferredRwLock::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let strategy = strategy.clone();
        let inside = inside.clone();
        let max_inside = max_inside.clone();
        thread::spawn(move || {
          for _ in 0..100 {
            strategy.read_write(|| {
              let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
              max_inside.fetch_max(now, Ordering::SeqCst);
              inside.fetch_sub(1, Ordering::SeqCst);
            });
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
  }

  #[monitor_macro::test]
  fn readers_and_writers_never_overlap() {
    let strategy = Arc::new(ReadPreferredRwLock::new());
    let writers = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6)
      .map(|index| {
        let strategy = strategy.clone();
        let writers = writers.clone();
        let violations = violations.clone();
        thread::spawn(move || {
          for _ in 0..200 {
            if index % 2 == 0 {
              strategy.read_write(|| {
                writers.fetch_add(1, Ordering::SeqCst);
                thread::yield_now();
                writers.fetch_sub(1, Ordering::SeqCst);
              });
            } else {
              strategy.read(|| {
                if writers.load(Ordering::SeqCst) != 0 {
                  violations.fetch_add(1, Ordering::SeqCst);
                }
              });
            }
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
  }
}
