use std::sync::Arc;

use super::ThreadSafety;
use crate::dispatching::{DispatchFlags, Dispatching};

/// Serializes access by running it on a dispatcher.
///
/// Reads run synchronously as default work, reads-with-writes synchronously
/// as barrier work, and plain writes are submitted as asynchronous barrier
/// work. None of them may be requested from inside the dispatcher itself.
#[derive(Clone)]
pub struct DispatchedThreadSafety {
  dispatcher: Arc<dyn Dispatching>,
}

impl DispatchedThreadSafety {
  pub fn new(dispatcher: Arc<dyn Dispatching>) -> Self { DispatchedThreadSafety { dispatcher } }
}

impl ThreadSafety for DispatchedThreadSafety {
  fn interlocked_read(&self, f: &mut dyn FnMut()) {
    self.dispatcher.assert_is_not_current();
    self.dispatcher.run_sync_dyn(DispatchFlags::NONE, f)
  }

  fn interlocked_write(&self, f: Box<dyn FnOnce() + Send>) {
    self.dispatcher.assert_is_not_current();
    let _submitted = self.dispatcher.run(DispatchFlags::BARRIER, f);
  }

  fn interlocked_read_write(&self, f: &mut dyn FnMut()) {
    self.dispatcher.assert_is_not_current();
    self.dispatcher.run_sync_dyn(DispatchFlags::BARRIER, f)
  }
}
