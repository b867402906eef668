//! Execution contexts.
//!
//! A monitor never schedules anything by itself. Time and thread hops are
//! expressed as work submitted to a [`Dispatching`] implementation, and the
//! same implementation is used to assert that callers respect its
//! exclusivity contract.
//!
//! | Submission | Guarantee                                              |
//! |------------|--------------------------------------------------------|
//! | barrier    | never runs concurrently with any other submission      |
//! | default    | may overlap other default submissions, up to a limit   |
//!
//! Assertions are pure checks: an implementation may compile them to no-ops
//! and every algorithm in this crate stays correct.

use std::time::Duration;

use crate::subscription::Subscription;

pub mod manual;

/// Unit of work handed to a dispatcher.
pub type Work = Box<dyn FnOnce() + Send>;

/// Exclusivity requested for a submission or expected by an assertion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DispatchFlags {
  pub barrier: bool,
}

impl DispatchFlags {
  pub const NONE: DispatchFlags = DispatchFlags { barrier: false };
  pub const BARRIER: DispatchFlags = DispatchFlags { barrier: true };

  /// Whether `self` satisfies every requirement of `required`.
  #[inline]
  pub fn contains(self, required: DispatchFlags) -> bool { self.barrier || !required.barrier }
}

/// How ephemerals are delivered on the target of a transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferMode {
  /// Concurrent submissions, as many as the target allows.
  #[default]
  Default,
  /// Every delivery is a barrier submission.
  Barrier,
}

impl TransferMode {
  pub fn flags(self) -> DispatchFlags {
    match self {
      TransferMode::Default => DispatchFlags::NONE,
      TransferMode::Barrier => DispatchFlags::BARRIER,
    }
  }
}

/// An execution context.
///
/// The trait is object safe so monitors can remember the context they are
/// bound to as an `Arc<dyn Dispatching>`. Use [`DispatchingExt::run_sync`] for
/// the value-returning form of [`Dispatching::run_sync_dyn`].
pub trait Dispatching: Send + Sync {
  /// Submits `work` for asynchronous execution.
  fn run(&self, flags: DispatchFlags, work: Work) -> Subscription;

  /// Submits `work` for execution once `delay` has elapsed. Cancelling the
  /// returned handle before that drops the work.
  fn run_after(&self, delay: Duration, flags: DispatchFlags, work: Work) -> Subscription;

  /// Runs `work` on this context and waits for it to complete.
  ///
  /// Must not be called from inside this context.
  fn run_sync_dyn(&self, flags: DispatchFlags, work: &mut dyn FnMut());

  /// Panics unless the caller runs inside this context with at least `flags`.
  fn assert_is_current(&self, flags: DispatchFlags);

  /// Panics if the caller runs inside this context.
  fn assert_is_not_current(&self);
}

pub trait DispatchingExt: Dispatching {
  /// Runs `f` synchronously on this context and returns its result.
  fn run_sync<R>(&self, flags: DispatchFlags, f: impl FnOnce() -> R) -> R {
    let mut f = Some(f);
    let mut result = None;
    self.run_sync_dyn(flags, &mut || {
      if let Some(f) = f.take() {
        result = Some(f());
      }
    });
    match result {
      Some(result) => result,
      None => panic!("dispatcher returned from run_sync without running the work"),
    }
  }
}

impl<D: Dispatching + ?Sized> DispatchingExt for D {}
