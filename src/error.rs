//! Recoverable errors reported by the library itself.
//!
//! Failures of the computations a monitor carries are not errors of this
//! crate: they travel as terminal values, typically `Result<T, Er>`.
//! Violations of the dispatcher and ownership contracts panic.

use thiserror::Error;

/// Why a future built with `Monitor::into_future` resolved without a
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntoFutureError {
  /// The subscription behind the future vanished before the monitor
  /// terminated.
  #[error("the monitor subscription vanished before a terminal was delivered")]
  Abandoned,
}

/// Every error of a failable `any_ok`, in the order the inputs failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("all {} alternatives failed", errors.len())]
pub struct AggregatedError<Er> {
  pub errors: Vec<Er>,
}
