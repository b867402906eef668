//! # monitor: streams with one terminal
//!
//! A [`Monitor`] carries any number of *ephemeral* values followed by exactly
//! one *terminal* value. The producer writes through a [`Feed`], consumers
//! [`observe`](Monitor::observe) and receive a [`Subscription`] they can
//! cancel at any time.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use monitor::prelude::*;
//!
//! let (source, feed) = Monitor::<i32, &'static str>::make();
//! let doubled = source.filter(|v| v % 2 == 1).map_ephemeral(|v| v * 2);
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_c = seen.clone();
//! let _subscription = doubled.observe(move |v| seen_c.lock().unwrap().push(v), |_| {});
//!
//! for v in 1..=4 {
//!   feed.push_ephemeral(v);
//! }
//! feed.push_terminal("done");
//! assert_eq!(*seen.lock().unwrap(), vec![2, 6]);
//! assert_eq!(doubled.terminal(), Some("done"));
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Monitor`] / [`Feed`] | The stream and its write capability |
//! | [`Subscription`] | Type-erased cancel handle |
//! | [`Dispatching`] | Execution context, used for contract assertions and transfers |
//! | [`ThreadSafety`] | Strategy guarding operator state |
//! | [`ContextAccessor`] | Snapshot-published state behind a strategy |
//!
//! ## Feature Flags
//!
//! - **`futures-adapters`** (default): [`Monitor::into_future`] and
//!   [`Monitor::into_stream`] on top of the `futures` crate.
//!
//! [`Monitor`]: monitor::Monitor
//! [`Feed`]: monitor::Feed
//! [`Subscription`]: subscription::Subscription
//! [`Dispatching`]: dispatching::Dispatching
//! [`ThreadSafety`]: thread_safety::ThreadSafety
//! [`ContextAccessor`]: context::ContextAccessor
//! [`Monitor::into_future`]: monitor::Monitor::into_future
//! [`Monitor::into_stream`]: monitor::Monitor::into_stream

pub mod context;
pub mod dispatching;
pub mod error;
pub mod monitor;
pub mod ops;
pub mod prelude;
pub mod rx;
pub mod signal;
pub mod subscription;
pub mod thread_safety;
pub mod transform;
mod util;

pub use prelude::*;

#[cfg(doctest)]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}
