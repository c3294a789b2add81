//! Cooperative cancellation for builds.
//!
//! A [`CancellationToken`] is passed to every step alongside the state bag.
//! Steps check it at natural boundaries and halt promptly once it fires.

mod token;

pub use token::{CancelCallback, CancellationToken};
