//! The state bag shared by every step of a build.
//!
//! One bag is created per build, populated incrementally by the steps, and
//! dropped when the build terminates. Builds never share a bag.

mod bag;
pub mod keys;

pub use bag::{StateBag, StateKey};
