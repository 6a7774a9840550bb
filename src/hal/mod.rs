//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: Test implementations for desktop development
//! - `marklin`: Marklin CS2/CS3 central station over TCP (requires the
//!   `marklin` feature)

pub mod mock;

#[cfg(feature = "marklin")]
pub mod marklin;

pub use mock::*;

#[cfg(feature = "marklin")]
pub use marklin::MarklinBus;
