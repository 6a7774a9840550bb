//! Trait definitions for the control bus and the time source.
//!
//! These abstractions are what let the runtime run against real hardware
//! (a Marklin central station over TCP, see [`crate::hal::marklin`]) and
//! against mocks on the desktop (see [`crate::hal::mock`]):
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`CommandInterface`] | Sends [`BusCommand`]s, surfaces [`BusEvent`]s |
//! | [`Clock`] | Monotonic milliseconds for restart timers |
//!
//! [`BusCommand`]: crate::commands::BusCommand
//! [`BusEvent`]: crate::commands::BusEvent

pub mod bus;
pub mod clock;

pub use bus::CommandInterface;
pub use clock::Clock;
