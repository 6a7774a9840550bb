//! Control-bus abstraction.

use crate::commands::{BusCommand, BusEvent};

/// A connection to a digital command station.
///
/// Implementations translate [`BusCommand`]s into whatever wire protocol
/// the station speaks and surface incoming traffic as [`BusEvent`]s.
/// Sending is fire-and-forget from the runtime's point of view: errors are
/// reported to the caller for logging but the layout model is not rolled
/// back.
///
/// Events are polled with [`try_recv`](Self::try_recv); a transport that
/// reads on its own task queues events internally and hands them out here.
/// Commands must go out in the order they were executed.
///
/// # Example implementation
///
/// ```rust
/// use railyard::commands::{BusCommand, BusEvent};
/// use railyard::traits::CommandInterface;
///
/// struct NullBus;
///
/// impl CommandInterface for NullBus {
///     type Error = ();
///
///     fn connect(&mut self) -> Result<(), ()> { Ok(()) }
///     fn disconnect(&mut self) -> Result<(), ()> { Ok(()) }
///     fn is_connected(&self) -> bool { true }
///
///     fn execute(&mut self, _command: &BusCommand) -> Result<(), ()> {
///         Ok(())
///     }
///
///     fn try_recv(&mut self) -> Option<BusEvent> {
///         None
///     }
/// }
/// ```
pub trait CommandInterface {
    /// Transport error type.
    type Error: core::fmt::Debug;

    /// Opens the connection to the station.
    fn connect(&mut self) -> Result<(), Self::Error>;

    /// Closes the connection.
    fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Whether the connection is up.
    fn is_connected(&self) -> bool;

    /// Sends a command to the station.
    fn execute(&mut self, command: &BusCommand) -> Result<(), Self::Error>;

    /// Returns the next pending event from the station, if any.
    fn try_recv(&mut self) -> Option<BusEvent>;
}
