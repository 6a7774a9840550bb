//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for the control bus and the clock,
//! enabling development and testing on the desktop without a central
//! station on the network.
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockBus`] | [`CommandInterface`] | Records commands, queues events |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`SystemClock`] | [`Clock`] | Wall-clock time for services |
//!
//! # Example
//!
//! ```rust
//! use railyard::commands::{BusCommand, BusEvent};
//! use railyard::hal::MockBus;
//! use railyard::layout::FeedbackAddress;
//! use railyard::traits::CommandInterface;
//!
//! let mut bus = MockBus::new();
//! bus.execute(&BusCommand::PowerOn).unwrap();
//! assert_eq!(bus.executed, vec![BusCommand::PowerOn]);
//!
//! // Simulate a sensor report from the station.
//! bus.queue_feedback(FeedbackAddress::new(1, 3), true);
//! assert!(matches!(bus.try_recv(), Some(BusEvent::Feedback { .. })));
//! assert!(bus.try_recv().is_none());
//! ```

use std::collections::VecDeque;
use std::time::Instant;

use crate::commands::{BusCommand, BusEvent};
use crate::layout::FeedbackAddress;
use crate::traits::{Clock, CommandInterface};

// ============================================================================
// Mock bus
// ============================================================================

/// Mock control bus for testing.
///
/// Records every executed command for verification and hands out queued
/// events in FIFO order. Can simulate a dead connection.
#[derive(Debug, Default)]
pub struct MockBus {
    /// Commands in execution order.
    pub executed: Vec<BusCommand>,
    /// Events waiting to be polled.
    pub pending: VecDeque<BusEvent>,
    /// Whether the bus accepts commands.
    pub connected: bool,
    /// When set, every `execute` fails (for bus-error paths).
    pub fail_sends: bool,
}

impl MockBus {
    /// Creates a connected mock bus.
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    /// Queues a feedback change event.
    pub fn queue_feedback(&mut self, address: FeedbackAddress, detected: bool) {
        self.pending.push_back(BusEvent::Feedback { address, detected });
    }

    /// Queues an arbitrary event.
    pub fn queue_event(&mut self, event: BusEvent) {
        self.pending.push_back(event);
    }

    /// Speed commands seen so far, as `(address, step)` pairs.
    pub fn speed_commands(&self) -> Vec<(u32, u16)> {
        self.executed
            .iter()
            .filter_map(|c| match c {
                BusCommand::SetSpeed { address, step, .. } => Some((*address, *step)),
                _ => None,
            })
            .collect()
    }

    /// Turnout commands seen so far, as `(address, position)` pairs.
    pub fn turnout_commands(&self) -> Vec<(u32, u8)> {
        self.executed
            .iter()
            .filter_map(|c| match c {
                BusCommand::SetTurnout {
                    address, position, ..
                } => Some((*address, *position)),
                _ => None,
            })
            .collect()
    }
}

/// Error type of the mock bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockBusError;

impl CommandInterface for MockBus {
    type Error = MockBusError;

    fn connect(&mut self) -> Result<(), MockBusError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), MockBusError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn execute(&mut self, command: &BusCommand) -> Result<(), MockBusError> {
        if !self.connected || self.fail_sends {
            return Err(MockBusError);
        }
        self.executed.push(command.clone());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<BusEvent> {
        self.pending.pop_front()
    }
}

// ============================================================================
// Clocks
// ============================================================================

/// Mock clock for testing.
///
/// Provides a controllable time source for testing time-dependent behavior.
///
/// # Example
///
/// ```rust
/// use railyard::hal::MockClock;
/// use railyard::traits::Clock;
///
/// let mut clock = MockClock::new();
/// clock.set(1000);
/// assert_eq!(clock.now_ms(), 1000);
///
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    /// Creates a mock clock starting at 0 ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time in milliseconds.
    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    /// Advances the clock by the given duration.
    pub fn advance(&mut self, ms: u64) {
        self.current_ms += ms;
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

/// Wall-clock time source, anchored at its creation instant.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Creates a clock anchored at now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
