//! Command and event types for the control bus.
//!
//! The runtime talks to the command station through two enums:
//! [`BusCommand`] for everything it sends (track power, turnout positions,
//! locomotive speed/direction/functions, queries) and [`BusEvent`] for
//! everything the station reports back (feedback changes, speed and
//! direction acknowledgements, discovered locomotives).
//!
//! Commands are fire-and-forget: the model's state is updated when the
//! command is issued and is not rolled back on a bus error (errors are
//! logged and surface through diagnostics as persistent divergence).
//!
//! # Speed steps
//!
//! The runtime thinks in km/h, the bus in steps `0..=1000`. The mapping
//! here is linear against the locomotive's maximum speed; per-locomotive
//! calibration curves are the command station's concern.
//!
//! ```rust
//! use railyard::commands::{speed_to_step, step_to_speed};
//!
//! assert_eq!(speed_to_step(60, 120), 500);
//! assert_eq!(step_to_speed(500, 120), 60);
//! assert_eq!(speed_to_step(200, 120), 1000); // clamped to max
//! ```

use crate::layout::{
    BodyDirection, DecoderFamily, FeedbackAddress, Turnout, TurnoutCategory, TurnoutState,
};

/// Highest speed step on the bus.
pub const MAX_SPEED_STEP: u16 = 1000;

/// Straight / green coil of an accessory decoder.
pub const TURNOUT_POSITION_STRAIGHT: u8 = 1;
/// Branch / red coil of an accessory decoder.
pub const TURNOUT_POSITION_BRANCH: u8 = 0;

// ============================================================================
// Commands
// ============================================================================

/// A command sent to the control bus.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum BusCommand {
    /// Track power on ("go").
    PowerOn,
    /// Track power off ("stop").
    PowerOff,
    /// Set an accessory decoder position.
    SetTurnout {
        /// Accessory decoder address.
        address: u32,
        /// Coil to activate (see the position constants).
        position: u8,
        /// Whether to power the coil.
        power: bool,
    },
    /// Set a locomotive speed step.
    SetSpeed {
        /// Locomotive decoder address.
        address: u32,
        /// Decoder protocol family.
        decoder: DecoderFamily,
        /// Speed step `0..=1000`.
        step: u16,
    },
    /// Set a locomotive body direction.
    SetDirection {
        /// Locomotive decoder address.
        address: u32,
        /// Decoder protocol family.
        decoder: DecoderFamily,
        /// Direction to set.
        direction: BodyDirection,
    },
    /// Set a locomotive function (f0..fN).
    SetFunction {
        /// Locomotive decoder address.
        address: u32,
        /// Decoder protocol family.
        decoder: DecoderFamily,
        /// Function index.
        index: u8,
        /// On or off.
        value: bool,
    },
    /// Ask the station to enumerate its known locomotives.
    QueryLocomotives,
    /// Ask for a locomotive's current direction.
    QueryDirection {
        /// Locomotive decoder address.
        address: u32,
        /// Decoder protocol family.
        decoder: DecoderFamily,
    },
}

// ============================================================================
// Events
// ============================================================================

/// An event reported by the control bus.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum BusEvent {
    /// A feedback contact changed state.
    Feedback {
        /// Hardware address of the contact.
        address: FeedbackAddress,
        /// New detection state.
        detected: bool,
    },
    /// The station acknowledged a speed step.
    SpeedAck {
        /// Locomotive decoder address.
        address: u32,
        /// Acknowledged speed step.
        step: u16,
    },
    /// A locomotive's direction changed (station-side or handheld).
    DirectionChanged {
        /// Locomotive decoder address.
        address: u32,
        /// New direction.
        direction: BodyDirection,
    },
    /// Track power state changed.
    Power(bool),
    /// A locomotive reported during discovery.
    LocomotiveDiscovered {
        /// Name reported by the station.
        name: String,
        /// Decoder address.
        address: u32,
        /// Decoder protocol family.
        decoder: DecoderFamily,
    },
}

// ============================================================================
// Speed mapping
// ============================================================================

/// Maps km/h to a bus speed step, linearly against the locomotive maximum.
pub fn speed_to_step(kph: u16, max_kph: u16) -> u16 {
    if max_kph == 0 {
        return 0;
    }
    let kph = kph.min(max_kph) as u32;
    (kph * MAX_SPEED_STEP as u32 / max_kph as u32) as u16
}

/// Maps a bus speed step back to km/h.
pub fn step_to_speed(step: u16, max_kph: u16) -> u16 {
    let step = step.min(MAX_SPEED_STEP) as u32;
    (step * max_kph as u32 / MAX_SPEED_STEP as u32) as u16
}

// ============================================================================
// Turnout position mapping
// ============================================================================

/// Commands that drive a turnout's decoder(s) into `state`.
///
/// Single turnouts and single-address double slips use one decoder; a
/// three-way uses its second address for the right branch, and a
/// two-address double slip addresses each crossing separately. An
/// [`Invalid`](TurnoutState::Invalid) state produces no commands.
pub fn turnout_commands(turnout: &Turnout, state: TurnoutState) -> Vec<BusCommand> {
    let set = |address: u32, position: u8| BusCommand::SetTurnout {
        address,
        position,
        power: true,
    };
    let second = turnout.address2.unwrap_or(turnout.address + 1);

    match (turnout.category, state) {
        (TurnoutCategory::SingleLeft | TurnoutCategory::SingleRight, TurnoutState::Straight) => {
            vec![set(turnout.address, TURNOUT_POSITION_STRAIGHT)]
        }
        (TurnoutCategory::SingleLeft, TurnoutState::BranchLeft)
        | (TurnoutCategory::SingleRight, TurnoutState::BranchRight) => {
            vec![set(turnout.address, TURNOUT_POSITION_BRANCH)]
        }
        (TurnoutCategory::ThreeWay, TurnoutState::Straight) => vec![
            set(turnout.address, TURNOUT_POSITION_STRAIGHT),
            set(second, TURNOUT_POSITION_STRAIGHT),
        ],
        (TurnoutCategory::ThreeWay, TurnoutState::BranchLeft) => vec![
            set(turnout.address, TURNOUT_POSITION_BRANCH),
            set(second, TURNOUT_POSITION_STRAIGHT),
        ],
        (TurnoutCategory::ThreeWay, TurnoutState::BranchRight) => vec![
            set(turnout.address, TURNOUT_POSITION_STRAIGHT),
            set(second, TURNOUT_POSITION_BRANCH),
        ],
        (TurnoutCategory::DoubleSlip, TurnoutState::Straight) => {
            vec![set(turnout.address, TURNOUT_POSITION_STRAIGHT)]
        }
        (TurnoutCategory::DoubleSlip, TurnoutState::Branch) => {
            vec![set(turnout.address, TURNOUT_POSITION_BRANCH)]
        }
        (TurnoutCategory::DoubleSlip2, TurnoutState::Straight01) => {
            vec![set(turnout.address, TURNOUT_POSITION_STRAIGHT)]
        }
        (TurnoutCategory::DoubleSlip2, TurnoutState::Straight23) => {
            vec![set(second, TURNOUT_POSITION_STRAIGHT)]
        }
        (TurnoutCategory::DoubleSlip2, TurnoutState::Branch03) => {
            vec![set(turnout.address, TURNOUT_POSITION_BRANCH)]
        }
        (TurnoutCategory::DoubleSlip2, TurnoutState::Branch21) => {
            vec![set(second, TURNOUT_POSITION_BRANCH)]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Turnout;

    #[test]
    fn speed_mapping_is_linear_and_clamped() {
        assert_eq!(speed_to_step(0, 120), 0);
        assert_eq!(speed_to_step(120, 120), 1000);
        assert_eq!(speed_to_step(30, 120), 250);
        assert_eq!(speed_to_step(500, 120), 1000);
        assert_eq!(speed_to_step(50, 0), 0);
    }

    #[test]
    fn step_mapping_round_trips_quarters() {
        for kph in [0u16, 30, 60, 90, 120] {
            assert_eq!(step_to_speed(speed_to_step(kph, 120), 120), kph);
        }
    }

    #[test]
    fn single_turnout_commands() {
        let t = Turnout::new("t1", "t1", TurnoutCategory::SingleLeft, 10);
        assert_eq!(
            turnout_commands(&t, TurnoutState::Straight),
            vec![BusCommand::SetTurnout {
                address: 10,
                position: TURNOUT_POSITION_STRAIGHT,
                power: true,
            }]
        );
        assert_eq!(
            turnout_commands(&t, TurnoutState::BranchLeft),
            vec![BusCommand::SetTurnout {
                address: 10,
                position: TURNOUT_POSITION_BRANCH,
                power: true,
            }]
        );
    }

    #[test]
    fn three_way_uses_both_addresses() {
        let t = Turnout::new("t1", "t1", TurnoutCategory::ThreeWay, 10).with_address2(11);
        let cmds = turnout_commands(&t, TurnoutState::BranchRight);
        assert_eq!(cmds.len(), 2);
        assert!(matches!(
            cmds[1],
            BusCommand::SetTurnout {
                address: 11,
                position: TURNOUT_POSITION_BRANCH,
                ..
            }
        ));
    }

    #[test]
    fn double_slip2_addresses_each_crossing() {
        let t = Turnout::new("d1", "d1", TurnoutCategory::DoubleSlip2, 20).with_address2(21);
        assert_eq!(
            turnout_commands(&t, TurnoutState::Straight23),
            vec![BusCommand::SetTurnout {
                address: 21,
                position: TURNOUT_POSITION_STRAIGHT,
                power: true,
            }]
        );
    }

    #[test]
    fn invalid_state_produces_no_commands() {
        let t = Turnout::new("t1", "t1", TurnoutCategory::SingleLeft, 10);
        assert!(turnout_commands(&t, TurnoutState::Invalid).is_empty());
    }
}
