//! Trains: locomotives with runtime position, scheduling and speed state.

use super::{BlockId, Direction, RouteId, TrainId, TransitionId, TurnoutId};

/// Orientation of the locomotive body, independent of block geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BodyDirection {
    /// Locomotive running forward.
    #[default]
    Forward,
    /// Locomotive running in reverse (possibly pushing its wagons).
    Backward,
}

/// Decoder protocol family of a locomotive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DecoderFamily {
    /// Motorola (MM/MM2).
    Mm,
    /// mfx auto-registering decoders.
    Mfx,
    /// DCC decoders.
    Dcc,
}

/// Who is driving the train.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Scheduling {
    /// Operator drives; the runtime only tracks position.
    #[default]
    Manual,
    /// The runtime drives the train along its route.
    AutomaticRunning,
    /// The runtime drives, stopping for good at the next station.
    AutomaticFinishing,
    /// Automatic operation ended.
    Stopped,
}

impl Scheduling {
    /// True for both automatic modes.
    pub fn is_automatic(self) -> bool {
        matches!(
            self,
            Scheduling::AutomaticRunning | Scheduling::AutomaticFinishing
        )
    }
}

/// Motion state of a train.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum TrainState {
    /// Standing still.
    #[default]
    Stopped,
    /// Running at the requested speed.
    Running,
    /// Slowing towards the stop feedback.
    Braking,
    /// Stop commanded, waiting for speed to reach zero.
    Stopping,
}

/// Why (and how) a pending stop will be executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum StopTrigger {
    /// No stop pending.
    #[default]
    None,
    /// Stop and leave automatic mode.
    StopCompletely,
    /// Stop, wait, then restart automatically.
    StopAndRestart {
        /// Station waiting time in milliseconds.
        delay_ms: u64,
    },
    /// Stop until the blocked track ahead frees up.
    StopTemporarily,
}

/// One element of a train's trailing chain: track still reserved behind the
/// train because its length spans it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TrailingStep {
    /// A block the train tail may still occupy.
    Block {
        /// The block.
        id: BlockId,
        /// Direction the train traversed it in.
        direction: Direction,
    },
    /// A turnout between trailing blocks.
    Turnout(TurnoutId),
    /// A transition between trailing elements.
    Transition(TransitionId),
}

/// A locomotive and its runtime state.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Train {
    /// Stable identifier.
    pub id: TrainId,
    /// Human-readable name.
    pub name: String,
    /// Locomotive decoder address.
    pub address: u32,
    /// Decoder protocol family.
    pub decoder: DecoderFamily,
    /// Orientation of the locomotive body.
    #[cfg_attr(feature = "serde", serde(default))]
    pub body_direction: BodyDirection,
    /// Physical train length in centimeters, when known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub length_cm: Option<f64>,
    /// Block the train currently occupies. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub block: Option<BlockId>,
    /// Feedbacks passed within the current block, along its natural axis;
    /// always in `0..=feedbacks.len()`. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub position: usize,
    /// Active route. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub route: Option<RouteId>,
    /// Index of the route step for the current block. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub route_step_index: usize,
    /// Route step index the train started from; station stops are skipped
    /// while the train is still in its start block. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub start_route_index: usize,
    /// Scheduling mode. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub scheduling: Scheduling,
    /// Motion state. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub state: TrainState,
    /// Pending stop, if any. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub stop_trigger: StopTrigger,
    /// How many blocks may be reserved ahead of the train.
    pub max_leading_blocks: usize,
    /// How many trailing blocks the train's length requires.
    #[cfg_attr(feature = "serde", serde(default))]
    pub trailing_required: usize,
    /// Reserved chain behind the train, oldest first. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub trailing: Vec<TrailingStep>,
    /// Current speed in km/h as acknowledged by the bus. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub speed_kph: u16,
    /// Last commanded speed in km/h. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub requested_kph: u16,
    /// Maximum speed of the locomotive in km/h.
    pub max_kph: u16,
}

impl Train {
    /// Creates a manually scheduled, unplaced train.
    pub fn new(
        id: impl Into<TrainId>,
        name: impl Into<String>,
        address: u32,
        decoder: DecoderFamily,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address,
            decoder,
            body_direction: BodyDirection::Forward,
            length_cm: None,
            block: None,
            position: 0,
            route: None,
            route_step_index: 0,
            start_route_index: 0,
            scheduling: Scheduling::Manual,
            state: TrainState::Stopped,
            stop_trigger: StopTrigger::None,
            max_leading_blocks: 2,
            trailing_required: 0,
            trailing: Vec::new(),
            speed_kph: 0,
            requested_kph: 0,
            max_kph: 120,
        }
    }

    /// Sets the locomotive body orientation.
    pub fn with_body_direction(mut self, direction: BodyDirection) -> Self {
        self.body_direction = direction;
        self
    }

    /// Sets the train length.
    pub fn with_length_cm(mut self, length: f64) -> Self {
        self.length_cm = Some(length);
        self
    }

    /// Sets the leading reservation window.
    pub fn with_max_leading_blocks(mut self, blocks: usize) -> Self {
        self.max_leading_blocks = blocks;
        self
    }

    /// Sets the trailing block requirement.
    pub fn with_trailing_required(mut self, blocks: usize) -> Self {
        self.trailing_required = blocks;
        self
    }

    /// Sets the maximum speed.
    pub fn with_max_kph(mut self, kph: u16) -> Self {
        self.max_kph = kph;
        self
    }

    /// True when a stop is already pending.
    pub fn has_pending_stop(&self) -> bool {
        self.stop_trigger != StopTrigger::None
    }

    /// Number of block entries in the trailing chain.
    pub fn trailing_block_count(&self) -> usize {
        self.trailing
            .iter()
            .filter(|step| matches!(step, TrailingStep::Block { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_train_defaults() {
        let train = Train::new("t1", "Regional", 12, DecoderFamily::Mfx);
        assert_eq!(train.scheduling, Scheduling::Manual);
        assert_eq!(train.state, TrainState::Stopped);
        assert_eq!(train.stop_trigger, StopTrigger::None);
        assert_eq!(train.speed_kph, 0);
        assert!(train.block.is_none());
    }

    #[test]
    fn scheduling_automatic_check() {
        assert!(Scheduling::AutomaticRunning.is_automatic());
        assert!(Scheduling::AutomaticFinishing.is_automatic());
        assert!(!Scheduling::Manual.is_automatic());
        assert!(!Scheduling::Stopped.is_automatic());
    }

    #[test]
    fn trailing_block_count_ignores_turnouts_and_transitions() {
        let mut train = Train::new("t1", "Regional", 12, DecoderFamily::Dcc);
        train.trailing = vec![
            TrailingStep::Block {
                id: BlockId::new("b1"),
                direction: Direction::Next,
            },
            TrailingStep::Transition(TransitionId::new("tr1")),
            TrailingStep::Turnout(TurnoutId::new("t1")),
            TrailingStep::Block {
                id: BlockId::new("b2"),
                direction: Direction::Previous,
            },
        ];
        assert_eq!(train.trailing_block_count(), 2);
    }

    #[test]
    fn pending_stop_detection() {
        let mut train = Train::new("t1", "Regional", 12, DecoderFamily::Mm);
        assert!(!train.has_pending_stop());
        train.stop_trigger = StopTrigger::StopTemporarily;
        assert!(train.has_pending_stop());
    }
}
