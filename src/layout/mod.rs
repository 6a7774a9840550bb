//! Topology model: blocks, turnouts, feedbacks, transitions, trains, routes.
//!
//! The [`Layout`] is the owning registry for every element. Ownership is
//! strictly one layer deep: elements never hold references to each other,
//! only ids, and every cross-reference is resolved by lookup on the
//! registry. Reservation and occupancy fields are back-references by id
//! from track elements to trains; a train's `block` field is the single
//! forward reference. [`Layout::check_invariants`] verifies both sides
//! agree.
//!
//! # Element lifecycles
//!
//! Blocks, turnouts, feedbacks and transitions are created at document load
//! and live for the process. The only mutable parts are `reserved`,
//! occupancy, turnout state and feedback `detected`. Trains mutate their
//! runtime fields continuously; automatic routes are regenerated in place.

use core::fmt;

mod block;
mod feedback;
mod route;
mod train;
mod transition;
mod turnout;

pub use block::{Block, BlockCategory, BlockReservation, TrainInstance};
pub use feedback::{Feedback, FeedbackAddress};
pub use route::{Destination, Route, RouteMode, RouteStep};
pub use train::{
    BodyDirection, DecoderFamily, Scheduling, StopTrigger, TrailingStep, Train, TrainState,
};
pub use transition::Transition;
pub use turnout::{Turnout, TurnoutCategory, TurnoutState};

use crate::errors::LayoutError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Wraps the given string as an identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Stable identifier of a [`Block`]. Compared as a value.
    BlockId
);
id_type!(
    /// Stable identifier of a [`Turnout`].
    TurnoutId
);
id_type!(
    /// Stable identifier of a [`Feedback`] sensor.
    FeedbackId
);
id_type!(
    /// Stable identifier of a [`Transition`].
    TransitionId
);
id_type!(
    /// Stable identifier of a [`Train`].
    TrainId
);
id_type!(
    /// Stable identifier of a [`Route`].
    RouteId
);

/// Socket index on a block or turnout.
///
/// Blocks use `0` (previous side) and `1` (next side). Turnout sockets are
/// category-dependent, see [`TurnoutCategory`].
pub type SocketId = u8;

// ============================================================================
// Directions and element references
// ============================================================================

/// Direction of travel relative to a block's natural axis.
///
/// A block's natural axis runs from socket 0 (`previous`) to socket 1
/// (`next`); its feedbacks are indexed `0..n-1` along that axis. This is
/// pure geometry and independent of the locomotive's
/// [`BodyDirection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Travelling from socket 0 towards socket 1.
    Next,
    /// Travelling from socket 1 towards socket 0.
    Previous,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Next => Direction::Previous,
            Direction::Previous => Direction::Next,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Next => f.write_str("next"),
            Direction::Previous => f.write_str("previous"),
        }
    }
}

/// Reference to a routable element (a block or a turnout) by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ElementRef {
    /// A block.
    Block(BlockId),
    /// A turnout.
    Turnout(TurnoutId),
}

impl ElementRef {
    /// Returns the block id if this references a block.
    pub fn as_block(&self) -> Option<&BlockId> {
        match self {
            ElementRef::Block(id) => Some(id),
            ElementRef::Turnout(_) => None,
        }
    }

    /// Returns the turnout id if this references a turnout.
    pub fn as_turnout(&self) -> Option<&TurnoutId> {
        match self {
            ElementRef::Turnout(id) => Some(id),
            ElementRef::Block(_) => None,
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementRef::Block(id) => write!(f, "block {id}"),
            ElementRef::Turnout(id) => write!(f, "turnout {id}"),
        }
    }
}

/// A socket of a specific element; the attachment point of a transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SocketRef {
    /// The element the socket belongs to.
    pub element: ElementRef,
    /// The socket index on that element.
    pub socket: SocketId,
}

impl SocketRef {
    /// Socket reference on a block.
    pub fn block(id: impl Into<BlockId>, socket: SocketId) -> Self {
        Self {
            element: ElementRef::Block(id.into()),
            socket,
        }
    }

    /// Socket reference on a turnout.
    pub fn turnout(id: impl Into<TurnoutId>, socket: SocketId) -> Self {
        Self {
            element: ElementRef::Turnout(id.into()),
            socket,
        }
    }
}

impl fmt::Display for SocketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element {
            ElementRef::Block(id) => write!(f, "{id}:{}", self.socket),
            ElementRef::Turnout(id) => write!(f, "{id}:{}", self.socket),
        }
    }
}

// ============================================================================
// Layout registry
// ============================================================================

/// Owning registry of all layout elements, keyed by id.
///
/// Elements are kept in declaration order; every query that iterates
/// (transitions from a socket, path-finder branching) sees that order,
/// which makes the runtime deterministic when randomization is off.
#[derive(Debug, Default)]
pub struct Layout {
    blocks: Vec<Block>,
    turnouts: Vec<Turnout>,
    feedbacks: Vec<Feedback>,
    transitions: Vec<Transition>,
    trains: Vec<Train>,
    routes: Vec<Route>,
}

impl Layout {
    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Registration (document load / tests)
    // ------------------------------------------------------------------

    /// Adds a block. Declaration order is preserved.
    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Adds a turnout.
    pub fn add_turnout(&mut self, turnout: Turnout) {
        self.turnouts.push(turnout);
    }

    /// Adds a feedback sensor.
    pub fn add_feedback(&mut self, feedback: Feedback) {
        self.feedbacks.push(feedback);
    }

    /// Adds a transition.
    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Adds a train.
    pub fn add_train(&mut self, train: Train) {
        self.trains.push(train);
    }

    /// Adds a route.
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// All blocks in declaration order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// All turnouts in declaration order.
    pub fn turnouts(&self) -> &[Turnout] {
        &self.turnouts
    }

    /// All feedbacks in declaration order.
    pub fn feedbacks(&self) -> &[Feedback] {
        &self.feedbacks
    }

    /// All transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// All trains in declaration order.
    pub fn trains(&self) -> &[Train] {
        &self.trains
    }

    /// All routes in declaration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Mutable view of all trains (diagnostics repair).
    pub(crate) fn trains_mut(&mut self) -> &mut Vec<Train> {
        &mut self.trains
    }

    /// Mutable view of all transitions (diagnostics repair).
    pub(crate) fn transitions_mut(&mut self) -> &mut Vec<Transition> {
        &mut self.transitions
    }

    /// Looks up a block by id.
    pub fn block(&self, id: &BlockId) -> Result<&Block, LayoutError> {
        self.blocks
            .iter()
            .find(|b| &b.id == id)
            .ok_or_else(|| LayoutError::BlockNotFound(id.clone()))
    }

    /// Looks up a block for mutation.
    pub fn block_mut(&mut self, id: &BlockId) -> Result<&mut Block, LayoutError> {
        self.blocks
            .iter_mut()
            .find(|b| &b.id == id)
            .ok_or_else(|| LayoutError::BlockNotFound(id.clone()))
    }

    /// Looks up a turnout by id.
    pub fn turnout(&self, id: &TurnoutId) -> Result<&Turnout, LayoutError> {
        self.turnouts
            .iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| LayoutError::TurnoutNotFound(id.clone()))
    }

    /// Looks up a turnout for mutation.
    pub fn turnout_mut(&mut self, id: &TurnoutId) -> Result<&mut Turnout, LayoutError> {
        self.turnouts
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| LayoutError::TurnoutNotFound(id.clone()))
    }

    /// Looks up a feedback by id.
    pub fn feedback(&self, id: &FeedbackId) -> Result<&Feedback, LayoutError> {
        self.feedbacks
            .iter()
            .find(|fb| &fb.id == id)
            .ok_or_else(|| LayoutError::FeedbackNotFound(id.clone()))
    }

    /// Looks up a feedback for mutation.
    pub fn feedback_mut(&mut self, id: &FeedbackId) -> Result<&mut Feedback, LayoutError> {
        self.feedbacks
            .iter_mut()
            .find(|fb| &fb.id == id)
            .ok_or_else(|| LayoutError::FeedbackNotFound(id.clone()))
    }

    /// Looks up a feedback by hardware address.
    pub fn feedback_by_address(&self, address: FeedbackAddress) -> Option<&Feedback> {
        self.feedbacks.iter().find(|fb| fb.address == address)
    }

    /// Looks up a feedback by hardware address, for mutation.
    pub fn feedback_by_address_mut(&mut self, address: FeedbackAddress) -> Option<&mut Feedback> {
        self.feedbacks.iter_mut().find(|fb| fb.address == address)
    }

    /// Looks up a train by id.
    pub fn train(&self, id: &TrainId) -> Result<&Train, LayoutError> {
        self.trains
            .iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| LayoutError::TrainNotFound(id.clone()))
    }

    /// Looks up a train for mutation.
    pub fn train_mut(&mut self, id: &TrainId) -> Result<&mut Train, LayoutError> {
        self.trains
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| LayoutError::TrainNotFound(id.clone()))
    }

    /// Looks up a train by locomotive bus address.
    pub fn train_by_address(&self, address: u32) -> Option<&Train> {
        self.trains.iter().find(|t| t.address == address)
    }

    /// Looks up a route by id.
    pub fn route(&self, id: &RouteId) -> Result<&Route, LayoutError> {
        self.routes
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| LayoutError::RouteNotFound(id.clone()))
    }

    /// Looks up a route for mutation.
    pub fn route_mut(&mut self, id: &RouteId) -> Result<&mut Route, LayoutError> {
        self.routes
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| LayoutError::RouteNotFound(id.clone()))
    }

    // ------------------------------------------------------------------
    // Train placement
    // ------------------------------------------------------------------

    /// Moves a train onto a block, keeping both sides of the
    /// train/block cross-reference in sync.
    ///
    /// The previous block's occupancy is cleared (its reservation is not:
    /// releasing reservations is the reservation engine's job), the new
    /// block records a [`TrainInstance`] and the train's `block`,
    /// `position` and reservation direction are updated.
    pub fn set_train_to_block(
        &mut self,
        train_id: &TrainId,
        block_id: &BlockId,
        position: usize,
        direction: Direction,
    ) -> Result<(), LayoutError> {
        // Validate both ends before mutating anything.
        self.train(train_id)?;
        self.block(block_id)?;

        let previous = self.train(train_id)?.block.clone();
        if let Some(prev_id) = previous {
            if let Ok(prev) = self.block_mut(&prev_id) {
                if prev.occupancy.as_ref().map(|o| &o.train) == Some(train_id) {
                    prev.occupancy = None;
                }
            }
        }

        let block = self.block_mut(block_id)?;
        block.occupancy = Some(TrainInstance {
            train: train_id.clone(),
            direction,
        });

        let train = self.train_mut(train_id)?;
        train.block = Some(block_id.clone());
        train.position = position;
        Ok(())
    }

    /// Removes a train from the layout surface: clears its block assignment
    /// and any occupancy pointing back at it.
    pub fn remove_train_from_blocks(&mut self, train_id: &TrainId) -> Result<(), LayoutError> {
        for block in &mut self.blocks {
            if block.occupancy.as_ref().map(|o| &o.train) == Some(train_id) {
                block.occupancy = None;
            }
        }
        let train = self.train_mut(train_id)?;
        train.block = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Runtime state scrubbing and invariants
    // ------------------------------------------------------------------

    /// Clears all runtime state: reservations, occupancies, feedback
    /// `detected` flags, train speeds and trailing chains.
    ///
    /// Used at document load; persisted positions and reservations are not
    /// trusted across a restart, the operator re-asserts them.
    pub fn clear_runtime_state(&mut self) {
        for block in &mut self.blocks {
            block.reservation = None;
            block.occupancy = None;
        }
        for turnout in &mut self.turnouts {
            turnout.reservation = None;
        }
        for transition in &mut self.transitions {
            transition.reservation = None;
        }
        for feedback in &mut self.feedbacks {
            feedback.detected = false;
        }
        for train in &mut self.trains {
            train.block = None;
            train.position = 0;
            train.speed_kph = 0;
            train.requested_kph = 0;
            train.state = TrainState::Stopped;
            train.scheduling = Scheduling::Manual;
            train.stop_trigger = StopTrigger::None;
            train.trailing.clear();
            train.route = None;
            train.route_step_index = 0;
        }
    }

    /// Verifies the cross-reference invariants that must hold between
    /// events:
    ///
    /// 1. block occupancy and train block assignment agree both ways;
    /// 2. every reservation names an existing train;
    /// 3. every train position lies in `0..=feedbacks.len()` of its block.
    ///
    /// Turnout-state agreement and trailing-chain contiguity are upheld by
    /// construction in the reservation engine and asserted in its tests.
    pub fn check_invariants(&self) -> Result<(), LayoutError> {
        for block in &self.blocks {
            if let Some(instance) = &block.occupancy {
                let train = self.train(&instance.train).map_err(|_| {
                    LayoutError::InvariantViolation(format!(
                        "block {} occupied by unknown train {}",
                        block.id, instance.train
                    ))
                })?;
                if train.block.as_ref() != Some(&block.id) {
                    return Err(LayoutError::InvariantViolation(format!(
                        "block {} claims train {} but the train is in {:?}",
                        block.id, instance.train, train.block
                    )));
                }
            }
            if let Some(reservation) = &block.reservation {
                if self.train(&reservation.train).is_err() {
                    return Err(LayoutError::InvariantViolation(format!(
                        "block {} reserved for unknown train {}",
                        block.id, reservation.train
                    )));
                }
            }
        }
        for turnout in &self.turnouts {
            if let Some(train) = &turnout.reservation {
                if self.train(train).is_err() {
                    return Err(LayoutError::InvariantViolation(format!(
                        "turnout {} reserved for unknown train {train}",
                        turnout.id
                    )));
                }
            }
        }
        for transition in &self.transitions {
            if let Some(train) = &transition.reservation {
                if self.train(train).is_err() {
                    return Err(LayoutError::InvariantViolation(format!(
                        "transition {} reserved for unknown train {train}",
                        transition.id
                    )));
                }
            }
        }
        for train in &self.trains {
            if let Some(block_id) = &train.block {
                let block = self.block(block_id)?;
                if block.occupancy.as_ref().map(|o| &o.train) != Some(&train.id) {
                    return Err(LayoutError::InvariantViolation(format!(
                        "train {} claims block {block_id} but the block does not claim it back",
                        train.id
                    )));
                }
                if train.position > block.feedbacks.len() {
                    return Err(LayoutError::InvariantViolation(format!(
                        "train {} position {} outside 0..={} of block {block_id}",
                        train.id,
                        train.position,
                        block.feedbacks.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_block_layout() -> Layout {
        let mut layout = Layout::new();
        layout.add_block(Block::new("b1", "Block 1", BlockCategory::Free));
        layout.add_block(Block::new("b2", "Block 2", BlockCategory::Station));
        layout.add_train(Train::new("t1", "Local", 3, DecoderFamily::Mm));
        layout
    }

    #[test]
    fn lookup_by_id() {
        let layout = two_block_layout();
        assert!(layout.block(&BlockId::new("b1")).is_ok());
        assert_eq!(
            layout.block(&BlockId::new("nope")),
            Err(LayoutError::BlockNotFound(BlockId::new("nope")))
        );
    }

    #[test]
    fn set_train_to_block_updates_both_sides() {
        let mut layout = two_block_layout();
        let t1 = TrainId::new("t1");
        let b1 = BlockId::new("b1");

        layout
            .set_train_to_block(&t1, &b1, 0, Direction::Next)
            .unwrap();

        let block = layout.block(&b1).unwrap();
        assert_eq!(block.occupancy.as_ref().unwrap().train, t1);
        assert_eq!(layout.train(&t1).unwrap().block, Some(b1));
        layout.check_invariants().unwrap();
    }

    #[test]
    fn moving_a_train_clears_the_previous_block() {
        let mut layout = two_block_layout();
        let t1 = TrainId::new("t1");
        let b1 = BlockId::new("b1");
        let b2 = BlockId::new("b2");

        layout
            .set_train_to_block(&t1, &b1, 0, Direction::Next)
            .unwrap();
        layout
            .set_train_to_block(&t1, &b2, 0, Direction::Next)
            .unwrap();

        assert!(layout.block(&b1).unwrap().occupancy.is_none());
        assert!(layout.block(&b2).unwrap().occupancy.is_some());
        layout.check_invariants().unwrap();
    }

    #[test]
    fn invariants_catch_one_sided_occupancy() {
        let mut layout = two_block_layout();
        let b1 = BlockId::new("b1");
        layout.block_mut(&b1).unwrap().occupancy = Some(TrainInstance {
            train: TrainId::new("t1"),
            direction: Direction::Next,
        });

        // The train never learned about the block.
        assert!(matches!(
            layout.check_invariants(),
            Err(LayoutError::InvariantViolation(_))
        ));
    }

    #[test]
    fn clear_runtime_state_resets_speed_and_reservations() {
        let mut layout = two_block_layout();
        let t1 = TrainId::new("t1");
        let b1 = BlockId::new("b1");
        layout
            .set_train_to_block(&t1, &b1, 0, Direction::Next)
            .unwrap();
        layout.train_mut(&t1).unwrap().speed_kph = 60;

        layout.clear_runtime_state();

        let train = layout.train(&t1).unwrap();
        assert_eq!(train.speed_kph, 0);
        assert!(train.block.is_none());
        assert!(layout.block(&b1).unwrap().occupancy.is_none());
    }

    #[test]
    fn direction_opposite() {
        assert_eq!(Direction::Next.opposite(), Direction::Previous);
        assert_eq!(Direction::Previous.opposite(), Direction::Next);
    }

    #[test]
    fn socket_ref_display() {
        assert_eq!(SocketRef::block("b1", 0).to_string(), "b1:0");
        assert_eq!(SocketRef::turnout("t1", 2).to_string(), "t1:2");
    }
}
