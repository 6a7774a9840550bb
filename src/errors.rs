//! Error types for the layout runtime.
//!
//! All fallible runtime operations return [`LayoutError`]. Reservation
//! routines deliberately return `bool` instead (see [`crate::reservation`]):
//! "could not reserve" is a scheduling outcome the controller recovers from,
//! not an error, while everything in this enum is a real fault of the
//! topology, the route, or the runtime state.

use thiserror::Error;

use crate::layout::{
    BlockId, Direction, ElementRef, FeedbackId, RouteId, TrainId, TransitionId, TurnoutId,
};

/// Aggregate error type for all layout runtime operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// A block id was referenced that does not exist in the layout.
    #[error("block {0} not found")]
    BlockNotFound(BlockId),

    /// A turnout id was referenced that does not exist in the layout.
    #[error("turnout {0} not found")]
    TurnoutNotFound(TurnoutId),

    /// A feedback id was referenced that does not exist in the layout.
    #[error("feedback {0} not found")]
    FeedbackNotFound(FeedbackId),

    /// A train id was referenced that does not exist in the layout.
    #[error("train {0} not found")]
    TrainNotFound(TrainId),

    /// A route id was referenced that does not exist in the layout.
    #[error("route {0} not found")]
    RouteNotFound(RouteId),

    /// No transition links the two elements.
    #[error("no transition between {from} and {to}")]
    NoTransition {
        /// Element the chain search departed from.
        from: ElementRef,
        /// Element the chain search tried to reach.
        to: ElementRef,
    },

    /// A transition references a socket that the element does not have.
    #[error("transition {transition} attaches to missing socket {socket} of {element}")]
    SocketNotFound {
        /// The offending transition.
        transition: TransitionId,
        /// Element whose socket is missing.
        element: ElementRef,
        /// The socket id that does not exist.
        socket: u8,
    },

    /// A train has no current block but the operation requires one.
    #[error("train {0} is not assigned to a block")]
    TrainNotPositioned(TrainId),

    /// A train has no active route but the operation requires one.
    #[error("train {0} has no active route")]
    TrainNotRouted(TrainId),

    /// At the end of an `automaticOnce` route the train is not in the
    /// requested destination block (or not facing the requested direction).
    #[error("train {train} ended route in {actual} ({actual_direction:?}), expected {expected}")]
    DestinationMismatch {
        /// The train that completed the route.
        train: TrainId,
        /// Destination block the route was generated for.
        expected: BlockId,
        /// Block the train actually ended in.
        actual: BlockId,
        /// Direction the train actually arrived with.
        actual_direction: Option<Direction>,
    },

    /// The path finder exceeded its configured step limit.
    #[error("path search exceeded the {limit}-step overflow limit")]
    PathOverflow {
        /// The configured limit that was exceeded.
        limit: usize,
    },

    /// A cross-reference invariant does not hold (see
    /// [`crate::layout::Layout::check_invariants`]).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
