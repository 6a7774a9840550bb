//! Transitions: the physical links joining sockets into a graph.

use super::{SocketRef, TrainId, TransitionId};

/// A link between two sockets of blocks or turnouts.
///
/// Transitions are directional in use (a train crosses from one endpoint to
/// the other) but equality treats `(a, b)` and `(b, a)` as the same
/// physical link.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transition {
    /// Stable identifier.
    pub id: TransitionId,
    /// One endpoint.
    pub a: SocketRef,
    /// The other endpoint.
    pub b: SocketRef,
    /// Train holding the transition, at most one. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub reservation: Option<TrainId>,
}

impl Transition {
    /// Creates an unreserved transition.
    pub fn new(id: impl Into<TransitionId>, a: SocketRef, b: SocketRef) -> Self {
        Self {
            id: id.into(),
            a,
            b,
            reservation: None,
        }
    }

    /// True when either endpoint is the given socket.
    pub fn touches(&self, socket: &SocketRef) -> bool {
        &self.a == socket || &self.b == socket
    }

    /// The endpoint opposite `socket`, when `socket` is one of the two.
    pub fn other_end(&self, socket: &SocketRef) -> Option<&SocketRef> {
        if &self.a == socket {
            Some(&self.b)
        } else if &self.b == socket {
            Some(&self.a)
        } else {
            None
        }
    }

    /// True when the transition connects a socket to itself.
    pub fn is_self_loop(&self) -> bool {
        self.a == self.b
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        (self.a == other.a && self.b == other.b) || (self.a == other.b && self.b == other.a)
    }
}

impl Eq for Transition {}
