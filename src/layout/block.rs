//! Blocks: the unit of track reservation.
//!
//! A block is a section of track between junctions or dead ends. It has two
//! sockets, `0` on the previous side and `1` on the next side, and an ordered
//! list of feedback sensors indexed along its natural axis (socket 0 towards
//! socket 1). Sidings are dead ends and expose only their open socket.
//!
//! # Example
//!
//! ```rust
//! use railyard::layout::{Block, BlockCategory, Direction};
//!
//! let block = Block::new("s1", "Platform 1", BlockCategory::Station)
//!     .with_feedbacks(["s1.1", "s1.2"])
//!     .with_length_cm(120.0);
//!
//! // Travelling "next" enters through socket 0 and leaves through socket 1.
//! assert_eq!(block.entry_socket(Direction::Next), 0);
//! assert_eq!(block.exit_socket(Direction::Next), 1);
//! ```

use super::{Direction, FeedbackId, SocketId, TrainId};

/// Socket index of the previous side of a block.
pub const BLOCK_SOCKET_PREVIOUS: SocketId = 0;
/// Socket index of the next side of a block.
pub const BLOCK_SOCKET_NEXT: SocketId = 1;

/// What role a block plays for automatic routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum BlockCategory {
    /// A block where automatic routes pause or terminate.
    Station,
    /// Plain track.
    Free,
    /// Dead-end siding open on the previous side (socket 0).
    SidingPrevious,
    /// Dead-end siding open on the next side (socket 1).
    SidingNext,
}

/// Reservation of a block for a train travelling in one direction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockReservation {
    /// Train holding the reservation.
    pub train: TrainId,
    /// Direction the train will traverse the block in.
    pub direction: Direction,
    /// True while this is a leading reservation (ahead of the train),
    /// false once the train occupies or trails through the block.
    pub leading: bool,
}

/// A train physically present in a block.
///
/// Occupancy is tracked independently of reservation: a block stays
/// reserved for the occupying train, but a reservation alone does not mean
/// the train has arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainInstance {
    /// The occupying train.
    pub train: TrainId,
    /// Direction the train entered the block in.
    pub direction: Direction,
}

/// A section of track between junctions; the unit of reservation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    /// Stable identifier.
    pub id: super::BlockId,
    /// Human-readable name.
    pub name: String,
    /// Routing role of the block.
    pub category: BlockCategory,
    /// Disabled blocks are skipped by the path finder.
    pub enabled: bool,
    /// Feedback sensors in order along the natural axis (socket 0 → 1).
    pub feedbacks: Vec<FeedbackId>,
    /// Physical length in centimeters, when measured.
    #[cfg_attr(feature = "serde", serde(default))]
    pub length_cm: Option<f64>,
    /// Distance of each feedback from socket 0, in centimeters.
    #[cfg_attr(feature = "serde", serde(default))]
    pub feedback_distances_cm: Vec<f64>,
    /// Feedback that starts braking when travelling `next`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub brake_feedback_next: Option<FeedbackId>,
    /// Feedback that starts braking when travelling `previous`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub brake_feedback_previous: Option<FeedbackId>,
    /// Feedback that completes a stop when travelling `next`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub stop_feedback_next: Option<FeedbackId>,
    /// Feedback that completes a stop when travelling `previous`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub stop_feedback_previous: Option<FeedbackId>,
    /// Station waiting time before an automatic restart, in milliseconds.
    #[cfg_attr(feature = "serde", serde(default))]
    pub waiting_time_ms: Option<u64>,
    /// Current reservation, at most one at any time. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub reservation: Option<BlockReservation>,
    /// Occupying train, if any. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub occupancy: Option<TrainInstance>,
}

impl Block {
    /// Creates an enabled block with no feedbacks.
    pub fn new(
        id: impl Into<super::BlockId>,
        name: impl Into<String>,
        category: BlockCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            enabled: true,
            feedbacks: Vec::new(),
            length_cm: None,
            feedback_distances_cm: Vec::new(),
            brake_feedback_next: None,
            brake_feedback_previous: None,
            stop_feedback_next: None,
            stop_feedback_previous: None,
            waiting_time_ms: None,
            reservation: None,
            occupancy: None,
        }
    }

    /// Sets the ordered feedback list.
    pub fn with_feedbacks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FeedbackId>,
    {
        self.feedbacks = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the block length.
    pub fn with_length_cm(mut self, length: f64) -> Self {
        self.length_cm = Some(length);
        self
    }

    /// Sets the station waiting time.
    pub fn with_waiting_time_ms(mut self, ms: u64) -> Self {
        self.waiting_time_ms = Some(ms);
        self
    }

    /// Disables the block.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// True for blocks where automatic routes pause or terminate.
    pub fn is_station(&self) -> bool {
        self.category == BlockCategory::Station
    }

    /// The sockets this block exposes. Sidings expose only their open side.
    pub fn sockets(&self) -> &'static [SocketId] {
        match self.category {
            BlockCategory::Station | BlockCategory::Free => {
                &[BLOCK_SOCKET_PREVIOUS, BLOCK_SOCKET_NEXT]
            }
            BlockCategory::SidingPrevious => &[BLOCK_SOCKET_PREVIOUS],
            BlockCategory::SidingNext => &[BLOCK_SOCKET_NEXT],
        }
    }

    /// Socket a train enters through when traversing in `direction`.
    pub fn entry_socket(&self, direction: Direction) -> SocketId {
        match direction {
            Direction::Next => BLOCK_SOCKET_PREVIOUS,
            Direction::Previous => BLOCK_SOCKET_NEXT,
        }
    }

    /// Socket a train leaves through when traversing in `direction`.
    pub fn exit_socket(&self, direction: Direction) -> SocketId {
        match direction {
            Direction::Next => BLOCK_SOCKET_NEXT,
            Direction::Previous => BLOCK_SOCKET_PREVIOUS,
        }
    }

    /// Direction of travel implied by entering through `socket`.
    pub fn direction_from_entry(&self, socket: SocketId) -> Direction {
        if socket == BLOCK_SOCKET_PREVIOUS {
            Direction::Next
        } else {
            Direction::Previous
        }
    }

    /// Position value for a train that just entered in `direction`.
    ///
    /// Position counts feedbacks passed along the natural axis, so a train
    /// entering with the axis starts at 0 and one entering against it
    /// starts at `feedbacks.len()`.
    pub fn entry_position(&self, direction: Direction) -> usize {
        match direction {
            Direction::Next => 0,
            Direction::Previous => self.feedbacks.len(),
        }
    }

    /// First feedback hit when entering the block in `direction`.
    pub fn entry_feedback(&self, direction: Direction) -> Option<&FeedbackId> {
        match direction {
            Direction::Next => self.feedbacks.first(),
            Direction::Previous => self.feedbacks.last(),
        }
    }

    /// Feedback that completes a stop for the given travel direction.
    ///
    /// Falls back to the last feedback in travel order when no explicit
    /// selector is configured.
    pub fn stop_feedback(&self, direction: Direction) -> Option<&FeedbackId> {
        let explicit = match direction {
            Direction::Next => self.stop_feedback_next.as_ref(),
            Direction::Previous => self.stop_feedback_previous.as_ref(),
        };
        explicit.or_else(|| match direction {
            Direction::Next => self.feedbacks.last(),
            Direction::Previous => self.feedbacks.first(),
        })
    }

    /// Feedback that starts braking for the given travel direction.
    ///
    /// Falls back to the feedback just before the stop feedback in travel
    /// order; a single-feedback block brakes and stops on the same sensor.
    pub fn brake_feedback(&self, direction: Direction) -> Option<&FeedbackId> {
        let explicit = match direction {
            Direction::Next => self.brake_feedback_next.as_ref(),
            Direction::Previous => self.brake_feedback_previous.as_ref(),
        };
        explicit.or_else(|| {
            let n = self.feedbacks.len();
            match direction {
                Direction::Next if n >= 2 => self.feedbacks.get(n - 2),
                Direction::Previous if n >= 2 => self.feedbacks.get(1),
                _ => self.stop_feedback(direction),
            }
        })
    }

    /// Index of a feedback within this block, if it belongs to it.
    pub fn feedback_index(&self, id: &FeedbackId) -> Option<usize> {
        self.feedbacks.iter().position(|fb| fb == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Block {
        Block::new("b1", "Main", BlockCategory::Free).with_feedbacks(["f1", "f2", "f3"])
    }

    #[test]
    fn sockets_per_category() {
        assert_eq!(block().sockets(), &[0, 1]);
        assert_eq!(
            Block::new("s", "s", BlockCategory::SidingPrevious).sockets(),
            &[0]
        );
        assert_eq!(
            Block::new("s", "s", BlockCategory::SidingNext).sockets(),
            &[1]
        );
    }

    #[test]
    fn entry_and_exit_sockets() {
        let b = block();
        assert_eq!(b.entry_socket(Direction::Next), 0);
        assert_eq!(b.exit_socket(Direction::Next), 1);
        assert_eq!(b.entry_socket(Direction::Previous), 1);
        assert_eq!(b.exit_socket(Direction::Previous), 0);
        assert_eq!(b.direction_from_entry(0), Direction::Next);
        assert_eq!(b.direction_from_entry(1), Direction::Previous);
    }

    #[test]
    fn entry_position_depends_on_direction() {
        let b = block();
        assert_eq!(b.entry_position(Direction::Next), 0);
        assert_eq!(b.entry_position(Direction::Previous), 3);
    }

    #[test]
    fn entry_feedback_is_first_in_travel_order() {
        let b = block();
        assert_eq!(
            b.entry_feedback(Direction::Next),
            Some(&FeedbackId::new("f1"))
        );
        assert_eq!(
            b.entry_feedback(Direction::Previous),
            Some(&FeedbackId::new("f3"))
        );
    }

    #[test]
    fn derived_brake_and_stop_feedbacks() {
        let b = block();
        assert_eq!(b.stop_feedback(Direction::Next), Some(&FeedbackId::new("f3")));
        assert_eq!(
            b.brake_feedback(Direction::Next),
            Some(&FeedbackId::new("f2"))
        );
        assert_eq!(
            b.stop_feedback(Direction::Previous),
            Some(&FeedbackId::new("f1"))
        );
        assert_eq!(
            b.brake_feedback(Direction::Previous),
            Some(&FeedbackId::new("f2"))
        );
    }

    #[test]
    fn explicit_selectors_win() {
        let mut b = block();
        b.brake_feedback_next = Some(FeedbackId::new("f1"));
        assert_eq!(
            b.brake_feedback(Direction::Next),
            Some(&FeedbackId::new("f1"))
        );
    }

    #[test]
    fn single_feedback_block_brakes_on_the_stop_feedback() {
        let b = Block::new("b", "b", BlockCategory::Free).with_feedbacks(["only"]);
        assert_eq!(
            b.brake_feedback(Direction::Next),
            b.stop_feedback(Direction::Next)
        );
    }

    #[test]
    fn feedback_index_lookup() {
        let b = block();
        assert_eq!(b.feedback_index(&FeedbackId::new("f2")), Some(1));
        assert_eq!(b.feedback_index(&FeedbackId::new("zz")), None);
    }
}
