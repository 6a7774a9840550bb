//! Turnouts: routable junctions with category-specific geometry.
//!
//! Each [`TurnoutCategory`] fixes the set of sockets and, for every legal
//! `(entry, exit)` socket pair, the [`TurnoutState`] the turnout must hold
//! for a train to cross that way. Illegal pairs map to
//! [`TurnoutState::Invalid`].
//!
//! | Category | Sockets | Legal pairs (state) |
//! |---|---|---|
//! | `SingleLeft` | 0,1,2 | 0–1 straight, 0–2 branch-left |
//! | `SingleRight` | 0,1,2 | 0–1 straight, 0–2 branch-right |
//! | `ThreeWay` | 0,1,2,3 | 0–1 straight, 0–2 branch-left, 0–3 branch-right |
//! | `DoubleSlip` | 0,1,2,3 | 0–1 and 2–3 straight, 0–3 and 2–1 branch |
//! | `DoubleSlip2` | 0,1,2,3 | 0–1 straight01, 2–3 straight23, 0–3 branch03, 2–1 branch21 |
//!
//! A double slip drives both point pairs from one decoder address and only
//! distinguishes `Straight`/`Branch`; a `DoubleSlip2` has two addresses and
//! sets each crossing independently.

use super::{SocketId, TrainId, TurnoutId};

/// Geometry class of a turnout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum TurnoutCategory {
    /// Two-way turnout branching left.
    SingleLeft,
    /// Two-way turnout branching right.
    SingleRight,
    /// Three-way turnout (straight, left, right).
    ThreeWay,
    /// Double slip with a single decoder address.
    DoubleSlip,
    /// Double slip with two decoder addresses.
    DoubleSlip2,
}

/// Position state of a turnout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum TurnoutState {
    /// Main-line position of a single or three-way turnout; for a
    /// single-address double slip, both crossings straight.
    Straight,
    /// Left branch of a single-left or three-way turnout.
    BranchLeft,
    /// Right branch of a single-right or three-way turnout.
    BranchRight,
    /// Single-address double slip: both crossings branching.
    Branch,
    /// Two-address double slip: 0–1 straight.
    Straight01,
    /// Two-address double slip: 2–3 straight.
    Straight23,
    /// Two-address double slip: 0–3 branching.
    Branch03,
    /// Two-address double slip: 2–1 branching.
    Branch21,
    /// No legal state connects the requested socket pair.
    Invalid,
}

impl TurnoutCategory {
    /// All sockets of this category, in declaration order.
    pub fn sockets(self) -> &'static [SocketId] {
        match self {
            TurnoutCategory::SingleLeft | TurnoutCategory::SingleRight => &[0, 1, 2],
            TurnoutCategory::ThreeWay
            | TurnoutCategory::DoubleSlip
            | TurnoutCategory::DoubleSlip2 => &[0, 1, 2, 3],
        }
    }

    /// Exit sockets reachable from `entry`; empty when `entry` does not
    /// exist on this category.
    pub fn exit_sockets(self, entry: SocketId) -> &'static [SocketId] {
        match self {
            TurnoutCategory::SingleLeft | TurnoutCategory::SingleRight => match entry {
                0 => &[1, 2],
                1 | 2 => &[0],
                _ => &[],
            },
            TurnoutCategory::ThreeWay => match entry {
                0 => &[1, 2, 3],
                1 | 2 | 3 => &[0],
                _ => &[],
            },
            TurnoutCategory::DoubleSlip | TurnoutCategory::DoubleSlip2 => match entry {
                0 => &[1, 3],
                1 => &[0, 2],
                2 => &[3, 1],
                3 => &[2, 0],
                _ => &[],
            },
        }
    }

    /// State required to route a train from `entry` to `exit`.
    pub fn state_for(self, entry: SocketId, exit: SocketId) -> TurnoutState {
        let pair = |a: SocketId, b: SocketId| {
            (entry == a && exit == b) || (entry == b && exit == a)
        };
        match self {
            TurnoutCategory::SingleLeft => {
                if pair(0, 1) {
                    TurnoutState::Straight
                } else if pair(0, 2) {
                    TurnoutState::BranchLeft
                } else {
                    TurnoutState::Invalid
                }
            }
            TurnoutCategory::SingleRight => {
                if pair(0, 1) {
                    TurnoutState::Straight
                } else if pair(0, 2) {
                    TurnoutState::BranchRight
                } else {
                    TurnoutState::Invalid
                }
            }
            TurnoutCategory::ThreeWay => {
                if pair(0, 1) {
                    TurnoutState::Straight
                } else if pair(0, 2) {
                    TurnoutState::BranchLeft
                } else if pair(0, 3) {
                    TurnoutState::BranchRight
                } else {
                    TurnoutState::Invalid
                }
            }
            TurnoutCategory::DoubleSlip => {
                if pair(0, 1) || pair(2, 3) {
                    TurnoutState::Straight
                } else if pair(0, 3) || pair(2, 1) {
                    TurnoutState::Branch
                } else {
                    TurnoutState::Invalid
                }
            }
            TurnoutCategory::DoubleSlip2 => {
                if pair(0, 1) {
                    TurnoutState::Straight01
                } else if pair(2, 3) {
                    TurnoutState::Straight23
                } else if pair(0, 3) {
                    TurnoutState::Branch03
                } else if pair(2, 1) {
                    TurnoutState::Branch21
                } else {
                    TurnoutState::Invalid
                }
            }
        }
    }
}

/// A routable junction on the control bus.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Turnout {
    /// Stable identifier.
    pub id: TurnoutId,
    /// Human-readable name.
    pub name: String,
    /// Geometry class.
    pub category: TurnoutCategory,
    /// Decoder address on the control bus.
    pub address: u32,
    /// Second decoder address (three-way and two-address double slips).
    #[cfg_attr(feature = "serde", serde(default))]
    pub address2: Option<u32>,
    /// Current position state.
    pub state: TurnoutState,
    /// Physical length in centimeters, when measured.
    #[cfg_attr(feature = "serde", serde(default))]
    pub length_cm: Option<f64>,
    /// Train holding the turnout, at most one. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub reservation: Option<TrainId>,
}

impl Turnout {
    /// Creates a turnout in the straight position.
    pub fn new(
        id: impl Into<TurnoutId>,
        name: impl Into<String>,
        category: TurnoutCategory,
        address: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            address,
            address2: None,
            state: match category {
                TurnoutCategory::DoubleSlip2 => TurnoutState::Straight01,
                _ => TurnoutState::Straight,
            },
            length_cm: None,
            reservation: None,
        }
    }

    /// Sets the second decoder address.
    pub fn with_address2(mut self, address: u32) -> Self {
        self.address2 = Some(address);
        self
    }

    /// Sets the physical length.
    pub fn with_length_cm(mut self, length: f64) -> Self {
        self.length_cm = Some(length);
        self
    }

    /// Exit sockets reachable from `entry` for this turnout's category.
    pub fn exit_sockets(&self, entry: SocketId) -> &'static [SocketId] {
        self.category.exit_sockets(entry)
    }

    /// State required to route from `entry` to `exit`.
    pub fn state_for(&self, entry: SocketId, exit: SocketId) -> TurnoutState {
        self.category.state_for(entry, exit)
    }

    /// True when the current state routes `entry` to `exit`.
    ///
    /// For a single-address double slip one state covers two socket pairs,
    /// so this is the question to ask when following the current position
    /// (manual movement), as opposed to the position a reservation demands.
    pub fn routes(&self, entry: SocketId, exit: SocketId) -> bool {
        let required = self.state_for(entry, exit);
        required != TurnoutState::Invalid && required == self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_left_geometry() {
        let cat = TurnoutCategory::SingleLeft;
        assert_eq!(cat.sockets(), &[0, 1, 2]);
        assert_eq!(cat.exit_sockets(0), &[1, 2]);
        assert_eq!(cat.exit_sockets(1), &[0]);
        assert_eq!(cat.exit_sockets(2), &[0]);
        assert_eq!(cat.state_for(0, 1), TurnoutState::Straight);
        assert_eq!(cat.state_for(2, 0), TurnoutState::BranchLeft);
        assert_eq!(cat.state_for(1, 2), TurnoutState::Invalid);
    }

    #[test]
    fn single_right_branches_right() {
        let cat = TurnoutCategory::SingleRight;
        assert_eq!(cat.state_for(0, 2), TurnoutState::BranchRight);
        assert_eq!(cat.state_for(0, 1), TurnoutState::Straight);
    }

    #[test]
    fn three_way_geometry() {
        let cat = TurnoutCategory::ThreeWay;
        assert_eq!(cat.sockets(), &[0, 1, 2, 3]);
        assert_eq!(cat.exit_sockets(0), &[1, 2, 3]);
        assert_eq!(cat.state_for(0, 1), TurnoutState::Straight);
        assert_eq!(cat.state_for(0, 2), TurnoutState::BranchLeft);
        assert_eq!(cat.state_for(3, 0), TurnoutState::BranchRight);
        assert_eq!(cat.state_for(1, 2), TurnoutState::Invalid);
    }

    #[test]
    fn double_slip_pairs() {
        let cat = TurnoutCategory::DoubleSlip;
        // Straight pairs do not overlap; crossing pairs share no socket pair
        // with them.
        assert_eq!(cat.state_for(0, 1), TurnoutState::Straight);
        assert_eq!(cat.state_for(2, 3), TurnoutState::Straight);
        assert_eq!(cat.state_for(0, 3), TurnoutState::Branch);
        assert_eq!(cat.state_for(2, 1), TurnoutState::Branch);
        assert_eq!(cat.state_for(0, 2), TurnoutState::Invalid);
        assert_eq!(cat.state_for(1, 3), TurnoutState::Invalid);
    }

    #[test]
    fn double_slip2_distinguishes_each_pair() {
        let cat = TurnoutCategory::DoubleSlip2;
        assert_eq!(cat.state_for(0, 1), TurnoutState::Straight01);
        assert_eq!(cat.state_for(3, 2), TurnoutState::Straight23);
        assert_eq!(cat.state_for(0, 3), TurnoutState::Branch03);
        assert_eq!(cat.state_for(1, 2), TurnoutState::Branch21);
        assert_eq!(cat.state_for(0, 2), TurnoutState::Invalid);
    }

    #[test]
    fn exit_sockets_of_double_slips() {
        for cat in [TurnoutCategory::DoubleSlip, TurnoutCategory::DoubleSlip2] {
            assert_eq!(cat.exit_sockets(0), &[1, 3]);
            assert_eq!(cat.exit_sockets(1), &[0, 2]);
            assert_eq!(cat.exit_sockets(2), &[3, 1]);
            assert_eq!(cat.exit_sockets(3), &[2, 0]);
        }
    }

    #[test]
    fn unknown_entry_socket_has_no_exits() {
        assert!(TurnoutCategory::SingleLeft.exit_sockets(7).is_empty());
    }

    #[test]
    fn routes_follows_current_state() {
        let mut turnout = Turnout::new("t1", "West", TurnoutCategory::SingleLeft, 10);
        assert!(turnout.routes(0, 1));
        assert!(!turnout.routes(0, 2));

        turnout.state = TurnoutState::BranchLeft;
        assert!(turnout.routes(0, 2));
        assert!(!turnout.routes(0, 1));
        // Illegal pairs never route.
        assert!(!turnout.routes(1, 2));
    }

    #[test]
    fn double_slip_state_routes_both_pairs() {
        let mut ds = Turnout::new("d1", "Slip", TurnoutCategory::DoubleSlip, 20);
        assert!(ds.routes(0, 1));
        assert!(ds.routes(2, 3));
        ds.state = TurnoutState::Branch;
        assert!(ds.routes(0, 3));
        assert!(ds.routes(2, 1));
    }
}
