//! Path finder: depth-first search over the topology graph.
//!
//! Given a starting block and departure direction, the finder explores
//! transitions and turnout branches until it reaches the requested
//! destination or, when no destination is given, the first station block.
//! Branches are evaluated in topology declaration order, which makes
//! results deterministic; the randomize knob shuffles branch order to
//! diversify automatic routes, and with a destination set it draws up to
//! ten candidate paths and keeps the one with the fewest block steps.
//!
//! The result is the full element sequence (blocks with directions,
//! turnouts with their entry/exit sockets), from which a [`Route`]'s block
//! steps are derived.
//!
//! [`Route`]: crate::layout::Route

use core::fmt;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::PathSettings;
use crate::errors::LayoutError;
use crate::graph;
use crate::layout::{
    Block, BlockCategory, BlockId, Destination, Direction, ElementRef, Layout, RouteStep,
    SocketId, SocketRef, TrainId, TurnoutId,
};

/// How many candidate paths a randomized destination search draws.
const SHORTEST_SAMPLES: usize = 10;

// ============================================================================
// Constraints
// ============================================================================

/// How the finder treats blocks reserved for other trains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservedBlockBehavior {
    /// Never route through a block reserved for another train.
    Avoid,
    /// Avoid reserved blocks for the first `n` block steps, ignore
    /// reservations beyond that (they will likely have cleared by the time
    /// the train arrives).
    AvoidUntil(usize),
    /// Ignore reservations entirely.
    Ignore,
}

/// Per-search constraints derived from the requesting train.
#[derive(Clone, Debug)]
pub struct PathConstraints {
    /// Train the path is for; its own reservations and occupancy never
    /// block the search.
    pub train: TrainId,
    /// Reserved-block policy.
    pub reserved_blocks: ReservedBlockBehavior,
    /// When no destination is given, finish at the first station reached.
    pub stop_at_first_station: bool,
    /// Whether the train may run in both body directions; trains that
    /// cannot never get a path through a dead-end siding.
    pub bidirectional: bool,
}

impl PathConstraints {
    /// Default constraints for a train: avoid reserved blocks, stop at the
    /// first station, bidirectional running allowed.
    pub fn for_train(train: impl Into<TrainId>) -> Self {
        Self {
            train: train.into(),
            reserved_blocks: ReservedBlockBehavior::Avoid,
            stop_at_first_station: true,
            bidirectional: true,
        }
    }

    /// Sets the reserved-block policy.
    pub fn with_reserved_blocks(mut self, behavior: ReservedBlockBehavior) -> Self {
        self.reserved_blocks = behavior;
        self
    }

    /// Sets whether station blocks end a destination-less search.
    pub fn with_stop_at_first_station(mut self, stop: bool) -> Self {
        self.stop_at_first_station = stop;
        self
    }

    /// Sets the bidirectional capability.
    pub fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }
}

// ============================================================================
// Path
// ============================================================================

/// One element of a found path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathElement {
    /// A block traversed in `direction`.
    Block {
        /// The block.
        id: BlockId,
        /// Traversal direction.
        direction: Direction,
    },
    /// A turnout crossed from `entry` to `exit`.
    Turnout {
        /// The turnout.
        id: TurnoutId,
        /// Socket entered through.
        entry: SocketId,
        /// Socket left through.
        exit: SocketId,
    },
}

/// A physically valid sequence of blocks and turnouts.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Path {
    /// Elements in travel order, starting and ending with a block.
    pub elements: Vec<PathElement>,
}

impl Path {
    /// Number of block steps in the path.
    pub fn block_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| matches!(e, PathElement::Block { .. }))
            .count()
    }

    /// The block steps of the path, in travel order.
    pub fn block_steps(&self) -> Vec<RouteStep> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                PathElement::Block { id, direction } => {
                    Some(RouteStep::new(id.clone(), *direction))
                }
                PathElement::Turnout { .. } => None,
            })
            .collect()
    }

    /// Compact per-element notation, mainly for logs and tests.
    ///
    /// Blocks print as `entry:id:exit` sockets (the first element omits its
    /// entry, the last its exit); turnouts always print `entry:id:exit`.
    pub fn step_strings(&self) -> Vec<String> {
        let last = self.elements.len().saturating_sub(1);
        self.elements
            .iter()
            .enumerate()
            .map(|(i, element)| match element {
                PathElement::Block { id, direction } => {
                    let (entry, exit) = match direction {
                        Direction::Next => (0, 1),
                        Direction::Previous => (1, 0),
                    };
                    if i == 0 {
                        format!("{id}:{exit}")
                    } else if i == last {
                        format!("{entry}:{id}")
                    } else {
                        format!("{entry}:{id}:{exit}")
                    }
                }
                PathElement::Turnout { id, entry, exit } => format!("{entry}:{id}:{exit}"),
            })
            .collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.step_strings().join(", "))
    }
}

// ============================================================================
// Finder
// ============================================================================

/// Depth-first path finder over a layout.
pub struct PathFinder<'a> {
    layout: &'a Layout,
    settings: &'a PathSettings,
}

impl<'a> PathFinder<'a> {
    /// Creates a finder over the given layout.
    pub fn new(layout: &'a Layout, settings: &'a PathSettings) -> Self {
        Self { layout, settings }
    }

    /// Finds a path from `start` departing in `direction`.
    ///
    /// With a destination and randomization on, up to ten paths are drawn
    /// and the one with the fewest block steps wins. Returns `Ok(None)`
    /// when no path satisfies the constraints, and
    /// [`LayoutError::PathOverflow`] when a candidate exceeded the
    /// configured limit before finding anything.
    pub fn find(
        &self,
        start: &BlockId,
        direction: Direction,
        destination: Option<&Destination>,
        constraints: &PathConstraints,
    ) -> Result<Option<Path>, LayoutError> {
        let mut rng = self
            .settings
            .randomize
            .then(|| SmallRng::seed_from_u64(self.settings.seed));

        if destination.is_some() && self.settings.randomize {
            let mut best: Option<Path> = None;
            for sample in 0..SHORTEST_SAMPLES {
                match self.search(start, direction, destination, constraints, &mut rng)? {
                    Some(path) => {
                        if self.settings.verbose {
                            log::debug!(
                                "sample {sample}: {} blocks, {path}",
                                path.block_count()
                            );
                        }
                        let better = best
                            .as_ref()
                            .map(|b| path.block_count() < b.block_count())
                            .unwrap_or(true);
                        if better {
                            best = Some(path);
                        }
                    }
                    None => break,
                }
            }
            return Ok(best);
        }

        self.search(start, direction, destination, constraints, &mut rng)
    }

    fn search(
        &self,
        start: &BlockId,
        direction: Direction,
        destination: Option<&Destination>,
        constraints: &PathConstraints,
        rng: &mut Option<SmallRng>,
    ) -> Result<Option<Path>, LayoutError> {
        let start_block = self.layout.block(start)?;
        if let Some(dest) = destination {
            // Fail fast on a dangling destination id.
            self.layout.block(&dest.block)?;
        }

        let mut elements = vec![PathElement::Block {
            id: start.clone(),
            direction,
        }];
        let mut visited = vec![start.clone()];
        let exit = SocketRef {
            element: ElementRef::Block(start.clone()),
            socket: start_block.exit_socket(direction),
        };

        let found = self.extend(
            &exit,
            destination,
            constraints,
            &mut elements,
            &mut visited,
            &mut Vec::new(),
            rng,
        )?;
        Ok(found.then_some(Path { elements }))
    }

    /// Extends the path from an exit socket. Returns true when the path in
    /// `elements` reached a goal.
    #[allow(clippy::too_many_arguments)]
    fn extend(
        &self,
        from: &SocketRef,
        destination: Option<&Destination>,
        constraints: &PathConstraints,
        elements: &mut Vec<PathElement>,
        visited: &mut Vec<BlockId>,
        chain_turnouts: &mut Vec<(TurnoutId, SocketId)>,
        rng: &mut Option<SmallRng>,
    ) -> Result<bool, LayoutError> {
        let mut transitions = graph::transitions_from(self.layout, from);
        if let Some(rng) = rng.as_mut() {
            transitions.shuffle(rng);
        }

        for transition in transitions {
            let Some(far) = transition.other_end(from) else {
                continue;
            };
            match far.element.clone() {
                ElementRef::Block(block_id) => {
                    let block = self.layout.block(&block_id)?;
                    let arrival = block.direction_from_entry(far.socket);
                    if self.enter_block(
                        block,
                        arrival,
                        destination,
                        constraints,
                        elements,
                        visited,
                        rng,
                    )? {
                        return Ok(true);
                    }
                }
                ElementRef::Turnout(turnout_id) => {
                    if chain_turnouts
                        .iter()
                        .any(|(id, entry)| id == &turnout_id && *entry == far.socket)
                    {
                        continue;
                    }
                    chain_turnouts.push((turnout_id.clone(), far.socket));

                    let turnout = self.layout.turnout(&turnout_id)?;
                    let mut exits = turnout.exit_sockets(far.socket).to_vec();
                    if let Some(rng) = rng.as_mut() {
                        exits.shuffle(rng);
                    }
                    for exit in exits {
                        elements.push(PathElement::Turnout {
                            id: turnout_id.clone(),
                            entry: far.socket,
                            exit,
                        });
                        let exit_socket = SocketRef {
                            element: ElementRef::Turnout(turnout_id.clone()),
                            socket: exit,
                        };
                        if self.extend(
                            &exit_socket,
                            destination,
                            constraints,
                            elements,
                            visited,
                            chain_turnouts,
                            rng,
                        )? {
                            return Ok(true);
                        }
                        elements.pop();
                    }
                    chain_turnouts.pop();
                }
            }
        }
        Ok(false)
    }

    /// Evaluates a candidate block and recurses through it. Returns true
    /// when the path reached a goal.
    #[allow(clippy::too_many_arguments)]
    fn enter_block(
        &self,
        block: &Block,
        direction: Direction,
        destination: Option<&Destination>,
        constraints: &PathConstraints,
        elements: &mut Vec<PathElement>,
        visited: &mut Vec<BlockId>,
        rng: &mut Option<SmallRng>,
    ) -> Result<bool, LayoutError> {
        if !block.enabled {
            self.trace(block, "disabled");
            return Ok(false);
        }
        if let Some(occupancy) = &block.occupancy {
            if occupancy.train != constraints.train {
                self.trace(block, "occupied by another train");
                return Ok(false);
            }
        }
        if let Some(reservation) = &block.reservation {
            if reservation.train != constraints.train {
                let blocked = match constraints.reserved_blocks {
                    ReservedBlockBehavior::Avoid => true,
                    ReservedBlockBehavior::AvoidUntil(n) => blocks_so_far(elements) <= n,
                    ReservedBlockBehavior::Ignore => false,
                };
                if blocked {
                    self.trace(block, "reserved for another train");
                    return Ok(false);
                }
            }
        }
        if !constraints.bidirectional
            && matches!(
                block.category,
                BlockCategory::SidingPrevious | BlockCategory::SidingNext
            )
        {
            self.trace(block, "siding needs a bidirectional train");
            return Ok(false);
        }

        // Destination test comes before the visited test: a path may loop
        // back into its own start block when that is the requested goal.
        if let Some(dest) = destination {
            if dest.block == block.id
                && dest.direction.map(|d| d == direction).unwrap_or(true)
            {
                elements.push(PathElement::Block {
                    id: block.id.clone(),
                    direction,
                });
                return Ok(true);
            }
        }

        if visited.contains(&block.id) {
            self.trace(block, "already visited");
            return Ok(false);
        }

        if destination.is_none() && constraints.stop_at_first_station && block.is_station() {
            elements.push(PathElement::Block {
                id: block.id.clone(),
                direction,
            });
            return Ok(true);
        }

        if blocks_so_far(elements) >= self.settings.overflow_limit {
            return Err(LayoutError::PathOverflow {
                limit: self.settings.overflow_limit,
            });
        }

        elements.push(PathElement::Block {
            id: block.id.clone(),
            direction,
        });
        visited.push(block.id.clone());

        let exit = SocketRef {
            element: ElementRef::Block(block.id.clone()),
            socket: block.exit_socket(direction),
        };
        if self.extend(
            &exit,
            destination,
            constraints,
            elements,
            visited,
            &mut Vec::new(),
            rng,
        )? {
            return Ok(true);
        }

        visited.pop();
        elements.pop();
        Ok(false)
    }

    fn trace(&self, block: &Block, reason: &str) {
        if self.settings.verbose {
            log::trace!("rejecting block {}: {reason}", block.id);
        }
    }
}

fn blocks_so_far(elements: &[PathElement]) -> usize {
    elements
        .iter()
        .filter(|e| matches!(e, PathElement::Block { .. }))
        .count()
}
