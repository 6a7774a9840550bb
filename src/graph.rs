//! Queries over the topology graph.
//!
//! The layout's transitions join block and turnout sockets into a directed
//! graph. This module answers the questions everything above it is built
//! on: which transitions leave a socket, which sockets a turnout exposes
//! from a given entry, and what chain of transitions and turnouts links two
//! adjacent blocks. Results follow declaration order, so queries are
//! deterministic.

use crate::errors::LayoutError;
use crate::layout::{
    BlockId, Direction, ElementRef, Layout, SocketId, SocketRef, Transition, TransitionId,
    TurnoutId,
};

/// Matches transitions by endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketQuery {
    /// A specific socket of a specific element.
    Exact(SocketRef),
    /// Any socket of the given element.
    AnyOf(ElementRef),
}

impl SocketQuery {
    fn matches(&self, socket: &SocketRef) -> bool {
        match self {
            SocketQuery::Exact(s) => s == socket,
            SocketQuery::AnyOf(element) => element == &socket.element,
        }
    }
}

/// Transitions with an endpoint matching `query`, in declaration order.
pub fn transitions_matching<'a>(layout: &'a Layout, query: &SocketQuery) -> Vec<&'a Transition> {
    layout
        .transitions()
        .iter()
        .filter(|t| query.matches(&t.a) || query.matches(&t.b))
        .collect()
}

/// Transitions attached to the given socket, in declaration order.
pub fn transitions_from<'a>(layout: &'a Layout, socket: &SocketRef) -> Vec<&'a Transition> {
    transitions_matching(layout, &SocketQuery::Exact(socket.clone()))
}

/// The transition linking two elements, regardless of sockets, if any.
pub fn transition_between<'a>(
    layout: &'a Layout,
    from: &ElementRef,
    to: &ElementRef,
) -> Option<&'a Transition> {
    layout.transitions().iter().find(|t| {
        (&t.a.element == from && &t.b.element == to)
            || (&t.a.element == to && &t.b.element == from)
    })
}

/// The sockets an element exposes.
pub fn sockets_of(layout: &Layout, element: &ElementRef) -> Result<&'static [SocketId], LayoutError> {
    match element {
        ElementRef::Block(id) => Ok(layout.block(id)?.sockets()),
        ElementRef::Turnout(id) => Ok(layout.turnout(id)?.category.sockets()),
    }
}

// ============================================================================
// Chains between adjacent route blocks
// ============================================================================

/// One link of a chain between two adjacent blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainLink {
    /// A transition crossed.
    Transition(TransitionId),
    /// A turnout crossed from `entry` to `exit`.
    Turnout {
        /// The turnout.
        id: TurnoutId,
        /// Socket the chain enters through.
        entry: SocketId,
        /// Socket the chain leaves through.
        exit: SocketId,
    },
}

/// The transitions and turnouts connecting one block's exit to the next
/// block's entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// Links in travel order, alternating transitions and turnouts,
    /// starting and ending with a transition.
    pub links: Vec<ChainLink>,
    /// Socket of the destination block the chain arrives at; its index
    /// determines the arrival [`Direction`].
    pub arrival: SocketRef,
}

impl Chain {
    /// Direction the destination block is entered in.
    pub fn arrival_direction(&self, layout: &Layout) -> Result<Direction, LayoutError> {
        match self.arrival.element.as_block() {
            Some(block_id) => {
                Ok(layout.block(block_id)?.direction_from_entry(self.arrival.socket))
            }
            None => Err(LayoutError::InvariantViolation(format!(
                "chain arrival {} is not a block socket",
                self.arrival
            ))),
        }
    }
}

/// Finds the chain from `from` (leaving in `direction`) to the adjacent
/// block `to`.
///
/// The search walks transitions and branches through turnouts depth-first
/// in declaration order; it never passes through another block, so the
/// result is the junction plumbing between two consecutive route steps.
/// Fails with [`LayoutError::NoTransition`] when `to` is not reachable
/// without crossing a third block.
pub fn chain_between(
    layout: &Layout,
    from: &BlockId,
    direction: Direction,
    to: &BlockId,
) -> Result<Chain, LayoutError> {
    let start = SocketRef {
        element: ElementRef::Block(from.clone()),
        socket: layout.block(from)?.exit_socket(direction),
    };
    let mut visited_turnouts: Vec<TurnoutId> = Vec::new();
    if let Some(chain) = walk(layout, &start, to, &mut visited_turnouts)? {
        Ok(chain)
    } else {
        Err(LayoutError::NoTransition {
            from: ElementRef::Block(from.clone()),
            to: ElementRef::Block(to.clone()),
        })
    }
}

fn walk(
    layout: &Layout,
    socket: &SocketRef,
    to: &BlockId,
    visited: &mut Vec<TurnoutId>,
) -> Result<Option<Chain>, LayoutError> {
    for transition in transitions_from(layout, socket) {
        let Some(far) = transition.other_end(socket) else {
            continue;
        };
        match &far.element {
            ElementRef::Block(block_id) => {
                if block_id == to {
                    return Ok(Some(Chain {
                        links: vec![ChainLink::Transition(transition.id.clone())],
                        arrival: far.clone(),
                    }));
                }
                // A different block ends this branch of the search.
            }
            ElementRef::Turnout(turnout_id) => {
                if visited.contains(turnout_id) {
                    continue;
                }
                visited.push(turnout_id.clone());
                let turnout = layout.turnout(turnout_id)?;
                for &exit in turnout.exit_sockets(far.socket) {
                    let exit_socket = SocketRef {
                        element: ElementRef::Turnout(turnout_id.clone()),
                        socket: exit,
                    };
                    if let Some(tail) = walk(layout, &exit_socket, to, visited)? {
                        let mut links = vec![
                            ChainLink::Transition(transition.id.clone()),
                            ChainLink::Turnout {
                                id: turnout_id.clone(),
                                entry: far.socket,
                                exit,
                            },
                        ];
                        links.extend(tail.links);
                        return Ok(Some(Chain {
                            links,
                            arrival: tail.arrival,
                        }));
                    }
                }
                visited.pop();
            }
        }
    }
    Ok(None)
}

/// The block a train leaving `from` in `direction` will roll into, given
/// the turnouts' *current* positions.
///
/// This is the manual-mode notion of "the next block": no route, no
/// reservations, just where the track is currently set to lead. Returns
/// `None` at an end of track, an unset transition, or a turnout whose
/// position does not route the entry socket anywhere.
pub fn next_block_following_turnouts(
    layout: &Layout,
    from: &BlockId,
    direction: Direction,
) -> Result<Option<(BlockId, Direction)>, LayoutError> {
    let mut socket = SocketRef {
        element: ElementRef::Block(from.clone()),
        socket: layout.block(from)?.exit_socket(direction),
    };

    // Bounded walk: a turnout chain longer than the turnout count means a
    // cycle of junctions with no block, which a sane layout does not have.
    for _ in 0..=layout.turnouts().len() {
        let Some(transition) = transitions_from(layout, &socket).into_iter().next() else {
            return Ok(None);
        };
        let Some(far) = transition.other_end(&socket) else {
            return Ok(None);
        };
        match &far.element {
            ElementRef::Block(block_id) => {
                let block = layout.block(block_id)?;
                return Ok(Some((block_id.clone(), block.direction_from_entry(far.socket))));
            }
            ElementRef::Turnout(turnout_id) => {
                let turnout = layout.turnout(turnout_id)?;
                let Some(exit) = turnout
                    .exit_sockets(far.socket)
                    .iter()
                    .copied()
                    .find(|&exit| turnout.routes(far.socket, exit))
                else {
                    return Ok(None);
                };
                socket = SocketRef {
                    element: ElementRef::Turnout(turnout_id.clone()),
                    socket: exit,
                };
            }
        }
    }
    Ok(None)
}
