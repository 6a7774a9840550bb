//! Reservation engine: exclusive claims on blocks, turnouts and transitions.
//!
//! The engine is the only writer of `reserved` fields. A reservation of the
//! chain between two adjacent route blocks is atomic: every element is
//! verified free (or already owned by the same train) before anything is
//! mutated, so no other train's controller ever observes a half-reserved
//! chain. Reserving a turnout also sets its position to the state the
//! crossing requires and emits the matching [`BusCommand`]s. Sends are
//! fire and forget; the model is not rolled back on bus errors.
//!
//! Reservation routines report `bool`: "could not reserve" is a scheduling
//! outcome the train controller turns into a temporary stop or a route
//! regeneration, not an error. Topology problems (no transition chain,
//! dangling ids) are [`LayoutError`]s.

use log::{debug, warn};

use crate::commands::{turnout_commands, BusCommand};
use crate::errors::LayoutError;
use crate::graph::{self, ChainLink};
use crate::layout::{
    BlockId, BlockReservation, Direction, Layout, TrailingStep, TrainId, TurnoutState,
};

/// Reserves the chain from `from` (leaving in `direction`) into the
/// adjacent block `to` for `train`.
///
/// Verifies every transition, turnout and the destination block are free or
/// already owned by `train`, then in one pass marks them reserved, sets
/// each turnout to the state its crossing requires (emitting commands into
/// `commands`) and records the arrival direction on `to`. Returns
/// `Ok(false)`, with no state touched, when any element is held by
/// another train.
pub fn reserve(
    layout: &mut Layout,
    commands: &mut Vec<BusCommand>,
    train: &TrainId,
    from: &BlockId,
    to: &BlockId,
    direction: Direction,
) -> Result<bool, LayoutError> {
    let chain = graph::chain_between(layout, from, direction, to)?;
    let arrival_direction = chain.arrival_direction(layout)?;

    // Verification pass: nothing is mutated until the whole chain is known
    // to be available.
    for link in &chain.links {
        match link {
            ChainLink::Transition(id) => {
                let transition = layout
                    .transitions()
                    .iter()
                    .find(|t| &t.id == id)
                    .ok_or_else(|| LayoutError::InvariantViolation(format!(
                        "chain names unknown transition {id}"
                    )))?;
                if transition.reservation.as_ref().is_some_and(|t| t != train) {
                    debug!("reserve {from}->{to} for {train}: transition {id} is taken");
                    return Ok(false);
                }
            }
            ChainLink::Turnout { id, entry, exit } => {
                let turnout = layout.turnout(id)?;
                if turnout.reservation.as_ref().is_some_and(|t| t != train) {
                    debug!("reserve {from}->{to} for {train}: turnout {id} is taken");
                    return Ok(false);
                }
                if turnout.state_for(*entry, *exit) == TurnoutState::Invalid {
                    return Err(LayoutError::InvariantViolation(format!(
                        "chain crosses turnout {id} on illegal pair {entry}->{exit}"
                    )));
                }
            }
        }
    }
    let target = layout.block(to)?;
    if target.reservation.as_ref().is_some_and(|r| &r.train != train) {
        debug!("reserve {from}->{to} for {train}: block {to} is reserved");
        return Ok(false);
    }
    if target.occupancy.as_ref().is_some_and(|o| &o.train != train) {
        debug!("reserve {from}->{to} for {train}: block {to} is occupied");
        return Ok(false);
    }

    // Mutation pass.
    for link in &chain.links {
        match link {
            ChainLink::Transition(id) => {
                for transition in layout.transitions_mut() {
                    if &transition.id == id {
                        transition.reservation = Some(train.clone());
                    }
                }
            }
            ChainLink::Turnout { id, entry, exit } => {
                let required = layout.turnout(id)?.state_for(*entry, *exit);
                let turnout = layout.turnout_mut(id)?;
                turnout.reservation = Some(train.clone());
                if turnout.state != required {
                    turnout.state = required;
                    commands.extend(turnout_commands(layout.turnout(id)?, required));
                }
            }
        }
    }
    let target = layout.block_mut(to)?;
    target.reservation = Some(BlockReservation {
        train: train.clone(),
        direction: arrival_direction,
        leading: true,
    });
    debug!("reserved {from}->{to} ({arrival_direction}) for {train}");
    Ok(true)
}

/// Reserves leading blocks along the train's route, starting at its current
/// route step, up to the train's `max_leading_blocks` window.
///
/// Already-held steps count towards the window. Returns `Ok(true)` when at
/// least one leading step is held afterwards; a blocked first step returns
/// `Ok(false)` and leaves previously valid reservations standing.
pub fn reserve_leading(
    layout: &mut Layout,
    commands: &mut Vec<BusCommand>,
    train_id: &TrainId,
) -> Result<bool, LayoutError> {
    let train = layout.train(train_id)?;
    let route_id = train
        .route
        .clone()
        .ok_or_else(|| LayoutError::TrainNotRouted(train_id.clone()))?;
    let max_leading = train.max_leading_blocks;
    let start_index = train.route_step_index;
    let route = layout.route(&route_id)?;
    let steps: Vec<_> = route.steps.to_vec();

    let mut held = 0usize;
    for window in 0..max_leading {
        let from_index = start_index + window;
        let Some(from_step) = steps.get(from_index) else {
            break;
        };
        let Some(to_step) = steps.get(from_index + 1) else {
            break;
        };

        let already_ours = layout
            .block(&to_step.block)?
            .reservation
            .as_ref()
            .is_some_and(|r| &r.train == train_id);
        if already_ours {
            held += 1;
            continue;
        }

        if reserve(
            layout,
            commands,
            train_id,
            &from_step.block,
            &to_step.block,
            from_step.direction,
        )? {
            let reserved = layout.block(&to_step.block)?;
            if reserved
                .reservation
                .as_ref()
                .is_some_and(|r| r.direction != to_step.direction)
            {
                warn!(
                    "route step {} of {route_id} disagrees with topology on direction",
                    from_index + 1
                );
            }
            held += 1;
        } else {
            break;
        }
    }

    Ok(held >= 1)
}

/// Releases trailing elements until the train's trailing block count is at
/// or below its requirement. Elements are released oldest first, each block
/// together with the junction plumbing that followed it.
pub fn free_trailing(layout: &mut Layout, train_id: &TrainId) -> Result<(), LayoutError> {
    loop {
        let train = layout.train(train_id)?;
        if train.trailing_block_count() <= train.trailing_required {
            return Ok(());
        }

        // Pop the oldest block and every non-block element up to the next
        // block entry.
        let mut released = Vec::new();
        let train = layout.train_mut(train_id)?;
        if let Some(first) = train.trailing.first() {
            if !matches!(first, TrailingStep::Block { .. }) {
                return Err(LayoutError::InvariantViolation(format!(
                    "trailing chain of {train_id} does not start with a block"
                )));
            }
        }
        released.push(train.trailing.remove(0));
        while let Some(step) = train.trailing.first() {
            if matches!(step, TrailingStep::Block { .. }) {
                break;
            }
            released.push(train.trailing.remove(0));
        }

        for step in released {
            match step {
                TrailingStep::Block { id, .. } => {
                    let block = layout.block_mut(&id)?;
                    if block.reservation.as_ref().is_some_and(|r| &r.train == train_id) {
                        block.reservation = None;
                    }
                    debug!("freed trailing block {id} of {train_id}");
                }
                TrailingStep::Turnout(id) => {
                    let turnout = layout.turnout_mut(&id)?;
                    if turnout.reservation.as_ref() == Some(train_id) {
                        turnout.reservation = None;
                    }
                }
                TrailingStep::Transition(id) => {
                    for transition in layout.transitions_mut() {
                        if transition.id == id && transition.reservation.as_ref() == Some(train_id)
                        {
                            transition.reservation = None;
                        }
                    }
                }
            }
        }
    }
}

/// Unconditionally releases a block's reservation and occupancy.
pub fn free_block(layout: &mut Layout, block_id: &BlockId) -> Result<(), LayoutError> {
    let block = layout.block_mut(block_id)?;
    if let Some(instance) = block.occupancy.take() {
        let train_id = instance.train;
        if let Ok(train) = layout.train_mut(&train_id) {
            if train.block.as_ref() == Some(block_id) {
                train.block = None;
            }
        }
        let block = layout.block_mut(block_id)?;
        block.reservation = None;
    } else {
        block.reservation = None;
    }
    Ok(())
}

/// Unconditionally releases the reserved chain from `from` (inclusive) up
/// to `to_exclusive`, following turnout positions in `direction` of travel.
///
/// Used by the operator to tear down a stopped train's leading
/// reservations. Occupancies are left alone (the trains are still
/// physically there); the walk follows reserved transitions only and gives
/// up when the chain is broken or `to_exclusive` is reached.
pub fn free_between(
    layout: &mut Layout,
    from: &BlockId,
    to_exclusive: &BlockId,
    direction: Direction,
) -> Result<(), LayoutError> {
    let mut current = from.clone();
    let mut current_direction = direction;

    // Bounded by the number of blocks so a reservation cycle cannot loop.
    for _ in 0..layout.blocks().len() {
        let block = layout.block_mut(&current)?;
        let exit = crate::layout::SocketRef {
            element: crate::layout::ElementRef::Block(current.clone()),
            socket: block.exit_socket(current_direction),
        };
        block.reservation = None;

        let Some(next) = release_chain_from(layout, &exit)? else {
            return Ok(());
        };
        let (next_block, arrival) = next;
        if next_block == *to_exclusive {
            return Ok(());
        }
        current_direction = layout.block(&next_block)?.direction_from_entry(arrival);
        current = next_block;
    }
    Ok(())
}

/// Clears reserved transitions and turnouts from `socket` until the next
/// block, following each turnout's current position. Returns the block
/// reached and its arrival socket, or `None` when the chain ends.
fn release_chain_from(
    layout: &mut Layout,
    socket: &crate::layout::SocketRef,
) -> Result<Option<(BlockId, u8)>, LayoutError> {
    let mut here = socket.clone();
    loop {
        let next = graph::transitions_from(layout, &here)
            .into_iter()
            .find(|t| t.reservation.is_some())
            .and_then(|t| t.other_end(&here).cloned().map(|far| (t.id.clone(), far)));
        let Some((transition_id, far)) = next else {
            return Ok(None);
        };

        for transition in layout.transitions_mut() {
            if transition.id == transition_id {
                transition.reservation = None;
            }
        }

        match far.element.clone() {
            crate::layout::ElementRef::Block(block_id) => {
                return Ok(Some((block_id, far.socket)));
            }
            crate::layout::ElementRef::Turnout(turnout_id) => {
                let turnout = layout.turnout(&turnout_id)?;
                let exit = turnout
                    .exit_sockets(far.socket)
                    .iter()
                    .copied()
                    .find(|&exit| turnout.routes(far.socket, exit));
                layout.turnout_mut(&turnout_id)?.reservation = None;
                let Some(exit) = exit else {
                    return Ok(None);
                };
                here = crate::layout::SocketRef {
                    element: crate::layout::ElementRef::Turnout(turnout_id),
                    socket: exit,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{
        Block, BlockCategory, DecoderFamily, Route, RouteMode, RouteStep, SocketRef, Train,
        Transition, Turnout, TurnoutCategory, TurnoutId,
    };

    /// b1 --tr1-- t1 --tr2-- b2   (t1 branch --tr3-- b3)
    fn layout_with_turnout() -> Layout {
        let mut layout = Layout::new();
        layout.add_block(Block::new("b1", "b1", BlockCategory::Free));
        layout.add_block(Block::new("b2", "b2", BlockCategory::Free));
        layout.add_block(Block::new("b3", "b3", BlockCategory::Free));
        layout.add_turnout(Turnout::new("t1", "t1", TurnoutCategory::SingleLeft, 7));
        layout.add_transition(Transition::new(
            "tr1",
            SocketRef::block("b1", 1),
            SocketRef::turnout("t1", 0),
        ));
        layout.add_transition(Transition::new(
            "tr2",
            SocketRef::turnout("t1", 1),
            SocketRef::block("b2", 0),
        ));
        layout.add_transition(Transition::new(
            "tr3",
            SocketRef::turnout("t1", 2),
            SocketRef::block("b3", 0),
        ));
        layout.add_train(Train::new("ice", "ICE", 3, DecoderFamily::Mfx));
        layout.add_train(Train::new("re", "RE", 4, DecoderFamily::Mm));
        layout
    }

    #[test]
    fn reserve_claims_chain_and_sets_turnout() {
        let mut layout = layout_with_turnout();
        let mut commands = Vec::new();
        let ice = TrainId::new("ice");

        let ok = reserve(
            &mut layout,
            &mut commands,
            &ice,
            &BlockId::new("b1"),
            &BlockId::new("b3"),
            Direction::Next,
        )
        .unwrap();
        assert!(ok);

        let turnout = layout.turnout(&TurnoutId::new("t1")).unwrap();
        assert_eq!(turnout.reservation, Some(ice.clone()));
        assert_eq!(turnout.state, TurnoutState::BranchLeft);
        // The turnout position change went out on the bus.
        assert_eq!(commands.len(), 1);

        let b3 = layout.block(&BlockId::new("b3")).unwrap();
        let reservation = b3.reservation.as_ref().unwrap();
        assert_eq!(reservation.train, ice);
        assert_eq!(reservation.direction, Direction::Next);
        assert!(reservation.leading);
    }

    #[test]
    fn reserve_is_idempotent_for_the_same_train() {
        let mut layout = layout_with_turnout();
        let mut commands = Vec::new();
        let ice = TrainId::new("ice");

        for _ in 0..2 {
            let ok = reserve(
                &mut layout,
                &mut commands,
                &ice,
                &BlockId::new("b1"),
                &BlockId::new("b2"),
                Direction::Next,
            )
            .unwrap();
            assert!(ok);
        }
        // Straight is the initial state, so no command was needed.
        assert!(commands.is_empty());
    }

    #[test]
    fn reserve_fails_atomically_when_turnout_is_taken() {
        let mut layout = layout_with_turnout();
        let mut commands = Vec::new();
        layout.turnout_mut(&TurnoutId::new("t1")).unwrap().reservation =
            Some(TrainId::new("re"));

        let ok = reserve(
            &mut layout,
            &mut commands,
            &TrainId::new("ice"),
            &BlockId::new("b1"),
            &BlockId::new("b2"),
            Direction::Next,
        )
        .unwrap();
        assert!(!ok);

        // Nothing was mutated: no transition claimed, no block reserved,
        // no command emitted.
        assert!(layout.transitions().iter().all(|t| t.reservation.is_none()));
        assert!(layout.block(&BlockId::new("b2")).unwrap().reservation.is_none());
        assert!(commands.is_empty());
    }

    #[test]
    fn reserve_fails_when_target_block_is_reserved() {
        let mut layout = layout_with_turnout();
        let mut commands = Vec::new();
        layout.block_mut(&BlockId::new("b2")).unwrap().reservation = Some(BlockReservation {
            train: TrainId::new("re"),
            direction: Direction::Next,
            leading: true,
        });

        let ok = reserve(
            &mut layout,
            &mut commands,
            &TrainId::new("ice"),
            &BlockId::new("b1"),
            &BlockId::new("b2"),
            Direction::Next,
        )
        .unwrap();
        assert!(!ok);
        assert!(layout
            .turnout(&TurnoutId::new("t1"))
            .unwrap()
            .reservation
            .is_none());
    }

    #[test]
    fn mutual_exclusion_between_trains() {
        let mut layout = layout_with_turnout();
        let mut commands = Vec::new();

        assert!(reserve(
            &mut layout,
            &mut commands,
            &TrainId::new("ice"),
            &BlockId::new("b1"),
            &BlockId::new("b2"),
            Direction::Next,
        )
        .unwrap());
        // The second train needs the same turnout.
        assert!(!reserve(
            &mut layout,
            &mut commands,
            &TrainId::new("re"),
            &BlockId::new("b1"),
            &BlockId::new("b3"),
            Direction::Next,
        )
        .unwrap());
    }

    fn chain_route(layout: &mut Layout) {
        layout.add_route(Route::new(
            "r1",
            RouteMode::Fixed,
            vec![
                RouteStep::new("b1", Direction::Next),
                RouteStep::new("b2", Direction::Next),
            ],
        ));
        let train = layout.train_mut(&TrainId::new("ice")).unwrap();
        train.route = Some(crate::layout::RouteId::new("r1"));
        train.route_step_index = 0;
        train.max_leading_blocks = 2;
    }

    #[test]
    fn reserve_leading_follows_the_route() {
        let mut layout = layout_with_turnout();
        chain_route(&mut layout);
        let mut commands = Vec::new();

        let ok = reserve_leading(&mut layout, &mut commands, &TrainId::new("ice")).unwrap();
        assert!(ok);
        assert_eq!(
            layout
                .block(&BlockId::new("b2"))
                .unwrap()
                .reservation
                .as_ref()
                .map(|r| r.train.clone()),
            Some(TrainId::new("ice"))
        );
    }

    #[test]
    fn reserve_leading_fails_when_first_step_is_blocked() {
        let mut layout = layout_with_turnout();
        chain_route(&mut layout);
        layout.block_mut(&BlockId::new("b2")).unwrap().reservation = Some(BlockReservation {
            train: TrainId::new("re"),
            direction: Direction::Next,
            leading: true,
        });
        let mut commands = Vec::new();

        let ok = reserve_leading(&mut layout, &mut commands, &TrainId::new("ice")).unwrap();
        assert!(!ok);
    }

    #[test]
    fn free_trailing_releases_down_to_the_requirement() {
        let mut layout = layout_with_turnout();
        let ice = TrainId::new("ice");
        let mut commands = Vec::new();

        // Manually build the state after the train crossed b1 -> b3.
        assert!(reserve(
            &mut layout,
            &mut commands,
            &ice,
            &BlockId::new("b1"),
            &BlockId::new("b3"),
            Direction::Next,
        )
        .unwrap());
        layout.block_mut(&BlockId::new("b1")).unwrap().reservation = Some(BlockReservation {
            train: ice.clone(),
            direction: Direction::Next,
            leading: false,
        });
        let train = layout.train_mut(&ice).unwrap();
        train.trailing_required = 0;
        train.trailing = vec![
            TrailingStep::Block {
                id: BlockId::new("b1"),
                direction: Direction::Next,
            },
            TrailingStep::Transition(crate::layout::TransitionId::new("tr1")),
            TrailingStep::Turnout(TurnoutId::new("t1")),
            TrailingStep::Transition(crate::layout::TransitionId::new("tr3")),
        ];

        free_trailing(&mut layout, &ice).unwrap();

        assert!(layout.block(&BlockId::new("b1")).unwrap().reservation.is_none());
        assert!(layout
            .turnout(&TurnoutId::new("t1"))
            .unwrap()
            .reservation
            .is_none());
        assert!(layout.transitions().iter().all(|t| t.reservation.is_none()));
        assert!(layout.train(&ice).unwrap().trailing.is_empty());
        // The block the train sits in keeps its reservation.
        assert!(layout.block(&BlockId::new("b3")).unwrap().reservation.is_some());
    }

    #[test]
    fn free_trailing_keeps_required_blocks() {
        let mut layout = layout_with_turnout();
        let ice = TrainId::new("ice");
        let train = layout.train_mut(&ice).unwrap();
        train.trailing_required = 1;
        train.trailing = vec![TrailingStep::Block {
            id: BlockId::new("b1"),
            direction: Direction::Next,
        }];

        free_trailing(&mut layout, &ice).unwrap();
        assert_eq!(layout.train(&ice).unwrap().trailing_block_count(), 1);
    }

    #[test]
    fn free_between_tears_down_a_leading_chain() {
        let mut layout = layout_with_turnout();
        let ice = TrainId::new("ice");
        let mut commands = Vec::new();
        assert!(reserve(
            &mut layout,
            &mut commands,
            &ice,
            &BlockId::new("b1"),
            &BlockId::new("b3"),
            Direction::Next,
        )
        .unwrap());
        layout.block_mut(&BlockId::new("b1")).unwrap().reservation = Some(BlockReservation {
            train: ice.clone(),
            direction: Direction::Next,
            leading: false,
        });

        // Free b1 and the chain, stopping short of nothing (b2 is not on
        // the chain): everything reserved gets released.
        free_between(
            &mut layout,
            &BlockId::new("b1"),
            &BlockId::new("b2"),
            Direction::Next,
        )
        .unwrap();

        assert!(layout.block(&BlockId::new("b1")).unwrap().reservation.is_none());
        assert!(layout
            .turnout(&TurnoutId::new("t1"))
            .unwrap()
            .reservation
            .is_none());
        assert!(layout.block(&BlockId::new("b3")).unwrap().reservation.is_none());
        assert!(layout.transitions().iter().all(|t| t.reservation.is_none()));
    }
}
