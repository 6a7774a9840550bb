//! Automatic handlers: route-driven train control.
//!
//! The pipeline order is fixed and load-bearing. For a single feedback
//! event, movement tracking runs before stop execution; for a block change,
//! stop detection runs before leading reservation so a train on its final
//! block does not request more track.

use log::{error, warn};

use crate::controller::{new_position, HandlerContext, TrainEvent, TrainHandler};
use crate::errors::LayoutError;
use crate::graph::{self, ChainLink};
use crate::layout::{
    BodyDirection, Direction, RouteMode, Scheduling, StopTrigger, TrailingStep, TrainId,
    TrainState, TurnoutState,
};
use crate::pathfinder::{PathConstraints, PathFinder, ReservedBlockBehavior};
use crate::reservation;

/// The automatic pipeline, in execution order.
pub fn pipeline() -> Vec<Box<dyn TrainHandler>> {
    vec![
        Box::new(Start),
        Box::new(MoveWithinBlock),
        Box::new(MoveToNextBlock),
        Box::new(DetectStop),
        Box::new(ExecuteStopInBlock),
        Box::new(ReserveLeadingBlocks),
        Box::new(SpeedLimit),
        Box::new(StopPushingWagons),
    ]
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Regenerates a train's automatic route from its current block and
/// direction, replacing the route steps in place.
///
/// Reserved blocks are avoided so the new route detours around the
/// conflict that triggered the regeneration. Returns false when the route
/// is fixed or no alternative path exists.
pub(crate) fn regenerate_route(
    ctx: &mut HandlerContext<'_>,
    train_id: &TrainId,
) -> Result<bool, LayoutError> {
    let train = ctx.layout.train(train_id)?;
    let block_id = train
        .block
        .clone()
        .ok_or_else(|| LayoutError::TrainNotPositioned(train_id.clone()))?;
    let route_id = train
        .route
        .clone()
        .ok_or_else(|| LayoutError::TrainNotRouted(train_id.clone()))?;

    let route = ctx.layout.route(&route_id)?;
    if !route.is_automatic() {
        return Ok(false);
    }
    let destination = match &route.mode {
        RouteMode::AutomaticOnce(destination) => Some(destination.clone()),
        _ => None,
    };

    let direction = occupancy_direction(ctx, train_id)?;
    let constraints = PathConstraints::for_train(train_id.clone())
        .with_reserved_blocks(ReservedBlockBehavior::Avoid);
    let path = PathFinder::new(ctx.layout, &ctx.config.path).find(
        &block_id,
        direction,
        destination.as_ref(),
        &constraints,
    )?;

    let Some(path) = path else {
        return Ok(false);
    };
    let steps = path.block_steps();
    log::debug!("regenerated route {route_id} for {train_id}: {path}");

    ctx.layout.route_mut(&route_id)?.steps = steps;
    let train = ctx.layout.train_mut(train_id)?;
    train.route_step_index = 0;
    train.start_route_index = 0;
    Ok(true)
}

/// The direction the train currently travels its block in, read from the
/// block's occupancy record.
fn occupancy_direction(
    ctx: &HandlerContext<'_>,
    train_id: &TrainId,
) -> Result<Direction, LayoutError> {
    let train = ctx.layout.train(train_id)?;
    let block_id = train
        .block
        .clone()
        .ok_or_else(|| LayoutError::TrainNotPositioned(train_id.clone()))?;
    let block = ctx.layout.block(&block_id)?;
    block
        .occupancy
        .as_ref()
        .filter(|instance| &instance.train == train_id)
        .map(|instance| instance.direction)
        .ok_or_else(|| {
            LayoutError::InvariantViolation(format!(
                "train {train_id} claims block {block_id} without occupancy"
            ))
        })
}

fn waiting_time_ms(ctx: &HandlerContext<'_>, train_id: &TrainId) -> Result<u64, LayoutError> {
    let train = ctx.layout.train(train_id)?;
    let step_value = train
        .route
        .as_ref()
        .and_then(|route_id| ctx.layout.route(route_id).ok())
        .and_then(|route| route.step(train.route_step_index))
        .and_then(|step| step.waiting_time_ms);
    if let Some(ms) = step_value {
        return Ok(ms);
    }
    let block_value = train
        .block
        .as_ref()
        .and_then(|block_id| ctx.layout.block(block_id).ok())
        .and_then(|block| block.waiting_time_ms);
    Ok(block_value.unwrap_or(ctx.config.default_waiting_time_ms))
}

// ============================================================================
// Start
// ============================================================================

/// Starts (or restarts) a scheduled train: regenerates an exhausted endless
/// route, reserves the leading window and commands the running speed.
pub struct Start;

impl TrainHandler for Start {
    fn name(&self) -> &'static str {
        "start"
    }

    fn wants(&self, event: &TrainEvent) -> bool {
        matches!(
            event,
            TrainEvent::SchedulingChanged { .. } | TrainEvent::RestartTimerFired { .. }
        )
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train_id: &TrainId,
        event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        let train = ctx.layout.train(train_id)?;
        if !train.scheduling.is_automatic() || train.state != TrainState::Stopped {
            return Ok(Vec::new());
        }
        if matches!(event, TrainEvent::SchedulingChanged { .. }) && ctx.timers.is_active(train_id)
        {
            // A station restart is already scheduled; let the timer start
            // the train.
            return Ok(Vec::new());
        }
        if train.block.is_none() {
            warn!("cannot start {train_id}: no block assigned");
            return Ok(Vec::new());
        }
        let Some(route_id) = train.route.clone() else {
            warn!("cannot start {train_id}: no route");
            return Ok(Vec::new());
        };
        let route = ctx.layout.route(&route_id)?;
        if !route.enabled {
            warn!("cannot start {train_id}: route {route_id} is disabled");
            return Ok(Vec::new());
        }

        let needs_route = route.steps.is_empty()
            || route.step(train.route_step_index + 1).is_none();
        if needs_route {
            if !route.is_automatic() {
                return Ok(Vec::new());
            }
            if !regenerate_route(ctx, train_id)? {
                warn!("cannot start {train_id}: no path found");
                return Ok(Vec::new());
            }
        }

        if !reservation::reserve_leading(ctx.layout, ctx.commands, train_id)? {
            // Track ahead is taken; the train stays where it is until the
            // operator retries or the runtime restarts it.
            return Ok(Vec::new());
        }

        let train = ctx.layout.train_mut(train_id)?;
        train.start_route_index = train.route_step_index;
        train.stop_trigger = StopTrigger::None;
        let kph = if train.requested_kph > 0 {
            train.requested_kph
        } else {
            ctx.config.speed.default_running_kph
        };
        ctx.command_speed(train_id, kph)?;

        let mut events = Vec::new();
        events.extend(ctx.set_train_state(train_id, TrainState::Running)?);
        Ok(events)
    }
}

// ============================================================================
// MoveWithinBlock
// ============================================================================

/// Advances a train's position when one of its own block's feedbacks fires.
/// Shared between the automatic and manual pipelines.
pub struct MoveWithinBlock;

impl TrainHandler for MoveWithinBlock {
    fn name(&self) -> &'static str {
        "move-within-block"
    }

    fn wants(&self, event: &TrainEvent) -> bool {
        matches!(event, TrainEvent::FeedbackTriggered { .. })
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train_id: &TrainId,
        event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        let TrainEvent::FeedbackTriggered { feedback } = event else {
            return Ok(Vec::new());
        };
        let train = ctx.layout.train(train_id)?;
        let Some(block_id) = train.block.clone() else {
            return Ok(Vec::new());
        };
        let current = train.position;
        let block = ctx.layout.block(&block_id)?;
        let Some(index) = block.feedback_index(feedback) else {
            return Ok(Vec::new());
        };
        let Some(direction) = block
            .occupancy
            .as_ref()
            .filter(|instance| &instance.train == train_id)
            .map(|instance| instance.direction)
        else {
            return Ok(Vec::new());
        };

        let count = block.feedbacks.len();
        match new_position(current, index, direction, ctx.config.strict_feedback, count) {
            Some(position) => {
                ctx.layout.train_mut(train_id)?.position = position;
                Ok(vec![TrainEvent::MovedInsideBlock {
                    train: train_id.clone(),
                }])
            }
            None => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// MoveToNextBlock
// ============================================================================

/// Detects a train crossing into the next block of its route: the first
/// feedback on the arrival side of the next block fired.
pub struct MoveToNextBlock;

impl TrainHandler for MoveToNextBlock {
    fn name(&self) -> &'static str {
        "move-to-next-block"
    }

    fn wants(&self, event: &TrainEvent) -> bool {
        matches!(event, TrainEvent::FeedbackTriggered { .. })
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train_id: &TrainId,
        event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        let TrainEvent::FeedbackTriggered { feedback } = event else {
            return Ok(Vec::new());
        };
        let train = ctx.layout.train(train_id)?;
        if train.state == TrainState::Stopped {
            return Ok(Vec::new());
        }
        let Some(block_id) = train.block.clone() else {
            return Ok(Vec::new());
        };
        let Some(route_id) = train.route.clone() else {
            return Ok(Vec::new());
        };
        let step_index = train.route_step_index;
        let route = ctx.layout.route(&route_id)?;
        let Some(next_step) = route.step(step_index + 1) else {
            return Ok(Vec::new());
        };
        let next_block_id = next_step.block.clone();

        let direction = occupancy_direction(ctx, train_id)?;
        let chain = graph::chain_between(ctx.layout, &block_id, direction, &next_block_id)?;
        let arrival = chain.arrival_direction(ctx.layout)?;

        let next_block = ctx.layout.block(&next_block_id)?;
        if next_block.entry_feedback(arrival) != Some(feedback) {
            return Ok(Vec::new());
        }

        // The train is physically entering the next block. It must hold the
        // reservation; if it does not, reality wins but the breach is
        // recorded.
        let reserved_for_us = next_block
            .reservation
            .as_ref()
            .is_some_and(|r| &r.train == train_id);
        if !reserved_for_us {
            error!("{train_id} entered {next_block_id} without holding its reservation");
        }
        let entry_position = next_block.entry_position(arrival);

        // The block left behind and its junction plumbing become trailing.
        let mut trailing_tail = vec![TrailingStep::Block {
            id: block_id.clone(),
            direction,
        }];
        for link in &chain.links {
            trailing_tail.push(match link {
                ChainLink::Transition(id) => TrailingStep::Transition(id.clone()),
                ChainLink::Turnout { id, .. } => TrailingStep::Turnout(id.clone()),
            });
        }

        ctx.layout
            .set_train_to_block(train_id, &next_block_id, entry_position, arrival)?;
        if let Some(reservation) = ctx.layout.block_mut(&next_block_id)?.reservation.as_mut() {
            reservation.leading = false;
        }
        let train = ctx.layout.train_mut(train_id)?;
        train.route_step_index += 1;
        train.trailing.extend(trailing_tail);

        reservation::free_trailing(ctx.layout, train_id)?;

        Ok(vec![TrainEvent::MovedToNextBlock {
            train: train_id.clone(),
        }])
    }
}

// ============================================================================
// DetectStop
// ============================================================================

/// Decides whether entering a block means the train should stop there:
/// route end, destination reached, or a station on an endless run.
pub struct DetectStop;

impl TrainHandler for DetectStop {
    fn name(&self) -> &'static str {
        "detect-stop"
    }

    fn wants(&self, event: &TrainEvent) -> bool {
        matches!(event, TrainEvent::MovedToNextBlock { .. })
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train_id: &TrainId,
        _event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        let train = ctx.layout.train(train_id)?;
        let Some(route_id) = train.route.clone() else {
            return Ok(Vec::new());
        };
        let Some(block_id) = train.block.clone() else {
            return Ok(Vec::new());
        };
        let step_index = train.route_step_index;
        let start_index = train.start_route_index;
        let scheduling = train.scheduling;
        let route = ctx.layout.route(&route_id)?;
        let at_last_step = route.last_step_index() == Some(step_index);
        let mode = route.mode.clone();

        let trigger = match mode {
            RouteMode::AutomaticOnce(destination) => {
                if !at_last_step {
                    return Ok(Vec::new());
                }
                let arrival = occupancy_direction(ctx, train_id)?;
                if destination.block != block_id
                    || destination.direction.is_some_and(|d| d != arrival)
                {
                    return Err(LayoutError::DestinationMismatch {
                        train: train_id.clone(),
                        expected: destination.block,
                        actual: block_id,
                        actual_direction: Some(arrival),
                    });
                }
                StopTrigger::StopCompletely
            }
            RouteMode::Automatic => {
                match station_stop(ctx, train_id, &block_id, step_index, start_index, scheduling)?
                {
                    Some(trigger) => trigger,
                    None => return Ok(Vec::new()),
                }
            }
            RouteMode::Fixed => {
                if at_last_step {
                    StopTrigger::StopCompletely
                } else {
                    match station_stop(
                        ctx,
                        train_id,
                        &block_id,
                        step_index,
                        start_index,
                        scheduling,
                    )? {
                        Some(trigger) => trigger,
                        None => return Ok(Vec::new()),
                    }
                }
            }
        };

        ctx.layout.train_mut(train_id)?.stop_trigger = trigger;
        Ok(vec![TrainEvent::StopRequested {
            train: train_id.clone(),
        }])
    }
}

/// Station-stop decision for a mid-route block: stop when the block is a
/// station and the train has left its start block.
fn station_stop(
    ctx: &HandlerContext<'_>,
    train_id: &TrainId,
    block_id: &crate::layout::BlockId,
    step_index: usize,
    start_index: usize,
    scheduling: Scheduling,
) -> Result<Option<StopTrigger>, LayoutError> {
    if !ctx.layout.block(block_id)?.is_station() || step_index == start_index {
        return Ok(None);
    }
    if scheduling == Scheduling::AutomaticFinishing {
        Ok(Some(StopTrigger::StopCompletely))
    } else {
        Ok(Some(StopTrigger::StopAndRestart {
            delay_ms: waiting_time_ms(ctx, train_id)?,
        }))
    }
}

// ============================================================================
// ExecuteStopInBlock
// ============================================================================

/// Carries out a pending stop: brakes at the block's brake feedback, stops
/// at its stop feedback, then arms the restart timer or drops to manual.
pub struct ExecuteStopInBlock;

impl TrainHandler for ExecuteStopInBlock {
    fn name(&self) -> &'static str {
        "execute-stop"
    }

    fn wants(&self, event: &TrainEvent) -> bool {
        matches!(event, TrainEvent::FeedbackTriggered { .. })
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train_id: &TrainId,
        event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        let TrainEvent::FeedbackTriggered { feedback } = event else {
            return Ok(Vec::new());
        };
        let train = ctx.layout.train(train_id)?;
        if !train.has_pending_stop() {
            return Ok(Vec::new());
        }
        let Some(block_id) = train.block.clone() else {
            return Ok(Vec::new());
        };
        let direction = occupancy_direction(ctx, train_id)?;
        let mut events = Vec::new();

        let block = ctx.layout.block(&block_id)?;
        if ctx.layout.train(train_id)?.state == TrainState::Running
            && block.brake_feedback(direction) == Some(feedback)
        {
            ctx.command_speed(train_id, ctx.config.speed.braking_kph)?;
            events.extend(ctx.set_train_state(train_id, TrainState::Braking)?);
        }

        // Stopping straight from `running` is allowed: in a short block the
        // entry feedback doubles as the brake feedback and fires before the
        // stop was pending.
        let block = ctx.layout.block(&block_id)?;
        if matches!(
            ctx.layout.train(train_id)?.state,
            TrainState::Running | TrainState::Braking
        ) && block.stop_feedback(direction) == Some(feedback)
        {
            ctx.command_speed(train_id, 0)?;
            let trigger = ctx.layout.train(train_id)?.stop_trigger;
            match trigger {
                StopTrigger::StopAndRestart { delay_ms } => {
                    ctx.timers.arm.push((train_id.clone(), delay_ms));
                    ctx.layout.train_mut(train_id)?.stop_trigger = StopTrigger::None;
                }
                StopTrigger::StopCompletely => {
                    ctx.layout.train_mut(train_id)?.stop_trigger = StopTrigger::None;
                    ctx.timers.cancel.push(train_id.clone());
                    let train = ctx.layout.train_mut(train_id)?;
                    if train.scheduling != Scheduling::Manual {
                        train.scheduling = Scheduling::Manual;
                        events.push(TrainEvent::SchedulingChanged {
                            train: train_id.clone(),
                        });
                    }
                }
                // A temporary stop keeps its trigger; the runtime restarts
                // the train once the track ahead frees up.
                StopTrigger::StopTemporarily => {}
                StopTrigger::None => {}
            }
            events.extend(ctx.set_train_state(train_id, TrainState::Stopped)?);
        }

        Ok(events)
    }
}

// ============================================================================
// ReserveLeadingBlocks
// ============================================================================

/// Keeps the leading reservation window filled while the train runs. When
/// the track ahead is taken, tries a route regeneration around the
/// conflict; failing that, stops the train temporarily.
pub struct ReserveLeadingBlocks;

impl TrainHandler for ReserveLeadingBlocks {
    fn name(&self) -> &'static str {
        "reserve-leading"
    }

    fn wants(&self, event: &TrainEvent) -> bool {
        matches!(
            event,
            TrainEvent::MovedToNextBlock { .. } | TrainEvent::MovedInsideBlock { .. }
        )
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train_id: &TrainId,
        _event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        let train = ctx.layout.train(train_id)?;
        if train.has_pending_stop() || train.state == TrainState::Stopped {
            return Ok(Vec::new());
        }

        if reservation::reserve_leading(ctx.layout, ctx.commands, train_id)? {
            return Ok(Vec::new());
        }

        if regenerate_route(ctx, train_id)?
            && reservation::reserve_leading(ctx.layout, ctx.commands, train_id)?
        {
            return Ok(Vec::new());
        }

        ctx.layout.train_mut(train_id)?.stop_trigger = StopTrigger::StopTemporarily;
        Ok(vec![TrainEvent::StopRequested {
            train: train_id.clone(),
        }])
    }
}

// ============================================================================
// SpeedLimit
// ============================================================================

/// Caps the commanded speed while the train holds a branching turnout.
pub struct SpeedLimit;

impl TrainHandler for SpeedLimit {
    fn name(&self) -> &'static str {
        "speed-limit"
    }

    fn wants(&self, event: &TrainEvent) -> bool {
        matches!(event, TrainEvent::StateChanged { .. })
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train_id: &TrainId,
        _event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        let train = ctx.layout.train(train_id)?;
        if train.state != TrainState::Running {
            return Ok(Vec::new());
        }
        let requested = train.requested_kph;
        let limit = ctx.config.speed.turnout_branch_kph;

        let crossing_branch = ctx.layout.turnouts().iter().any(|turnout| {
            turnout.reservation.as_ref() == Some(train_id)
                && matches!(
                    turnout.state,
                    TurnoutState::BranchLeft
                        | TurnoutState::BranchRight
                        | TurnoutState::Branch
                        | TurnoutState::Branch03
                        | TurnoutState::Branch21
                )
        });
        if crossing_branch && requested > limit {
            ctx.command_speed(train_id, limit)?;
        }
        Ok(Vec::new())
    }
}

// ============================================================================
// StopPushingWagons
// ============================================================================

/// Safety interlock for a locomotive pushing its wagons: when the block
/// ahead cannot be determined, come to a complete stop before the end of
/// the current block.
pub struct StopPushingWagons;

impl TrainHandler for StopPushingWagons {
    fn name(&self) -> &'static str {
        "stop-pushing-wagons"
    }

    fn wants(&self, event: &TrainEvent) -> bool {
        matches!(event, TrainEvent::MovedToNextBlock { .. })
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train_id: &TrainId,
        _event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        let train = ctx.layout.train(train_id)?;
        if train.body_direction != BodyDirection::Backward {
            return Ok(Vec::new());
        }
        let Some(route_id) = train.route.clone() else {
            return Ok(Vec::new());
        };
        let next_known = ctx
            .layout
            .route(&route_id)?
            .step(train.route_step_index + 1)
            .is_some();
        if next_known {
            return Ok(Vec::new());
        }

        let train = ctx.layout.train_mut(train_id)?;
        if train.stop_trigger == StopTrigger::StopCompletely {
            return Ok(Vec::new());
        }
        train.stop_trigger = StopTrigger::StopCompletely;
        Ok(vec![TrainEvent::StopRequested {
            train: train_id.clone(),
        }])
    }
}
