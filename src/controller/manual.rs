//! Manual handlers: tracking an operator-driven train.
//!
//! Manual operation has no route and no reservations; the runtime only
//! follows the train across the layout (using the turnouts' current
//! positions to know where the track leads) and stops it when it runs out
//! of track.

use crate::controller::{automatic::MoveWithinBlock, HandlerContext, TrainEvent, TrainHandler};
use crate::errors::LayoutError;
use crate::graph;
use crate::layout::{TrainId, TrainState};

/// The manual pipeline, in execution order.
pub fn pipeline() -> Vec<Box<dyn TrainHandler>> {
    vec![
        Box::new(MoveWithinBlock),
        Box::new(ManualMoveToNextBlock),
        Box::new(StopTriggerDetection),
    ]
}

// ============================================================================
// ManualMoveToNextBlock
// ============================================================================

/// Follows a manually driven train into the next block: whatever block the
/// current turnout positions lead to, entered through its first feedback.
pub struct ManualMoveToNextBlock;

impl TrainHandler for ManualMoveToNextBlock {
    fn name(&self) -> &'static str {
        "manual-move-to-next-block"
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
        if train.state == TrainState::Stopped && train.requested_kph == 0 {
            // A parked train does not move; the detection belongs to
            // someone else.
            return Ok(Vec::new());
        }
        let Some(block_id) = train.block.clone() else {
            return Ok(Vec::new());
        };
        let block = ctx.layout.block(&block_id)?;
        let Some(direction) = block
            .occupancy
            .as_ref()
            .filter(|instance| &instance.train == train_id)
            .map(|instance| instance.direction)
        else {
            return Ok(Vec::new());
        };

        let Some((next_block_id, arrival)) =
            graph::next_block_following_turnouts(ctx.layout, &block_id, direction)?
        else {
            return Ok(Vec::new());
        };
        let next_block = ctx.layout.block(&next_block_id)?;
        if next_block.entry_feedback(arrival) != Some(feedback) {
            return Ok(Vec::new());
        }
        if next_block
            .occupancy
            .as_ref()
            .is_some_and(|instance| &instance.train != train_id)
        {
            // Someone else is in there; this detection is not our train.
            return Ok(Vec::new());
        }
        let entry_position = next_block.entry_position(arrival);

        ctx.layout
            .set_train_to_block(train_id, &next_block_id, entry_position, arrival)?;
        Ok(vec![TrainEvent::MovedToNextBlock {
            train: train_id.clone(),
        }])
    }
}

// ============================================================================
// StopTriggerDetection
// ============================================================================

/// Stops a manually driven train when it enters a block with no track
/// beyond it (a dead end, or a turnout set against it).
pub struct StopTriggerDetection;

impl TrainHandler for StopTriggerDetection {
    fn name(&self) -> &'static str {
        "stop-trigger-detection"
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
        if train.state == TrainState::Stopped {
            return Ok(Vec::new());
        }
        let Some(block_id) = train.block.clone() else {
            return Ok(Vec::new());
        };
        let block = ctx.layout.block(&block_id)?;
        let Some(direction) = block
            .occupancy
            .as_ref()
            .map(|instance| instance.direction)
        else {
            return Ok(Vec::new());
        };

        if graph::next_block_following_turnouts(ctx.layout, &block_id, direction)?.is_some() {
            return Ok(Vec::new());
        }

        log::warn!("{train_id} reached end of track in {block_id}, stopping");
        ctx.command_speed(train_id, 0)?;
        let mut events = Vec::new();
        events.extend(ctx.set_train_state(train_id, TrainState::Stopped)?);
        Ok(events)
    }
}
