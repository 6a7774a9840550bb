//! Train controller: event-driven handlers that move a train through its
//! route.
//!
//! Each train has a [`TrainController`] that processes [`TrainEvent`]s
//! against the layout. Two handler pipelines exist: the *automatic*
//! pipeline drives the train along its route (starting, tracking movement,
//! reserving ahead, braking into stops), the *manual* pipeline only tracks
//! an operator-driven train and protects it at the end of the track.
//! Handlers never call each other; they return follow-on events that the
//! layout runtime requeues until the queue drains.
//!
//! Handlers run in a fixed order within a pipeline. The order matters: stop
//! detection runs before leading reservation so a train that just reached
//! its final block does not request more track.

pub mod automatic;
pub mod manual;
mod position;

pub use position::new_position;

use crate::commands::{speed_to_step, BusCommand};
use crate::config::RuntimeConfig;
use crate::errors::LayoutError;
use crate::layout::{FeedbackId, Layout, TrainId, TrainState};

// ============================================================================
// Events
// ============================================================================

/// An event processed by the train controllers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrainEvent {
    /// A feedback contact became detected.
    FeedbackTriggered {
        /// The feedback that fired.
        feedback: FeedbackId,
    },
    /// A train's position within its block advanced.
    MovedInsideBlock {
        /// The train that moved.
        train: TrainId,
    },
    /// A train entered a new block.
    MovedToNextBlock {
        /// The train that moved.
        train: TrainId,
    },
    /// A scheduled station-restart timer elapsed.
    RestartTimerFired {
        /// The train whose timer fired.
        train: TrainId,
    },
    /// The operator changed a train's scheduling.
    SchedulingChanged {
        /// The train affected.
        train: TrainId,
    },
    /// A train's motion state changed.
    StateChanged {
        /// The train affected.
        train: TrainId,
    },
    /// A handler requested a stop.
    StopRequested {
        /// The train to stop.
        train: TrainId,
    },
}

impl TrainEvent {
    /// Whether this event is relevant to the given train. Feedback events
    /// concern every train; all others name their train.
    pub fn concerns(&self, train: &TrainId) -> bool {
        match self {
            TrainEvent::FeedbackTriggered { .. } => true,
            TrainEvent::MovedInsideBlock { train: t }
            | TrainEvent::MovedToNextBlock { train: t }
            | TrainEvent::RestartTimerFired { train: t }
            | TrainEvent::SchedulingChanged { train: t }
            | TrainEvent::StateChanged { train: t }
            | TrainEvent::StopRequested { train: t } => t == train,
        }
    }
}

// ============================================================================
// Timer requests
// ============================================================================

/// Restart-timer operations collected during a handler run.
///
/// Handlers never block; they record arm/cancel requests here and the
/// runtime's timer registry applies them after the dispatch.
#[derive(Debug, Default)]
pub struct TimerOps {
    /// Trains with a restart timer currently pending (set by the runtime
    /// before dispatch).
    pub active: Vec<TrainId>,
    /// Timers to arm: train and delay in milliseconds.
    pub arm: Vec<(TrainId, u64)>,
    /// Timers to cancel.
    pub cancel: Vec<TrainId>,
}

impl TimerOps {
    /// Whether a timer is pending (or was just armed) for the train.
    pub fn is_active(&self, train: &TrainId) -> bool {
        self.active.iter().any(|t| t == train) || self.arm.iter().any(|(t, _)| t == train)
    }
}

// ============================================================================
// Handler context
// ============================================================================

/// Mutable state a handler operates on.
///
/// Commands pushed here are sent to the bus by the runtime after the
/// handler returns; the model is updated immediately and never rolled back
/// on bus errors.
pub struct HandlerContext<'a> {
    /// The layout.
    pub layout: &'a mut Layout,
    /// Runtime configuration.
    pub config: &'a RuntimeConfig,
    /// Outgoing bus commands.
    pub commands: &'a mut Vec<BusCommand>,
    /// Restart-timer requests.
    pub timers: &'a mut TimerOps,
}

impl HandlerContext<'_> {
    /// Commands a train speed (clamped to the train maximum) and records it
    /// as the requested speed.
    pub fn command_speed(&mut self, train_id: &TrainId, kph: u16) -> Result<(), LayoutError> {
        let train = self.layout.train_mut(train_id)?;
        let kph = kph.min(train.max_kph);
        train.requested_kph = kph;
        let step = speed_to_step(kph, train.max_kph);
        self.commands.push(BusCommand::SetSpeed {
            address: train.address,
            decoder: train.decoder,
            step,
        });
        Ok(())
    }

    /// Sets a train's motion state, returning the `StateChanged` follow-on
    /// event when it actually changed.
    pub fn set_train_state(
        &mut self,
        train_id: &TrainId,
        state: TrainState,
    ) -> Result<Option<TrainEvent>, LayoutError> {
        let train = self.layout.train_mut(train_id)?;
        if train.state == state {
            return Ok(None);
        }
        train.state = state;
        Ok(Some(TrainEvent::StateChanged {
            train: train_id.clone(),
        }))
    }
}

// ============================================================================
// Handler trait and controller
// ============================================================================

/// One step of a handler pipeline.
pub trait TrainHandler: Send {
    /// Handler name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the handler processes this event kind.
    fn wants(&self, event: &TrainEvent) -> bool;

    /// Processes the event for the given train, returning follow-on events.
    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        train: &TrainId,
        event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError>;
}

/// The per-train handler pipelines.
pub struct TrainController {
    train: TrainId,
    automatic: Vec<Box<dyn TrainHandler>>,
    manual: Vec<Box<dyn TrainHandler>>,
}

impl TrainController {
    /// Creates the controller for a train with the standard pipelines.
    pub fn new(train: TrainId) -> Self {
        Self {
            train,
            automatic: automatic::pipeline(),
            manual: manual::pipeline(),
        }
    }

    /// The train this controller drives.
    pub fn train(&self) -> &TrainId {
        &self.train
    }

    /// Runs every interested handler of the active pipeline over the event,
    /// collecting follow-on events.
    ///
    /// The pipeline is selected by the train's current scheduling: automatic
    /// handlers drive scheduled trains, manual handlers track everything
    /// else.
    pub fn process(
        &self,
        ctx: &mut HandlerContext<'_>,
        event: &TrainEvent,
    ) -> Result<Vec<TrainEvent>, LayoutError> {
        if !event.concerns(&self.train) {
            return Ok(Vec::new());
        }
        let scheduling = ctx.layout.train(&self.train)?.scheduling;
        let pipeline = if scheduling.is_automatic() {
            &self.automatic
        } else {
            &self.manual
        };

        let mut follow_on = Vec::new();
        for handler in pipeline {
            if handler.wants(event) {
                log::trace!("{}: {} <- {event:?}", self.train, handler.name());
                follow_on.extend(handler.handle(ctx, &self.train, event)?);
            }
        }
        Ok(follow_on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_events_concern_every_train() {
        let event = TrainEvent::FeedbackTriggered {
            feedback: FeedbackId::new("f1"),
        };
        assert!(event.concerns(&TrainId::new("a")));
        assert!(event.concerns(&TrainId::new("b")));
    }

    #[test]
    fn train_events_concern_their_train_only() {
        let event = TrainEvent::MovedToNextBlock {
            train: TrainId::new("a"),
        };
        assert!(event.concerns(&TrainId::new("a")));
        assert!(!event.concerns(&TrainId::new("b")));
    }

    #[test]
    fn timer_ops_track_armed_timers() {
        let mut timers = TimerOps::default();
        assert!(!timers.is_active(&TrainId::new("a")));
        timers.arm.push((TrainId::new("a"), 1000));
        assert!(timers.is_active(&TrainId::new("a")));
        timers.active.push(TrainId::new("b"));
        assert!(timers.is_active(&TrainId::new("b")));
    }
}
