//! Layout runtime: the outer event loop.
//!
//! [`LayoutRuntime`] owns the layout, the per-train controllers, the
//! restart-timer registry and the connection to the control bus. External
//! inputs (bus traffic, timer expiry, operator commands) are translated
//! into [`TrainEvent`]s and dispatched: every controller processes the
//! event, follow-on events are requeued, and the loop runs until the queue
//! drains. All of this happens on one logical task; concurrent sources
//! enqueue messages and the service runner feeds them here one at a time.
//!
//! Time is explicit: [`advance_to`](LayoutRuntime::advance_to) is called
//! with the current monotonic milliseconds (from a [`Clock`]) and fires any
//! due restart timers, which keeps every time-dependent path testable.
//!
//! A handler failure stops the offending train and is recorded; other
//! trains keep running.
//!
//! [`Clock`]: crate::traits::Clock

use std::collections::VecDeque;

use log::{error, info, warn};

use crate::commands::{step_to_speed, BusCommand, BusEvent};
use crate::config::RuntimeConfig;
use crate::controller::{HandlerContext, TimerOps, TrainController, TrainEvent};
use crate::diagnostics::{self, LayoutIssue};
use crate::errors::LayoutError;
use crate::layout::{
    BlockId, BlockReservation, Destination, Direction, Layout, RouteId, RouteMode, Scheduling,
    StopTrigger, Train, TrainId, TrainState,
};
use crate::traits::CommandInterface;

/// Policy for merging discovered locomotives into the layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryPolicy {
    /// Add locomotives with unknown addresses, keep everything else.
    Merge,
    /// Drop the existing train list and rebuild it from discovery.
    Replace,
}

#[derive(Debug)]
struct RestartTimer {
    train: TrainId,
    deadline_ms: u64,
}

/// Observer callback, invoked synchronously after each processed event.
pub type EventObserver = Box<dyn FnMut(&TrainEvent) + Send>;

/// The layout controller: event fan-out, timers, operator commands.
pub struct LayoutRuntime<B: CommandInterface> {
    layout: Layout,
    bus: B,
    config: RuntimeConfig,
    controllers: Vec<TrainController>,
    timers: Vec<RestartTimer>,
    observers: Vec<EventObserver>,
    discovery: Option<DiscoveryPolicy>,
    now_ms: u64,
}

impl<B: CommandInterface> LayoutRuntime<B> {
    /// Creates a runtime over a layout and a bus connection.
    pub fn new(layout: Layout, bus: B, config: RuntimeConfig) -> Self {
        let controllers = layout
            .trains()
            .iter()
            .map(|train| TrainController::new(train.id.clone()))
            .collect();
        Self {
            layout,
            bus,
            config,
            controllers,
            timers: Vec::new(),
            observers: Vec::new(),
            discovery: None,
            now_ms: 0,
        }
    }

    /// Read access to the layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The bus connection (mainly for mock inspection in tests).
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable bus access (queueing mock events, reconnecting).
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Registers an observer invoked after every processed event.
    pub fn subscribe(&mut self, observer: EventObserver) {
        self.observers.push(observer);
    }

    /// Replaces the layout (document import). Runtime state in the incoming
    /// layout is cleared; positions are re-asserted by the operator.
    pub fn replace_layout(&mut self, mut layout: Layout) {
        layout.clear_runtime_state();
        self.timers.clear();
        self.controllers = layout
            .trains()
            .iter()
            .map(|train| TrainController::new(train.id.clone()))
            .collect();
        self.layout = layout;
        info!("layout replaced; operator must re-assert train positions");
    }

    // ------------------------------------------------------------------
    // External inputs
    // ------------------------------------------------------------------

    /// Drains all pending bus events and processes them in receipt order.
    pub fn poll_bus(&mut self) -> Result<(), LayoutError> {
        while let Some(event) = self.bus.try_recv() {
            self.process_bus_event(event)?;
        }
        Ok(())
    }

    /// Processes one bus event.
    pub fn process_bus_event(&mut self, event: BusEvent) -> Result<(), LayoutError> {
        match event {
            BusEvent::Feedback { address, detected } => {
                let Some(feedback) = self.layout.feedback_by_address_mut(address) else {
                    warn!("feedback report for unknown address {address}");
                    return Ok(());
                };
                let rising = detected && !feedback.detected;
                feedback.detected = detected;
                if rising {
                    let id = feedback.id.clone();
                    self.dispatch(TrainEvent::FeedbackTriggered { feedback: id })?;
                }
            }
            BusEvent::SpeedAck { address, step } => {
                let Some(train) = self.layout.train_by_address(address) else {
                    return Ok(());
                };
                let train_id = train.id.clone();
                let max_kph = train.max_kph;
                let train = self.layout.train_mut(&train_id)?;
                train.speed_kph = step_to_speed(step, max_kph);
                if step == 0 && train.state == TrainState::Stopping {
                    train.state = TrainState::Stopped;
                    self.dispatch(TrainEvent::StateChanged { train: train_id })?;
                }
            }
            BusEvent::DirectionChanged { address, direction } => {
                if let Some(train) = self.layout.train_by_address(address) {
                    let train_id = train.id.clone();
                    self.layout.train_mut(&train_id)?.body_direction = direction;
                }
            }
            BusEvent::Power(on) => {
                info!("track power {}", if on { "on" } else { "off" });
            }
            BusEvent::LocomotiveDiscovered {
                name,
                address,
                decoder,
            } => {
                if self.discovery.is_some() {
                    self.register_discovered(name, address, decoder);
                }
            }
        }
        self.try_restart_waiting_trains()
    }

    /// Advances the runtime clock, firing restart timers that came due and
    /// retrying temporarily stopped trains.
    pub fn advance_to(&mut self, now_ms: u64) -> Result<(), LayoutError> {
        self.now_ms = self.now_ms.max(now_ms);
        loop {
            let due = self
                .timers
                .iter()
                .position(|timer| timer.deadline_ms <= self.now_ms);
            let Some(index) = due else {
                break;
            };
            let timer = self.timers.remove(index);
            info!("restart timer fired for {}", timer.train);
            self.dispatch(TrainEvent::RestartTimerFired { train: timer.train })?;
        }
        self.try_restart_waiting_trains()
    }

    // ------------------------------------------------------------------
    // Operator commands
    // ------------------------------------------------------------------

    /// Places a train on a block (operator-asserted position) and reserves
    /// the block under it.
    pub fn place_train(
        &mut self,
        train_id: &TrainId,
        block_id: &BlockId,
        position: usize,
        direction: Direction,
    ) -> Result<(), LayoutError> {
        self.layout
            .set_train_to_block(train_id, block_id, position, direction)?;
        self.layout.block_mut(block_id)?.reservation = Some(BlockReservation {
            train: train_id.clone(),
            direction,
            leading: false,
        });
        Ok(())
    }

    /// Starts a train on a route. With a destination the route becomes
    /// `automaticOnce` towards it; automatic routes are (re)generated from
    /// the train's current block by the start handler.
    pub fn start(
        &mut self,
        train_id: &TrainId,
        route_id: &RouteId,
        destination: Option<Destination>,
    ) -> Result<(), LayoutError> {
        let train = self.layout.train(train_id)?;
        let block_id = train
            .block
            .clone()
            .ok_or_else(|| LayoutError::TrainNotPositioned(train_id.clone()))?;

        if let Some(destination) = destination {
            let route = self.layout.route_mut(route_id)?;
            if !route.is_automatic() {
                // Fixed routes are operator-authored and never rewritten.
                return Err(LayoutError::InvariantViolation(format!(
                    "route {route_id} is fixed, cannot retarget it to {}",
                    destination.block
                )));
            }
            route.mode = RouteMode::AutomaticOnce(destination);
            route.steps.clear();
        }

        let route = self.layout.route(route_id)?;
        let step_index = if route.is_automatic() {
            0
        } else {
            let occupancy_direction = self
                .layout
                .block(&block_id)?
                .occupancy
                .as_ref()
                .map(|instance| instance.direction);
            route
                .steps
                .iter()
                .position(|step| {
                    step.block == block_id
                        && occupancy_direction.map(|d| d == step.direction).unwrap_or(true)
                })
                .ok_or_else(|| {
                    LayoutError::InvariantViolation(format!(
                        "train {train_id} is not on route {route_id} (block {block_id})"
                    ))
                })?
        };

        // The block under the train belongs to it for the whole run.
        let direction = self
            .layout
            .block(&block_id)?
            .occupancy
            .as_ref()
            .map(|instance| instance.direction)
            .unwrap_or(Direction::Next);
        self.layout.block_mut(&block_id)?.reservation = Some(BlockReservation {
            train: train_id.clone(),
            direction,
            leading: false,
        });

        let train = self.layout.train_mut(train_id)?;
        train.route = Some(route_id.clone());
        train.route_step_index = step_index;
        train.start_route_index = step_index;
        train.scheduling = Scheduling::AutomaticRunning;
        info!("starting {train_id} on route {route_id}");
        self.dispatch(TrainEvent::SchedulingChanged {
            train: train_id.clone(),
        })
    }

    /// Stops a train.
    ///
    /// With `completely` the stop is immediate: speed 0 now, pending restart
    /// timer cancelled, scheduling back to manual. Otherwise a
    /// `stopCompletely` trigger is armed and the train brakes into the next
    /// stop feedback. Both forms are idempotent.
    pub fn stop(&mut self, train_id: &TrainId, completely: bool) -> Result<(), LayoutError> {
        let train = self.layout.train(train_id)?;
        if completely {
            self.timers.retain(|timer| &timer.train != train_id);
            let already_stopped = train.state == TrainState::Stopped && train.requested_kph == 0;

            let mut events = Vec::new();
            {
                let train = self.layout.train_mut(train_id)?;
                train.stop_trigger = StopTrigger::None;
                if train.scheduling != Scheduling::Manual {
                    train.scheduling = Scheduling::Manual;
                    events.push(TrainEvent::SchedulingChanged {
                        train: train_id.clone(),
                    });
                }
            }
            if !already_stopped {
                let train = self.layout.train_mut(train_id)?;
                train.requested_kph = 0;
                train.state = TrainState::Stopping;
                let command = BusCommand::SetSpeed {
                    address: train.address,
                    decoder: train.decoder,
                    step: 0,
                };
                self.send(&command);
                events.push(TrainEvent::StateChanged {
                    train: train_id.clone(),
                });
            }
            for event in events {
                self.dispatch(event)?;
            }
            Ok(())
        } else {
            if train.has_pending_stop() || train.state == TrainState::Stopped {
                return Ok(());
            }
            self.layout.train_mut(train_id)?.stop_trigger = StopTrigger::StopCompletely;
            self.dispatch(TrainEvent::StopRequested {
                train: train_id.clone(),
            })
        }
    }

    /// Lets a train finish its run: it keeps driving and stops for good at
    /// the next station.
    pub fn finish(&mut self, train_id: &TrainId) -> Result<(), LayoutError> {
        let train = self.layout.train_mut(train_id)?;
        if train.scheduling == Scheduling::AutomaticFinishing {
            return Ok(());
        }
        train.scheduling = Scheduling::AutomaticFinishing;
        self.dispatch(TrainEvent::SchedulingChanged {
            train: train_id.clone(),
        })
    }

    /// Releases the reserved chain ahead of a block (operator action, see
    /// [`crate::reservation::free_between`]).
    pub fn free_between(
        &mut self,
        from: &BlockId,
        to_exclusive: &BlockId,
        direction: Direction,
    ) -> Result<(), LayoutError> {
        crate::reservation::free_between(&mut self.layout, from, to_exclusive, direction)?;
        self.try_restart_waiting_trains()
    }

    /// Asks the station for its locomotive list and applies `policy` to the
    /// reports as they come in.
    pub fn discover_locomotives(&mut self, policy: DiscoveryPolicy) {
        if policy == DiscoveryPolicy::Replace {
            self.layout.trains_mut().clear();
            self.controllers.clear();
            self.timers.clear();
            for block in 0..self.layout.blocks().len() {
                let id = self.layout.blocks()[block].id.clone();
                if let Ok(b) = self.layout.block_mut(&id) {
                    b.occupancy = None;
                }
            }
        }
        self.discovery = Some(policy);
        self.send(&BusCommand::QueryLocomotives);
    }

    /// Runs the layout inspector.
    pub fn diagnostics(&self) -> Vec<LayoutIssue> {
        diagnostics::inspect(&self.layout, &diagnostics::InspectionOptions::default())
    }

    /// Removes trivially invalid state from the layout.
    pub fn repair(&mut self) -> usize {
        diagnostics::repair(&mut self.layout)
    }

    /// Turns track power on.
    pub fn power_on(&mut self) {
        self.send(&BusCommand::PowerOn);
    }

    /// Turns track power off.
    pub fn power_off(&mut self) {
        self.send(&BusCommand::PowerOff);
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Dispatches an event through every train controller, requeueing
    /// follow-on events until the queue drains.
    pub fn dispatch(&mut self, seed: TrainEvent) -> Result<(), LayoutError> {
        let mut queue = VecDeque::from([seed]);
        while let Some(event) = queue.pop_front() {
            let mut commands = Vec::new();
            let mut timer_ops = TimerOps {
                active: self.timers.iter().map(|t| t.train.clone()).collect(),
                ..TimerOps::default()
            };

            let mut failed: Vec<TrainId> = Vec::new();
            for controller in &self.controllers {
                let mut ctx = HandlerContext {
                    layout: &mut self.layout,
                    config: &self.config,
                    commands: &mut commands,
                    timers: &mut timer_ops,
                };
                match controller.process(&mut ctx, &event) {
                    Ok(follow_on) => queue.extend(follow_on),
                    Err(err) => {
                        error!("controller of {} failed on {event:?}: {err}", controller.train());
                        failed.push(controller.train().clone());
                    }
                }
            }

            for train_id in failed {
                self.halt_failed_train(&train_id, &mut commands);
                timer_ops.cancel.push(train_id);
            }

            for train_id in timer_ops.cancel.drain(..) {
                self.timers.retain(|timer| timer.train != train_id);
            }
            for (train_id, delay_ms) in timer_ops.arm.drain(..) {
                info!("restart timer armed for {train_id} (+{delay_ms} ms)");
                self.timers.push(RestartTimer {
                    train: train_id,
                    deadline_ms: self.now_ms + delay_ms,
                });
            }

            for command in commands {
                self.send(&command);
            }

            if let Err(err) = self.layout.check_invariants() {
                debug_assert!(false, "invariant violated after {event:?}: {err}");
                error!("invariant violated after {event:?}: {err}");
            }

            for observer in &mut self.observers {
                observer(&event);
            }
        }
        Ok(())
    }

    /// Stops a train whose handler failed; the rest of the layout keeps
    /// running.
    fn halt_failed_train(&mut self, train_id: &TrainId, commands: &mut Vec<BusCommand>) {
        if let Ok(train) = self.layout.train_mut(train_id) {
            train.requested_kph = 0;
            train.state = TrainState::Stopped;
            train.scheduling = Scheduling::Manual;
            train.stop_trigger = StopTrigger::None;
            commands.push(BusCommand::SetSpeed {
                address: train.address,
                decoder: train.decoder,
                step: 0,
            });
        }
    }

    /// Re-dispatches a start for trains that stopped temporarily; when the
    /// track ahead has freed up, the start handler gets them moving again.
    fn try_restart_waiting_trains(&mut self) -> Result<(), LayoutError> {
        let waiting: Vec<TrainId> = self
            .layout
            .trains()
            .iter()
            .filter(|train| {
                train.scheduling.is_automatic()
                    && train.state == TrainState::Stopped
                    && train.stop_trigger == StopTrigger::StopTemporarily
            })
            .map(|train| train.id.clone())
            .collect();
        for train_id in waiting {
            self.layout.train_mut(&train_id)?.stop_trigger = StopTrigger::None;
            self.dispatch(TrainEvent::SchedulingChanged {
                train: train_id.clone(),
            })?;
            let train = self.layout.train_mut(&train_id)?;
            if train.state == TrainState::Stopped {
                // Still blocked; keep waiting.
                train.stop_trigger = StopTrigger::StopTemporarily;
            }
        }
        Ok(())
    }

    fn register_discovered(&mut self, name: String, address: u32, decoder: crate::layout::DecoderFamily) {
        let known = self.layout.train_by_address(address).is_some();
        if known {
            return;
        }
        let id = TrainId::new(format!("loco-{address}"));
        info!("discovered locomotive {name} at address {address}");
        let train = Train::new(id.clone(), name, address, decoder);
        self.layout.add_train(train);
        self.controllers.push(TrainController::new(id));
    }

    fn send(&mut self, command: &BusCommand) {
        if let Err(err) = self.bus.execute(command) {
            // Fire and forget: the model is not rolled back, diagnostics
            // pick up persistent divergence.
            error!("bus send failed for {command:?}: {err:?}");
        }
    }
}
