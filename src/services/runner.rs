//! Runtime task runner.
//!
//! The runtime core is single-threaded by design: all layout mutations,
//! reservation decisions and handlers run on one task. This module is that
//! task. External sources (the web API, the bus reader, timers) enqueue
//! [`RuntimeMessage`]s through a cloneable [`RuntimeHandle`]; the runner
//! thread drains the queue FIFO, runs each message's event fan-out to
//! completion, polls the bus and fires due restart timers.
//!
//! Queries (snapshot, diagnostics) carry a reply channel and are answered
//! in queue order, so a read always sees the effects of every earlier
//! message.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::commands::BusEvent;
use crate::diagnostics::InspectionOptions;
use crate::document::LayoutDocument;
use crate::errors::LayoutError;
use crate::layout::{BlockId, Destination, Direction, RouteId, TrainId};
use crate::runtime::{DiscoveryPolicy, LayoutRuntime};
use crate::services::api::RuntimeSnapshot;
use crate::traits::{Clock, CommandInterface};

/// How long the runner sleeps in its queue before a housekeeping pass
/// (bus poll, timer check).
const IDLE_TICK: Duration = Duration::from_millis(20);

/// Timeout for query replies.
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// A message to the runtime task.
pub enum RuntimeMessage {
    /// An event from the control bus (or a simulator).
    Bus(BusEvent),
    /// Operator-asserted train position.
    Place {
        /// Train to place.
        train: TrainId,
        /// Block to place it on.
        block: BlockId,
        /// Feedback position within the block.
        position: usize,
        /// Travel direction within the block.
        direction: Direction,
    },
    /// Start a train on a route.
    Start {
        /// Train to start.
        train: TrainId,
        /// Route to run.
        route: RouteId,
        /// Optional destination (`automaticOnce`).
        destination: Option<Destination>,
    },
    /// Stop a train.
    Stop {
        /// Train to stop.
        train: TrainId,
        /// Immediate stop instead of braking into the next stop feedback.
        completely: bool,
    },
    /// Let a train finish at the next station.
    Finish {
        /// Train to finish.
        train: TrainId,
    },
    /// Enumerate the station's locomotives.
    Discover(DiscoveryPolicy),
    /// Replace the layout from a document.
    Import(Box<LayoutDocument>),
    /// Snapshot of trains and reservations.
    Snapshot(mpsc::Sender<RuntimeSnapshot>),
    /// Run the layout inspector.
    Diagnostics(mpsc::Sender<Vec<String>>),
    /// Repair trivially invalid state; replies with the repair count.
    Repair(mpsc::Sender<usize>),
    /// Stop the runner thread.
    Shutdown,
}

/// Cloneable sender half of the runtime task queue.
#[derive(Clone)]
pub struct RuntimeHandle {
    sender: mpsc::Sender<RuntimeMessage>,
}

impl RuntimeHandle {
    /// Enqueues a message. Returns false when the runner is gone.
    pub fn send(&self, message: RuntimeMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Requests a state snapshot.
    pub fn snapshot(&self) -> Option<RuntimeSnapshot> {
        let (tx, rx) = mpsc::channel();
        self.send(RuntimeMessage::Snapshot(tx));
        rx.recv_timeout(REPLY_TIMEOUT).ok()
    }

    /// Runs the inspector and returns display strings of the findings.
    pub fn diagnostics(&self) -> Option<Vec<String>> {
        let (tx, rx) = mpsc::channel();
        self.send(RuntimeMessage::Diagnostics(tx));
        rx.recv_timeout(REPLY_TIMEOUT).ok()
    }

    /// Repairs the layout, returning the number of repairs.
    pub fn repair(&self) -> Option<usize> {
        let (tx, rx) = mpsc::channel();
        self.send(RuntimeMessage::Repair(tx));
        rx.recv_timeout(REPLY_TIMEOUT).ok()
    }
}

/// Spawns the runtime task.
///
/// The runner owns the runtime; everything else talks to it through the
/// returned handle. The thread exits on [`RuntimeMessage::Shutdown`] or
/// when every handle is dropped.
pub fn spawn<B, C>(
    mut runtime: LayoutRuntime<B>,
    clock: C,
) -> (RuntimeHandle, thread::JoinHandle<()>)
where
    B: CommandInterface + Send + 'static,
    C: Clock + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let handle = RuntimeHandle { sender };

    let join = thread::spawn(move || {
        info!("runtime task started");
        loop {
            match receiver.recv_timeout(IDLE_TICK) {
                Ok(RuntimeMessage::Shutdown) => break,
                Ok(message) => {
                    if let Err(err) = apply(&mut runtime, message) {
                        error!("runtime message failed: {err}");
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if let Err(err) = runtime.poll_bus() {
                error!("bus poll failed: {err}");
            }
            if let Err(err) = runtime.advance_to(clock.now_ms()) {
                error!("timer pass failed: {err}");
            }
        }
        info!("runtime task stopped");
    });

    (handle, join)
}

fn apply<B: CommandInterface>(
    runtime: &mut LayoutRuntime<B>,
    message: RuntimeMessage,
) -> Result<(), LayoutError> {
    match message {
        RuntimeMessage::Bus(event) => runtime.process_bus_event(event),
        RuntimeMessage::Place {
            train,
            block,
            position,
            direction,
        } => runtime.place_train(&train, &block, position, direction),
        RuntimeMessage::Start {
            train,
            route,
            destination,
        } => runtime.start(&train, &route, destination),
        RuntimeMessage::Stop { train, completely } => runtime.stop(&train, completely),
        RuntimeMessage::Finish { train } => runtime.finish(&train),
        RuntimeMessage::Discover(policy) => {
            runtime.discover_locomotives(policy);
            Ok(())
        }
        RuntimeMessage::Import(document) => {
            runtime.replace_layout(document.into_layout());
            Ok(())
        }
        RuntimeMessage::Snapshot(reply) => {
            let _ = reply.send(RuntimeSnapshot::capture(runtime.layout()));
            Ok(())
        }
        RuntimeMessage::Diagnostics(reply) => {
            let issues = crate::diagnostics::inspect(
                runtime.layout(),
                &InspectionOptions::default(),
            );
            let _ = reply.send(issues.iter().map(|issue| issue.to_string()).collect());
            Ok(())
        }
        RuntimeMessage::Repair(reply) => {
            let _ = reply.send(runtime.repair());
            Ok(())
        }
        RuntimeMessage::Shutdown => Ok(()),
    }
}
