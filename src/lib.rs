//! # railyard
//!
//! A model railway layout runtime: drives one or more trains around a
//! shared track layout, responding to occupancy sensors, commanding
//! turnouts and locomotive speeds, and preventing collisions.
//!
//! ## Features
//!
//! - **Topology model**: blocks, turnouts, feedback sensors and the
//!   transitions joining their sockets into a directed graph
//! - **Path finder**: depth-first search with backtracking, reservation
//!   policies and a randomization knob for diversified automatic routes
//! - **Reservation engine**: atomic all-or-nothing claims on the track
//!   ahead of each train, with turnouts set as part of the claim
//! - **Train controller**: event-driven handler pipelines for automatic
//!   (route-driven) and manual operation
//! - **Hardware abstraction**: the control bus is a trait; a Marklin
//!   CS2/CS3 TCP binding ships behind the `marklin` feature and a mock
//!   bus makes everything testable on the desktop
//!
//! ## Architecture
//!
//! The crate is structured so the whole runtime can be driven without
//! hardware:
//!
//! - `layout` - the owning registry of all track elements and trains
//! - `graph` - socket and transition queries over the topology
//! - `pathfinder` - route search
//! - `reservation` - exclusive claims on track elements
//! - `controller` - per-train event handlers
//! - `runtime` - the outer event loop, timers and operator commands
//! - `diagnostics` - layout inspector and repair
//! - `document` - JSON persistence (requires `serde`, on by default)
//! - `traits` / `hal` - bus abstraction, Marklin binding, mocks
//! - `services` - axum operator API and service runner (requires `web`)
//!
//! ## Example
//!
//! ```rust
//! use railyard::config::RuntimeConfig;
//! use railyard::hal::MockBus;
//! use railyard::layout::{
//!     Block, BlockCategory, DecoderFamily, Direction, Layout, Route, RouteMode, RouteStep,
//!     Train,
//! };
//! use railyard::runtime::LayoutRuntime;
//!
//! // A two-block layout with one train.
//! let mut layout = Layout::new();
//! layout.add_block(Block::new("s1", "Station", BlockCategory::Station));
//! layout.add_block(Block::new("b1", "Main", BlockCategory::Free));
//! layout.add_train(Train::new("local", "Local", 3, DecoderFamily::Mm));
//! layout.add_route(Route::new(
//!     "r1",
//!     RouteMode::Fixed,
//!     vec![RouteStep::new("s1", Direction::Next)],
//! ));
//!
//! let mut runtime = LayoutRuntime::new(layout, MockBus::new(), RuntimeConfig::default());
//!
//! // The operator asserts where the train physically is.
//! runtime
//!     .place_train(&"local".into(), &"s1".into(), 0, Direction::Next)
//!     .unwrap();
//! ```

#![warn(missing_docs)]

/// Command and event types for the control bus.
pub mod commands;
/// Runtime configuration with builder-style setters.
pub mod config;
/// Train controller: events, dispatch and handler pipelines.
pub mod controller;
/// Layout inspector and repair.
pub mod diagnostics;
/// JSON document persistence.
#[cfg(feature = "serde")]
pub mod document;
/// Error types.
pub mod errors;
/// Queries over the topology graph.
pub mod graph;
/// Concrete bus implementations (mock for testing, Marklin over TCP).
pub mod hal;
/// Topology model and registries.
pub mod layout;
/// Depth-first path finder.
pub mod pathfinder;
/// Reservation engine.
pub mod reservation;
/// The outer event loop.
pub mod runtime;
/// Control-bus and clock abstractions.
pub mod traits;

/// Operator API and service runner (feature-gated).
#[cfg(feature = "web")]
pub mod services;

// Re-exports for convenience
pub use commands::{BusCommand, BusEvent};
pub use config::{PathSettings, RuntimeConfig, SpeedProfile};
pub use controller::{TrainController, TrainEvent};
pub use errors::LayoutError;
pub use layout::{Direction, Layout};
pub use pathfinder::{PathConstraints, PathFinder, ReservedBlockBehavior};
pub use runtime::{DiscoveryPolicy, LayoutRuntime};
pub use traits::{Clock, CommandInterface};

#[cfg(feature = "serde")]
pub use document::LayoutDocument;
