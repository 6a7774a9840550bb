//! Network services around the layout runtime.
//!
//! The runtime core runs on one dedicated thread (the *runtime task*, see
//! [`runner`]); every other service enqueues messages to it:
//!
//! - `runner`: the runtime task itself plus the cloneable [`RuntimeHandle`]
//! - `web`: Axum-based HTTP API exposing the operator commands
//! - `api`: request/response types shared by the HTTP surface
//!
//! # Wiring
//!
//! ```ignore
//! use railyard::services::{runner, web};
//!
//! let (handle, join) = runner::spawn(runtime, SystemClock::new());
//! web::run_server(handle.clone(), WebServerConfig::on_port(8080)).await?;
//! ```

pub mod api;
pub mod runner;
pub mod web;

pub use api::{ApiResponse, RuntimeSnapshot, TrainSummary};
pub use runner::{RuntimeHandle, RuntimeMessage};
pub use web::{build_router, run_server, WebServerConfig};
