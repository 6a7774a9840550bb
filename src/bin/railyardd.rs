//! Layout runtime service: loads a layout document, connects to the
//! central station and serves the operator API.
//!
//! ```text
//! railyardd <layout.json> [station-host:port] [api-port]
//! ```

use std::process::ExitCode;

use railyard::config::RuntimeConfig;
use railyard::document::LayoutDocument;
use railyard::hal::{MarklinBus, SystemClock};
use railyard::runtime::LayoutRuntime;
use railyard::services::{runner, web, WebServerConfig};
use railyard::traits::CommandInterface;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(document_path) = args.next() else {
        eprintln!("usage: railyardd <layout.json> [station-host:port] [api-port]");
        return ExitCode::FAILURE;
    };
    let station_addr = args.next().unwrap_or_else(|| "192.168.140.1:15731".into());
    let api_port: u16 = match args.next().as_deref().unwrap_or("8080").parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("invalid api port");
            return ExitCode::FAILURE;
        }
    };

    let json = match std::fs::read_to_string(&document_path) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("cannot read {document_path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let layout = match LayoutDocument::from_json(&json) {
        Ok(document) => document.into_layout(),
        Err(err) => {
            eprintln!("cannot parse {document_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut bus = MarklinBus::new(station_addr.clone());
    if let Err(err) = bus.connect() {
        eprintln!("cannot connect to station at {station_addr}: {err}");
        return ExitCode::FAILURE;
    }

    let mut runtime = LayoutRuntime::new(layout, bus, RuntimeConfig::default());
    runtime.power_on();

    let (handle, join) = runner::spawn(runtime, SystemClock::new());
    let result = web::run_server(handle.clone(), WebServerConfig::on_port(api_port)).await;

    handle.send(railyard::services::RuntimeMessage::Shutdown);
    let _ = join.join();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("server failed: {err}");
            ExitCode::FAILURE
        }
    }
}
