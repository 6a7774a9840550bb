//! API request and response types for the operator HTTP interface.

use serde::{Deserialize, Serialize};

use crate::layout::{
    BlockId, Direction, Layout, Scheduling, Train, TrainState,
};

// ============================================================================
// Response Types
// ============================================================================

/// API response wrapper for consistent JSON structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (present when success=true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present when success=false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// One train in a state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSummary {
    /// Train id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Block the train occupies, if placed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    /// Feedback position within the block.
    pub position: usize,
    /// Scheduling mode.
    pub scheduling: Scheduling,
    /// Motion state.
    pub state: TrainState,
    /// Current speed in km/h.
    pub speed_kph: u16,
    /// Last commanded speed in km/h.
    pub requested_kph: u16,
}

impl From<&Train> for TrainSummary {
    fn from(train: &Train) -> Self {
        Self {
            id: train.id.to_string(),
            name: train.name.clone(),
            block: train.block.as_ref().map(BlockId::to_string),
            position: train.position,
            scheduling: train.scheduling,
            state: train.state,
            speed_kph: train.speed_kph,
            requested_kph: train.requested_kph,
        }
    }
}

/// Snapshot of the runtime state for reads.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeSnapshot {
    /// All trains.
    pub trains: Vec<TrainSummary>,
    /// Blocks currently reserved, as `(block, train)` pairs.
    pub reservations: Vec<(String, String)>,
}

impl RuntimeSnapshot {
    /// Captures a snapshot of the given layout.
    pub fn capture(layout: &Layout) -> Self {
        Self {
            trains: layout.trains().iter().map(TrainSummary::from).collect(),
            reservations: layout
                .blocks()
                .iter()
                .filter_map(|block| {
                    block
                        .reservation
                        .as_ref()
                        .map(|r| (block.id.to_string(), r.train.to_string()))
                })
                .collect(),
        }
    }
}

/// Acknowledgement of an accepted command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// What happened to the command.
    pub result: String,
}

impl CommandResponse {
    /// An accepted command with a short result tag.
    pub fn accepted(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
        }
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Request to start a train on a route.
///
/// # JSON Example
///
/// ```json
/// {"route": "r1", "destination": "s2", "destination_direction": "next"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    /// Route to run.
    pub route: String,
    /// Optional destination block (turns the route into `automaticOnce`).
    #[serde(default)]
    pub destination: Option<String>,
    /// Required arrival direction at the destination.
    #[serde(default)]
    pub destination_direction: Option<Direction>,
}

/// Request to stop a train.
///
/// # JSON Example
///
/// ```json
/// {"completely": true}
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct StopRequest {
    /// Immediate stop (speed 0 now) instead of braking into the next stop
    /// feedback.
    #[serde(default)]
    pub completely: bool,
}

/// Request to place a train on a block (operator-asserted position).
///
/// # JSON Example
///
/// ```json
/// {"block": "s1", "position": 2, "direction": "next"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRequest {
    /// Block to place the train on.
    pub block: String,
    /// Feedback position within the block.
    #[serde(default)]
    pub position: usize,
    /// Travel direction within the block.
    pub direction: Direction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_shapes() {
        let ok: ApiResponse<u32> = ApiResponse::ok(7);
        assert!(ok.success);
        assert_eq!(ok.data, Some(7));

        let err: ApiResponse<u32> = ApiResponse::err("nope");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("nope"));
    }

    #[test]
    fn start_request_parses_with_defaults() {
        let request: StartRequest = serde_json::from_str(r#"{"route": "r1"}"#).unwrap();
        assert_eq!(request.route, "r1");
        assert!(request.destination.is_none());
        assert!(request.destination_direction.is_none());
    }

    #[test]
    fn stop_request_defaults_to_braking_stop() {
        let request: StopRequest = serde_json::from_str("{}").unwrap();
        assert!(!request.completely);
    }

    #[test]
    fn snapshot_captures_trains_and_reservations() {
        use crate::layout::{Block, BlockCategory, BlockReservation, DecoderFamily, TrainId};

        let mut layout = Layout::new();
        layout.add_block(Block::new("b1", "b1", BlockCategory::Free));
        layout.add_train(Train::new("ice", "ICE", 3, DecoderFamily::Mfx));
        layout.block_mut(&BlockId::new("b1")).unwrap().reservation = Some(BlockReservation {
            train: TrainId::new("ice"),
            direction: Direction::Next,
            leading: true,
        });

        let snapshot = RuntimeSnapshot::capture(&layout);
        assert_eq!(snapshot.trains.len(), 1);
        assert_eq!(
            snapshot.reservations,
            vec![("b1".to_string(), "ice".to_string())]
        );
    }
}
