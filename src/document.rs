//! Layout document: JSON persistence for the whole model.
//!
//! One human-readable file captures every element of the layout (blocks,
//! turnouts, feedbacks, transitions, trains and routes) plus two opaque
//! sections this runtime does not interpret: `display` (switchboard
//! geometry for an editor) and `scripts`. Both are carried through
//! untouched so a round trip is lossless for tools that do use them.
//!
//! Runtime state in a loaded document is not trusted: reservations,
//! occupancies, detected flags and speeds are cleared by
//! [`LayoutDocument::into_layout`], and the operator re-asserts train
//! positions (see the startup notes on
//! [`LayoutRuntime`](crate::runtime::LayoutRuntime)).
//!
//! # Example
//!
//! ```rust
//! use railyard::document::LayoutDocument;
//! use railyard::layout::{Block, BlockCategory, Layout};
//!
//! let mut layout = Layout::new();
//! layout.add_block(Block::new("b1", "Main", BlockCategory::Free));
//!
//! let json = LayoutDocument::from_layout(&layout).to_json().unwrap();
//! let restored = LayoutDocument::from_json(&json).unwrap().into_layout();
//! assert_eq!(restored.blocks().len(), 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::layout::{Block, Feedback, Layout, Route, Train, Transition, Turnout};

/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 1;

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// The persisted form of a layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDocument {
    /// Format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Layout name shown to the operator.
    #[serde(default)]
    pub name: String,
    /// All blocks.
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// All turnouts.
    #[serde(default)]
    pub turnouts: Vec<Turnout>,
    /// All feedback sensors.
    #[serde(default)]
    pub feedbacks: Vec<Feedback>,
    /// All transitions.
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// All trains.
    #[serde(default)]
    pub trains: Vec<Train>,
    /// All routes.
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Switchboard geometry, owned by the editor. Opaque here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<serde_json::Value>,
    /// Script collection, owned by the sequencer. Opaque here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<serde_json::Value>,
}

impl LayoutDocument {
    /// Captures the current layout into a document.
    pub fn from_layout(layout: &Layout) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            name: String::new(),
            blocks: layout.blocks().to_vec(),
            turnouts: layout.turnouts().to_vec(),
            feedbacks: layout.feedbacks().to_vec(),
            transitions: layout.transitions().to_vec(),
            trains: layout.trains().to_vec(),
            routes: layout.routes().to_vec(),
            display: None,
            scripts: None,
        }
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Builds the runtime layout.
    ///
    /// All runtime state in the document is discarded: reservations and
    /// occupancies are cleared, feedbacks reset to undetected, and train
    /// speeds reset to 0. Persisted positions are not trusted across a
    /// restart.
    pub fn into_layout(self) -> Layout {
        let mut layout = Layout::new();
        for block in self.blocks {
            layout.add_block(block);
        }
        for turnout in self.turnouts {
            layout.add_turnout(turnout);
        }
        for feedback in self.feedbacks {
            layout.add_feedback(feedback);
        }
        for transition in self.transitions {
            layout.add_transition(transition);
        }
        for train in self.trains {
            layout.add_train(train);
        }
        for route in self.routes {
            layout.add_route(route);
        }
        layout.clear_runtime_state();
        layout
    }
}
