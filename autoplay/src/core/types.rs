//! Shared record types for session history.
//!
//! These are the shapes written to the durable exports, so field order and
//! optional-field handling must stay stable across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the ordered session history.
///
/// Observation entries carry `game_state` and no `action`; action entries
/// carry `action` (and `planning` when the oracle produced it). Both kinds
/// share one ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub move_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub score: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning: Option<String>,
}

impl StateEntry {
    /// Whether this entry records a dispatched action.
    pub fn is_action(&self) -> bool {
        self.action.is_some()
    }
}

/// One oracle consultation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningEntry {
    pub move_number: u32,
    pub timestamp: DateTime<Utc>,
    pub game_state: String,
    pub planning_text: String,
    pub score: i64,
}

/// Parsed oracle reply: the full planning text and the single action token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub planning_text: String,
    pub action: String,
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NotStarted,
    Running,
    Finalizing,
    Done,
}
