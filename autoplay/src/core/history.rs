//! In-memory session history: move counter, score, and the two ordered streams.

use chrono::{DateTime, Utc};

use crate::core::observation::extract_score;
use crate::core::types::{PlanningEntry, StateEntry};

/// Mutable state of one session.
///
/// `move_number` only moves forward, by exactly one per recorded action.
/// `score` holds the last successfully extracted value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    move_number: u32,
    score: i64,
    history: Vec<StateEntry>,
    planning: Vec<PlanningEntry>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_number(&self) -> u32 {
        self.move_number
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn history(&self) -> &[StateEntry] {
        &self.history
    }

    pub fn planning(&self) -> &[PlanningEntry] {
        &self.planning
    }

    /// Append an observation entry, updating the score when `text` carries one.
    pub fn record_observation(&mut self, text: String, at: DateTime<Utc>) -> &StateEntry {
        if let Some(score) = extract_score(&text) {
            self.score = score;
        }
        self.push(StateEntry {
            move_number: self.move_number,
            game_state: Some(text),
            action: None,
            score: self.score,
            timestamp: at,
            planning: None,
        })
    }

    /// Append a planning entry for the consultation at the current move.
    pub fn record_plan(&mut self, game_state: &str, planning_text: &str, at: DateTime<Utc>) {
        self.planning.push(PlanningEntry {
            move_number: self.move_number,
            timestamp: at,
            game_state: game_state.to_string(),
            planning_text: planning_text.to_string(),
            score: self.score,
        });
    }

    /// Advance the move counter and append the action entry.
    pub fn record_action(
        &mut self,
        action: &str,
        planning: Option<&str>,
        at: DateTime<Utc>,
    ) -> &StateEntry {
        self.move_number += 1;
        self.push(StateEntry {
            move_number: self.move_number,
            game_state: None,
            action: Some(action.to_string()),
            score: self.score,
            timestamp: at,
            planning: planning
                .filter(|text| !text.is_empty())
                .map(str::to_string),
        })
    }

    /// Action entries, oldest first.
    pub fn action_entries(&self) -> impl Iterator<Item = &StateEntry> {
        self.history.iter().filter(|entry| entry.is_action())
    }

    /// The last `window` action entries, oldest first.
    pub fn recent_actions(&self, window: usize) -> Vec<&StateEntry> {
        let mut recent: Vec<&StateEntry> = self
            .history
            .iter()
            .rev()
            .filter(|entry| entry.is_action())
            .take(window)
            .collect();
        recent.reverse();
        recent
    }

    fn push(&mut self, entry: StateEntry) -> &StateEntry {
        self.history.push(entry);
        &self.history[self.history.len() - 1]
    }
}
