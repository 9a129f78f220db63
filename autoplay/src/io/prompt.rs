//! Oracle context rendering.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::StateEntry;
use crate::io::oracle::ChatMessage;

const DEFAULT_SYSTEM_PROMPT: &str = include_str!("prompts/system.md");
const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");

/// One line of the recent-moves summary.
#[derive(Debug, Clone, Serialize)]
struct HistoryLine<'a> {
    move_number: u32,
    action: &'a str,
    score: i64,
}

/// Inputs for one oracle consultation.
#[derive(Debug, Clone)]
pub struct TurnContext<'a> {
    pub state: &'a str,
    pub score: i64,
    pub move_number: u32,
    /// Recent action entries, oldest first.
    pub recent_actions: &'a [&'a StateEntry],
}

/// System instructions plus the per-turn template.
pub struct PromptSet {
    system: String,
    env: Environment<'static>,
}

impl PromptSet {
    /// Built-in system prompt, or the contents of `system_path` when given.
    pub fn load(system_path: Option<&Path>) -> Result<Self> {
        let system = match system_path {
            Some(path) => {
                debug!(path = %path.display(), "loading system prompt");
                fs::read_to_string(path)
                    .with_context(|| format!("read system prompt {}", path.display()))?
            }
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };
        Ok(Self::with_system(system))
    }

    pub fn with_system(system: impl Into<String>) -> Self {
        let mut env = Environment::new();
        env.add_template("turn", TURN_TEMPLATE)
            .expect("turn template should be valid");
        Self {
            system: system.into(),
            env,
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    /// Render the user-level message for one turn.
    pub fn render_turn(&self, turn: &TurnContext<'_>) -> Result<String> {
        let history: Vec<HistoryLine<'_>> = turn
            .recent_actions
            .iter()
            .filter_map(|entry| {
                entry.action.as_deref().map(|action| HistoryLine {
                    move_number: entry.move_number,
                    action,
                    score: entry.score,
                })
            })
            .collect();
        let template = self.env.get_template("turn")?;
        let rendered = template
            .render(context! {
                state => turn.state.trim(),
                score => turn.score,
                moves => turn.move_number,
                history => history,
            })
            .context("render turn prompt")?;
        Ok(rendered)
    }

    /// The full role-tagged message sequence for one turn.
    pub fn messages(&self, turn: &TurnContext<'_>) -> Result<Vec<ChatMessage>> {
        Ok(vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.render_turn(turn)?),
        ])
    }
}
