//! Test-only helpers: scripted oracle, in-memory sink, and a fake interpreter.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{PlanningEntry, StateEntry};
use crate::io::config::InterpreterConfig;
use crate::io::exports::HistorySink;
use crate::io::oracle::{ChatMessage, Oracle};
use crate::session::SessionSettings;

/// POSIX `sh` game: prints a banner, then echoes each command and adds 5 points.
pub const DEFAULT_GAME_SCRIPT: &str = r#"echo "West of House"
echo "You are standing in an open field west of a white house."
echo "Score: 0 Moves: 0"
n=0
while IFS= read -r cmd; do
  n=$((n + 1))
  echo "> $cmd"
  echo "Score: $((n * 5)) Moves: $n"
done
"#;

/// A fake interpreter: `sh` running a script that plays the part of the game file.
pub struct FakeGame {
    // Keeps the script alive for the game's lifetime.
    _dir: TempDir,
    script: PathBuf,
}

impl FakeGame {
    pub fn new() -> Result<Self> {
        Self::with_script(DEFAULT_GAME_SCRIPT)
    }

    pub fn with_script(body: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create fake game dir")?;
        let script = dir.path().join("game.sh");
        fs::write(&script, body).with_context(|| format!("write {}", script.display()))?;
        Ok(Self { _dir: dir, script })
    }

    pub fn interpreter(&self) -> InterpreterConfig {
        InterpreterConfig {
            program: PathBuf::from("sh"),
            args: Vec::new(),
            game_file: self.script.clone(),
        }
    }
}

/// Settings with no startup delay and a short capture window.
pub fn fast_settings(interpreter: InterpreterConfig) -> SessionSettings {
    SessionSettings {
        interpreter,
        capture_timeout: Duration::from_millis(300),
        startup_delay: Duration::ZERO,
        history_window: 30,
    }
}

/// Oracle returning queued replies in order, then `fallback` (or an error).
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<String>>,
    fallback: Option<String>,
    calls: RefCell<Vec<Vec<ChatMessage>>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().map(str::to_string).collect()),
            fallback: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Oracle that always answers `reply`.
    pub fn repeating(reply: &str) -> Self {
        Self {
            fallback: Some(reply.to_string()),
            ..Self::new(Vec::new())
        }
    }

    /// Message sequences received so far, one per call.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.borrow().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.borrow_mut().push(messages.to_vec());
        if let Some(reply) = self.replies.borrow_mut().pop_front() {
            return Ok(reply);
        }
        self.fallback
            .clone()
            .ok_or_else(|| anyhow!("scripted oracle exhausted"))
    }
}

/// Sink that keeps everything in memory and counts history rewrites.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub history_writes: usize,
    pub history: Vec<StateEntry>,
    pub planning_log: Option<Vec<PlanningEntry>>,
    pub performance_rows: Option<usize>,
}

impl HistorySink for MemorySink {
    fn write_history(&mut self, history: &[StateEntry]) -> Result<()> {
        self.history_writes += 1;
        self.history = history.to_vec();
        Ok(())
    }

    fn write_planning_log(&mut self, planning: &[PlanningEntry]) -> Result<Option<PathBuf>> {
        self.planning_log = Some(planning.to_vec());
        Ok(None)
    }

    fn write_performance(&mut self, history: &[StateEntry]) -> Result<Option<PathBuf>> {
        self.performance_rows = Some(history.iter().filter(|entry| entry.is_action()).count());
        Ok(None)
    }
}
