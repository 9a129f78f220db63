//! One session: the interpreter child, its output queue, and the history.
//!
//! A [`Session`] is the explicit context every turn operation runs against.
//! It moves through `NotStarted → Running → Finalizing → Done`; finalization
//! tears the child down and writes the end-of-session exports.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::action::extract_action;
use crate::core::history::SessionState;
use crate::core::observation::{extract_score, join_lines};
use crate::core::types::{Plan, SessionPhase};
use crate::io::config::{AutoplayConfig, InterpreterConfig};
use crate::io::drain::{collect_window, spawn_drain};
use crate::io::exports::HistorySink;
use crate::io::oracle::Oracle;
use crate::io::process::Supervisor;
use crate::io::prompt::{PromptSet, TurnContext};

/// Per-session knobs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub interpreter: InterpreterConfig,
    pub capture_timeout: Duration,
    pub startup_delay: Duration,
    pub history_window: usize,
}

impl SessionSettings {
    pub fn from_config(cfg: &AutoplayConfig) -> Self {
        Self {
            interpreter: cfg.interpreter.clone(),
            capture_timeout: cfg.capture_timeout(),
            startup_delay: cfg.startup_delay(),
            history_window: cfg.history_window,
        }
    }
}

/// What a finished session leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub final_score: i64,
    pub moves: u32,
    pub history_path: Option<PathBuf>,
    pub planning_log_path: Option<PathBuf>,
    pub performance_path: Option<PathBuf>,
}

/// Short random session identifier (8 hex characters).
pub fn new_session_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

pub struct Session<S: HistorySink> {
    id: String,
    settings: SessionSettings,
    phase: SessionPhase,
    supervisor: Supervisor,
    output: Option<Receiver<String>>,
    drain: Option<JoinHandle<()>>,
    state: SessionState,
    sink: S,
    summary: Option<SessionSummary>,
}

impl<S: HistorySink> Session<S> {
    pub fn new(id: impl Into<String>, settings: SessionSettings, sink: S) -> Self {
        Self {
            id: id.into(),
            settings,
            phase: SessionPhase::NotStarted,
            supervisor: Supervisor::idle(),
            output: None,
            drain: None,
            state: SessionState::new(),
            sink,
            summary: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Spawn the interpreter and its output drain.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub fn start(&mut self) -> Result<()> {
        if self.phase != SessionPhase::NotStarted {
            bail!("session {} already started", self.id);
        }
        let (supervisor, reader) = Supervisor::start(&self.settings.interpreter)?;
        self.supervisor = supervisor;
        let (output, drain) = spawn_drain(reader)?;
        self.output = Some(output);
        self.drain = Some(drain);
        self.phase = SessionPhase::Running;
        info!("session started");

        if !self.settings.startup_delay.is_zero() {
            thread::sleep(self.settings.startup_delay);
        }
        Ok(())
    }

    /// Collect one aggregation window of output into an observation entry.
    #[instrument(skip_all, fields(session_id = %self.id, move_number = self.state.move_number()))]
    pub fn capture(&mut self) -> Result<String> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| anyhow!("session {} not started", self.id))?;
        let lines = collect_window(output, self.settings.capture_timeout);
        let text = join_lines(&lines);
        if extract_score(&text).is_none() {
            debug!("no score in snapshot, keeping {}", self.state.score());
        }
        debug!(lines = lines.len(), "captured output");

        self.state.record_observation(text.clone(), Utc::now());
        self.sink.write_history(self.state.history())?;
        Ok(text)
    }

    /// Ask the oracle for the next move given `state_text`.
    #[instrument(skip_all, fields(session_id = %self.id, move_number = self.state.move_number()))]
    pub fn plan<O: Oracle>(
        &mut self,
        oracle: &O,
        prompts: &PromptSet,
        state_text: &str,
    ) -> Result<Plan> {
        let messages = {
            let recent = self.state.recent_actions(self.settings.history_window);
            prompts.messages(&TurnContext {
                state: state_text,
                score: self.state.score(),
                move_number: self.state.move_number(),
                recent_actions: &recent,
            })?
        };
        let reply = oracle.complete(&messages)?;
        let planning_text = reply.trim().to_string();
        let action = extract_action(&planning_text);
        debug!(action = %action, "oracle chose action");

        self.state.record_plan(state_text, &planning_text, Utc::now());
        Ok(Plan {
            planning_text,
            action,
        })
    }

    /// Record `action` and send it to the interpreter.
    ///
    /// Rejected once finalization has begun, so the exports stay in agreement.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub fn dispatch(&mut self, action: &str, planning_text: Option<&str>) -> Result<()> {
        if matches!(self.phase, SessionPhase::Finalizing | SessionPhase::Done) {
            bail!("session {} is finalized; not dispatching {action:?}", self.id);
        }
        self.state.record_action(action, planning_text, Utc::now());
        self.sink.write_history(self.state.history())?;
        self.supervisor.send_line(action)?;
        info!(move_number = self.state.move_number(), action, "dispatched action");
        Ok(())
    }

    /// Stop the child and write the end-of-session exports.
    ///
    /// Runs from any phase; later calls return the first summary.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub fn finalize(&mut self) -> Result<SessionSummary> {
        if let Some(summary) = &self.summary {
            return Ok(summary.clone());
        }
        self.phase = SessionPhase::Finalizing;
        self.supervisor.terminate();
        self.output = None;
        if let Some(drain) = self.drain.take() {
            if drain.is_finished() {
                if drain.join().is_err() {
                    warn!("output drain panicked");
                }
            } else {
                debug!("leaving output drain to finish on its own");
            }
        }

        let planning = self.sink.write_planning_log(self.state.planning());
        let performance = self.sink.write_performance(self.state.history());
        self.phase = SessionPhase::Done;

        let summary = SessionSummary {
            session_id: self.id.clone(),
            final_score: self.state.score(),
            moves: self.state.move_number(),
            history_path: if self.state.history().is_empty() {
                None
            } else {
                self.sink.history_location()
            },
            planning_log_path: planning?,
            performance_path: performance?,
        };
        info!(
            final_score = summary.final_score,
            moves = summary.moves,
            "session finalized"
        );
        self.summary = Some(summary.clone());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::test_support::{FakeGame, MemorySink, ScriptedOracle, fast_settings};

    fn memory_session(id: &str, game: &FakeGame) -> Session<MemorySink> {
        Session::new(id, fast_settings(game.interpreter()), MemorySink::default())
    }

    #[test]
    fn session_ids_are_short_hex() {
        let id = new_session_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_session_id());
    }

    #[test]
    fn capture_records_banner_and_score() {
        let game = FakeGame::new().expect("fake game");
        let mut session = memory_session("t1", &game);
        session.start().expect("start");
        assert_eq!(session.phase(), SessionPhase::Running);

        let text = session.capture().expect("capture");
        assert!(text.starts_with("West of House"));
        assert!(text.contains("Score: 0 Moves: 0"));
        assert_eq!(session.sink().history_writes, 1);
        assert_eq!(session.state().history().len(), 1);

        session.finalize().expect("finalize");
    }

    #[test]
    fn dispatch_advances_move_and_feeds_interpreter() {
        let game = FakeGame::new().expect("fake game");
        let mut session = memory_session("t2", &game);
        session.start().expect("start");
        session.capture().expect("banner");

        session.dispatch("open mailbox", Some("ACTION: open mailbox")).expect("dispatch");
        assert_eq!(session.state().move_number(), 1);
        assert_eq!(session.sink().history_writes, 2);

        let text = session.capture().expect("capture");
        assert!(text.contains("> open mailbox"));
        assert_eq!(session.state().score(), 5);

        // Observations in between do not move the counter.
        session.capture().expect("quiet capture");
        assert_eq!(session.state().move_number(), 1);
        assert_eq!(session.state().score(), 5);

        let summary = session.finalize().expect("finalize");
        assert_eq!(summary.moves, 1);
        assert_eq!(summary.final_score, 5);
    }

    #[test]
    fn plan_builds_context_and_records_planning_entry() {
        let game = FakeGame::new().expect("fake game");
        let mut session = memory_session("t3", &game);
        let oracle = ScriptedOracle::new(vec!["Looks like a house.\nACTION: open mailbox\n"]);
        let prompts = PromptSet::with_system("rules");

        let plan = session
            .plan(&oracle, &prompts, "West of House Score: 0")
            .expect("plan");
        assert_eq!(plan.action, "open mailbox");
        assert_eq!(plan.planning_text, "Looks like a house.\nACTION: open mailbox");

        let calls = oracle.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].content, "rules");
        assert!(calls[0][1].content.contains("West of House Score: 0"));

        let planning = session.state().planning();
        assert_eq!(planning.len(), 1);
        assert_eq!(planning[0].planning_text, plan.planning_text);
        assert_eq!(planning[0].move_number, 0);
    }

    #[test]
    fn dispatch_without_child_is_child_unavailable() {
        let game = FakeGame::new().expect("fake game");
        let mut session = memory_session("t4", &game);

        let err = session.dispatch("look", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::ChildUnavailable { .. })
        ));
        // The entry and its flush happen before the write.
        assert_eq!(session.state().move_number(), 1);
        assert_eq!(session.sink().history_writes, 1);
    }

    #[test]
    fn dispatch_after_finalize_is_rejected() {
        let game = FakeGame::new().expect("fake game");
        let mut session = memory_session("t8", &game);
        session.start().expect("start");
        session.capture().expect("banner");
        session.dispatch("look", None).expect("dispatch");
        session.finalize().expect("finalize");
        let writes = session.sink().history_writes;

        let err = session.dispatch("north", None).unwrap_err();
        assert!(err.to_string().contains("finalized"));
        assert_eq!(session.state().move_number(), 1);
        assert_eq!(session.state().action_entries().count(), 1);
        assert_eq!(session.sink().history_writes, writes);
        assert_eq!(session.phase(), SessionPhase::Done);
    }

    #[test]
    fn capture_before_start_is_an_error() {
        let game = FakeGame::new().expect("fake game");
        let mut session = memory_session("t5", &game);
        assert!(session.capture().is_err());
    }

    #[test]
    fn finalize_is_idempotent_and_runs_without_start() {
        let game = FakeGame::new().expect("fake game");
        let mut session = memory_session("t6", &game);

        let first = session.finalize().expect("finalize");
        let second = session.finalize().expect("finalize again");
        assert_eq!(first, second);
        assert_eq!(session.phase(), SessionPhase::Done);
        assert_eq!(session.sink().planning_log, Some(Vec::new()));
        assert_eq!(session.sink().performance_rows, Some(0));
        assert_eq!(first.history_path, None);
    }

    #[test]
    fn start_twice_is_rejected() {
        let game = FakeGame::new().expect("fake game");
        let mut session = memory_session("t7", &game);
        session.start().expect("start");
        assert!(session.start().is_err());
        session.finalize().expect("finalize");
    }
}
