//! The turn loop: capture → consult oracle → dispatch, until quit or move cap.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use crate::core::action::is_quit_command;
use crate::io::config::AutoplayConfig;
use crate::io::exports::HistorySink;
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptSet;
use crate::session::{Session, SessionSummary};

/// Loop-level limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_moves: u32,
    /// Pause after each dispatch so the interpreter can process the command.
    pub turn_pause: Duration,
}

impl LoopLimits {
    pub fn from_config(cfg: &AutoplayConfig) -> Self {
        Self {
            max_moves: cfg.max_moves,
            turn_pause: cfg.turn_pause(),
        }
    }
}

/// Reason why `play` stopped without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The oracle asked to quit (or exit).
    OracleQuit { action: String },
    /// `max_moves` actions were dispatched.
    MoveCap { max_moves: u32 },
}

/// Summary of a finished `play` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOutcome {
    pub stop: LoopStop,
    pub summary: SessionSummary,
}

/// Progress reported while the loop runs.
#[derive(Debug, Clone, Copy)]
pub enum TurnEvent<'a> {
    Observed { move_number: u32, text: &'a str },
    Planned {
        move_number: u32,
        planning_text: &'a str,
        action: &'a str,
    },
    Dispatched { move_number: u32, action: &'a str },
    Finalized(&'a SessionSummary),
}

/// Run the session until the oracle quits, the move cap is reached, or a
/// component fails.
///
/// Finalization (child teardown, end-of-session exports) always runs. A fatal
/// error is returned after finalization; `Finalized` is still reported when the
/// exports were written.
pub fn play<O, S, F>(
    session: &mut Session<S>,
    oracle: &O,
    prompts: &PromptSet,
    limits: &LoopLimits,
    mut on_event: F,
) -> Result<PlayOutcome>
where
    O: Oracle,
    S: HistorySink,
    F: FnMut(TurnEvent<'_>),
{
    let run = run_turns(session, oracle, prompts, limits, &mut on_event);
    let finalized = session.finalize();
    if let Ok(summary) = &finalized {
        on_event(TurnEvent::Finalized(summary));
    }

    match (run, finalized) {
        (Ok(stop), Ok(summary)) => {
            info!(?stop, "session loop stopped");
            Ok(PlayOutcome { stop, summary })
        }
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(_)) => Err(err),
        (Err(err), Err(export_err)) => {
            error!(err = %format!("{export_err:#}"), "finalization failed after session error");
            Err(err)
        }
    }
}

fn run_turns<O, S, F>(
    session: &mut Session<S>,
    oracle: &O,
    prompts: &PromptSet,
    limits: &LoopLimits,
    on_event: &mut F,
) -> Result<LoopStop>
where
    O: Oracle,
    S: HistorySink,
    F: FnMut(TurnEvent<'_>),
{
    session.start()?;

    while session.state().move_number() < limits.max_moves {
        let move_number = session.state().move_number();
        let text = session.capture()?;
        on_event(TurnEvent::Observed {
            move_number,
            text: &text,
        });

        let plan = session.plan(oracle, prompts, &text)?;
        on_event(TurnEvent::Planned {
            move_number,
            planning_text: &plan.planning_text,
            action: &plan.action,
        });

        if is_quit_command(&plan.action) {
            return Ok(LoopStop::OracleQuit {
                action: plan.action,
            });
        }

        session.dispatch(&plan.action, Some(&plan.planning_text))?;
        on_event(TurnEvent::Dispatched {
            move_number: session.state().move_number(),
            action: &plan.action,
        });

        if !limits.turn_pause.is_zero() {
            thread::sleep(limits.turn_pause);
        }
    }

    Ok(LoopStop::MoveCap {
        max_moves: limits.max_moves,
    })
}
