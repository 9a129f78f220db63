//! `autoplay` CLI: play an interactive fiction game with an oracle choosing each move.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use autoplay::error::SessionError;
use autoplay::exit_codes;
use autoplay::io::config::{AutoplayConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use autoplay::io::exports::{FileSink, load_history};
use autoplay::io::oracle::AnyOracle;
use autoplay::io::prompt::PromptSet;
use autoplay::logging;
use autoplay::looping::{LoopLimits, LoopStop, TurnEvent, play};
use autoplay::session::{Session, SessionSettings, SessionSummary, new_session_id};

#[derive(Parser)]
#[command(
    name = "autoplay",
    version,
    about = "Play an interactive fiction game with an oracle choosing each move"
)]
struct Cli {
    /// Log session progress to stderr (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Config file to create.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run one session until the oracle quits or the move cap is reached.
    Play {
        /// Config file (defaults apply when it does not exist).
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Override `max_moves`.
        #[arg(long)]
        max_moves: Option<u32>,
        /// Override `output_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Override `interpreter.program`.
        #[arg(long)]
        interpreter: Option<PathBuf>,
        /// Override `interpreter.game_file`.
        #[arg(long)]
        game: Option<PathBuf>,
    },
    /// Print the action entries of a history export.
    History {
        /// Path to a `game_history_<id>.json` file.
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Play {
            config,
            max_moves,
            output_dir,
            interpreter,
            game,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(max_moves) = max_moves {
                cfg.max_moves = max_moves;
            }
            if let Some(output_dir) = output_dir {
                cfg.output_dir = output_dir;
            }
            if let Some(program) = interpreter {
                cfg.interpreter.program = program;
            }
            if let Some(game) = game {
                cfg.interpreter.game_file = game;
            }
            cfg.validate()?;
            cmd_play(&cfg)
        }
        Command::History { path } => cmd_history(&path),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &AutoplayConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_play(cfg: &AutoplayConfig) -> Result<i32> {
    let prompts = PromptSet::load(cfg.prompt.system_path.as_deref())?;
    let oracle = AnyOracle::from_config(&cfg.oracle)?;
    let session_id = new_session_id();
    let sink = FileSink::new(&cfg.output_dir, &session_id, cfg.planning_note_limit)?;
    let mut session = Session::new(session_id, SessionSettings::from_config(cfg), sink);
    println!("Session {}", session.id());

    let outcome = play(
        &mut session,
        &oracle,
        &prompts,
        &LoopLimits::from_config(cfg),
        print_event,
    )?;
    match outcome.stop {
        LoopStop::OracleQuit { action } => println!("Oracle ended the session ({action})."),
        LoopStop::MoveCap { max_moves } => println!("Reached the move cap ({max_moves})."),
    }
    Ok(exit_codes::OK)
}

fn print_event(event: TurnEvent<'_>) {
    match event {
        TurnEvent::Observed { text, .. } => println!("{text}"),
        TurnEvent::Planned { planning_text, .. } => {
            println!("\n=== STRATEGIC PLANNING ===");
            println!("{planning_text}");
            println!("========================\n");
        }
        TurnEvent::Dispatched {
            move_number,
            action,
        } => println!("\nExecuting action {move_number}: {action}"),
        TurnEvent::Finalized(summary) => print_summary(summary),
    }
}

fn print_summary(summary: &SessionSummary) {
    println!();
    if let Some(path) = &summary.history_path {
        println!("Game history saved to: {}", path.display());
    }
    if let Some(path) = &summary.performance_path {
        println!("Game performance saved to: {}", path.display());
    }
    if let Some(path) = &summary.planning_log_path {
        println!("Planning log saved to: {}", path.display());
    }
    println!("Final score: {}", summary.final_score);
    println!("Total moves: {}", summary.moves);
}

fn cmd_history(path: &Path) -> Result<i32> {
    let history = load_history(path)?;
    for entry in history.iter().filter(|entry| entry.is_action()) {
        println!(
            "Move {}: {} (Score: {})",
            entry.move_number,
            entry.action.as_deref().unwrap_or_default(),
            entry.score
        );
    }
    Ok(exit_codes::OK)
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SessionError>() {
        Some(SessionError::MissingArtifact { .. }) => exit_codes::MISSING_ARTIFACT,
        Some(SessionError::ChildUnavailable { .. }) => exit_codes::CHILD_UNAVAILABLE,
        None => exit_codes::INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["autoplay", "init"]);
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Command::Init { force: false, .. }));
    }

    #[test]
    fn parse_play_overrides() {
        let cli = Cli::parse_from([
            "autoplay",
            "play",
            "-v",
            "--max-moves",
            "3",
            "--game",
            "zork2.z5",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Play {
                config,
                max_moves,
                game,
                ..
            } => {
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_FILE));
                assert_eq!(max_moves, Some(3));
                assert_eq!(game, Some(PathBuf::from("zork2.z5")));
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn session_errors_map_to_exit_codes() {
        let missing = anyhow::Error::from(SessionError::MissingArtifact {
            kind: autoplay::error::ArtifactKind::GameFile,
            path: PathBuf::from("zork1.z5"),
        });
        assert_eq!(exit_code_for(&missing), exit_codes::MISSING_ARTIFACT);

        let gone = anyhow::Error::from(SessionError::child_unavailable("exited"))
            .context("dispatch");
        assert_eq!(exit_code_for(&gone), exit_codes::CHILD_UNAVAILABLE);

        let other = anyhow::anyhow!("bad config");
        assert_eq!(exit_code_for(&other), exit_codes::INVALID);
    }
}
