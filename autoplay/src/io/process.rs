//! Child process management: the long-lived interpreter and one-shot commands.

use std::io::{self, PipeReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::{ArtifactKind, SessionError};
use crate::io::config::InterpreterConfig;

/// Interpreter and game file, both confirmed to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub program: PathBuf,
    pub game_file: PathBuf,
}

/// Locate the interpreter (as a path, then on `PATH`) and the game file.
///
/// The returned program path is absolute, so spawning runs the exact file
/// that was checked rather than a `PATH` lookup of the same name.
pub fn resolve_artifacts(cfg: &InterpreterConfig) -> Result<Artifacts> {
    let cwd = std::env::current_dir().context("read working directory")?;
    let program = match local_program(&cfg.program, &cwd) {
        Some(program) => program,
        None => which::which(&cfg.program).map_err(|_| SessionError::MissingArtifact {
            kind: ArtifactKind::Interpreter,
            path: cfg.program.clone(),
        })?,
    };
    if !cfg.game_file.is_file() {
        return Err(SessionError::MissingArtifact {
            kind: ArtifactKind::GameFile,
            path: cfg.game_file.clone(),
        }
        .into());
    }
    Ok(Artifacts {
        program,
        game_file: cfg.game_file.clone(),
    })
}

/// `program` resolved against `base` when it names an existing file there.
fn local_program(program: &Path, base: &Path) -> Option<PathBuf> {
    let candidate = base.join(program);
    candidate.is_file().then_some(candidate)
}

/// Owns the interpreter child and its input pipe.
///
/// Dropping the supervisor terminates the child.
#[derive(Debug, Default)]
pub struct Supervisor {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl Supervisor {
    /// Supervisor with no child; `terminate` is a no-op.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Validate artifacts and spawn `program [args..] game_file`.
    ///
    /// Stdout and stderr share one pipe; the returned reader yields both in
    /// arrival order.
    #[instrument(
        skip_all,
        fields(program = %cfg.program.display(), game = %cfg.game_file.display())
    )]
    pub fn start(cfg: &InterpreterConfig) -> Result<(Self, PipeReader)> {
        let artifacts = resolve_artifacts(cfg)?;
        let (reader, writer) = io::pipe().context("create output pipe")?;
        let stderr_writer = writer.try_clone().context("clone output pipe")?;

        let mut cmd = Command::new(&artifacts.program);
        cmd.args(&cfg.args)
            .arg(&artifacts.game_file)
            .stdin(Stdio::piped())
            .stdout(writer)
            .stderr(stderr_writer);
        hide_console_window(&mut cmd);

        debug!("spawning interpreter");
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, "failed to spawn interpreter");
                return Err(e)
                    .with_context(|| format!("spawn {}", artifacts.program.display()));
            }
        };
        // The command still holds write ends of the pipe; drop them so the
        // reader sees end-of-stream once the child exits.
        drop(cmd);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        info!(pid = child.id(), "interpreter started");
        Ok((
            Self {
                child: Some(child),
                stdin: Some(stdin),
            },
            reader,
        ))
    }

    /// Write `line` plus a newline to the child and flush.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| SessionError::child_unavailable("interpreter not running"))?;
        if let Some(status) = child.try_wait().context("poll interpreter")? {
            let reason = format!("interpreter exited ({status})");
            return Err(SessionError::child_unavailable(reason).into());
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SessionError::child_unavailable("interpreter input closed"))?;
        let written = (|| -> io::Result<()> {
            stdin.write_all(line.as_bytes())?;
            stdin.write_all(b"\n")?;
            stdin.flush()
        })();
        if let Err(e) = written {
            warn!(err = %e, "write to interpreter failed");
            self.stdin = None;
            return Err(SessionError::child_unavailable(format!("write failed: {e}")).into());
        }
        Ok(())
    }

    /// Best-effort stop of the child. Safe to call repeatedly or before start.
    pub fn terminate(&mut self) {
        self.stdin = None;
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => debug!(%status, "interpreter already exited"),
            _ => {
                if let Err(e) = child.kill() {
                    warn!(err = %e, "kill interpreter");
                }
                match child.wait_timeout(Duration::from_secs(5)) {
                    Ok(Some(status)) => debug!(%status, "interpreter terminated"),
                    Ok(None) => warn!("interpreter did not exit after kill"),
                    Err(e) => warn!(err = %e, "wait for interpreter"),
                }
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}

/// Stderr kept from a one-shot command for error reporting.
const STDERR_KEEP_BYTES: usize = 4 * 1024;

/// Result of a one-shot command fed from stdin.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    /// Bytes of stdout dropped past the limit.
    pub stdout_truncated: usize,
    /// Leading stderr, capped at a few KiB.
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Run `cmd` with `input` on stdin and wait at most `timeout`.
///
/// Stdin is fed from its own thread and both output pipes are drained while
/// the child runs, so a command that writes before reading cannot deadlock.
/// Stdout past `stdout_limit` bytes is counted and dropped.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), stdout_limit))]
pub fn run_with_input(
    mut cmd: Command,
    input: &[u8],
    timeout: Duration,
    stdout_limit: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .inspect_err(|e| error!(err = %e, "failed to spawn command"))
        .context("spawn command")?;

    let (Some(mut stdin), Some(stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        let _ = child.kill();
        return Err(anyhow!("command pipes were not set up"));
    };

    let input = input.to_vec();
    let feeder = thread::spawn(move || {
        // A command may exit without reading everything it was given.
        if let Err(e) = stdin.write_all(&input) {
            debug!(err = %e, "stdin closed early");
        }
    });
    let out_reader = thread::spawn(move || read_capped(stdout, stdout_limit));
    let err_reader = thread::spawn(move || read_capped(stderr, STDERR_KEEP_BYTES));

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command exceeded its timeout");
            child.kill().context("kill command")?;
            (child.wait().context("reap command")?, true)
        }
    };

    if feeder.join().is_err() {
        warn!("stdin feeder panicked");
    }
    let (stdout, stdout_truncated) = out_reader
        .join()
        .map_err(|_| anyhow!("stdout reader panicked"))??;
    let (stderr, _) = err_reader
        .join()
        .map_err(|_| anyhow!("stderr reader panicked"))??;

    if stdout_truncated > 0 {
        warn!(stdout_truncated, "command output over limit");
    }
    debug!(exit_code = ?status.code(), timed_out, "command done");
    Ok(CommandOutput {
        status,
        stdout,
        stdout_truncated,
        stderr,
        timed_out,
    })
}

/// Read to EOF, keeping at most `cap` bytes; returns the kept bytes and the dropped count.
fn read_capped<R: Read>(mut reader: R, cap: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let cap = u64::try_from(cap).unwrap_or(u64::MAX);
    (&mut reader)
        .take(cap)
        .read_to_end(&mut kept)
        .context("read command output")?;
    let dropped = io::copy(&mut reader, &mut io::sink()).context("drain command output")?;
    Ok((kept, usize::try_from(dropped).unwrap_or(usize::MAX)))
}

/// Render an argv for log and error messages.
pub(crate) fn display_argv(program: &Path, args: &[String]) -> String {
    std::iter::once(program.display().to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGame;

    #[test]
    fn missing_game_file_is_reported_before_spawn() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = InterpreterConfig {
            program: PathBuf::from("sh"),
            args: Vec::new(),
            game_file: temp.path().join("absent.z5"),
        };
        let err = Supervisor::start(&cfg).unwrap_err();
        match err.downcast_ref::<SessionError>() {
            Some(SessionError::MissingArtifact { kind, .. }) => {
                assert_eq!(*kind, ArtifactKind::GameFile);
            }
            other => panic!("expected missing artifact, got {other:?}"),
        }
    }

    #[test]
    fn bare_name_in_base_dir_resolves_to_that_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("dfrotz"), "#!/bin/sh\n").expect("write interpreter");

        let program = local_program(Path::new("dfrotz"), temp.path()).expect("local file");
        assert_eq!(program, temp.path().join("dfrotz"));
        // With a directory component, `Command` runs this file instead of searching `PATH`.
        assert!(program.is_absolute());
        assert!(program.parent().is_some_and(|dir| !dir.as_os_str().is_empty()));

        assert_eq!(local_program(Path::new("absent-interp"), temp.path()), None);
    }

    #[test]
    fn resolved_programs_are_absolute() {
        let game = FakeGame::new().expect("fake game");
        let from_path = resolve_artifacts(&game.interpreter()).expect("resolve sh");
        assert!(from_path.program.is_absolute());

        let cfg = InterpreterConfig {
            program: from_path.program.clone(),
            ..game.interpreter()
        };
        assert_eq!(resolve_artifacts(&cfg).expect("resolve").program, from_path.program);
    }

    #[test]
    fn missing_interpreter_is_reported() {
        let game = FakeGame::new().expect("fake game");
        let cfg = InterpreterConfig {
            program: PathBuf::from("definitely-not-an-interpreter-4e1b"),
            ..game.interpreter()
        };
        let err = resolve_artifacts(&cfg).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::MissingArtifact {
                kind: ArtifactKind::Interpreter,
                ..
            })
        ));
    }

    #[test]
    fn terminate_is_idempotent() {
        let mut idle = Supervisor::idle();
        idle.terminate();
        idle.terminate();
        assert!(idle.send_line("look").is_err());

        let game = FakeGame::new().expect("fake game");
        let (mut supervisor, _reader) = Supervisor::start(&game.interpreter()).expect("start");
        supervisor.send_line("look").expect("send while running");
        supervisor.terminate();
        supervisor.terminate();
        assert!(supervisor.send_line("look").is_err());
    }

    #[test]
    fn send_after_terminate_is_child_unavailable() {
        let game = FakeGame::new().expect("fake game");
        let (mut supervisor, _reader) = Supervisor::start(&game.interpreter()).expect("start");
        supervisor.send_line("look").expect("send while running");
        supervisor.terminate();

        let err = supervisor.send_line("look").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::ChildUnavailable { .. })
        ));
    }

    #[test]
    fn run_with_input_echoes_stdin() {
        let output = run_with_input(
            Command::new("cat"),
            b"hello oracle",
            Duration::from_secs(5),
            1024,
        )
        .expect("run cat");
        assert!(output.status.success());
        assert!(!output.timed_out);
        assert_eq!(output.stdout, b"hello oracle");
    }

    #[test]
    fn run_with_input_caps_stdout() {
        let output = run_with_input(Command::new("cat"), b"0123456789", Duration::from_secs(5), 4)
            .expect("run cat");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn run_with_input_kills_on_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec sleep 5"]);
        let output =
            run_with_input(cmd, b"", Duration::from_millis(200), 1024).expect("run sleep");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn display_argv_joins_program_and_args() {
        let argv = display_argv(Path::new("llm"), &["-m".to_string(), "x".to_string()]);
        assert_eq!(argv, "llm -m x");
    }
}
