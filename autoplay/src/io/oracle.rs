//! Oracle abstraction for turn decisions.
//!
//! The [`Oracle`] trait decouples the session loop from the decision backend
//! (a chat-completions endpoint or an external command). Tests use scripted
//! oracles that return predetermined replies without network or processes.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::chat_api::ChatOracle;
use crate::io::config::{CommandOracleConfig, OracleConfig};
use crate::io::process::{display_argv, run_with_input};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

/// One role-tagged message of the oracle context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Abstraction over decision backends.
///
/// Called once per turn with the full context; implementations keep no
/// conversation state between calls.
pub trait Oracle {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Oracle that runs an external command with the transcript on stdin.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    config: CommandOracleConfig,
}

impl CommandOracle {
    pub fn new(config: CommandOracleConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("oracle command must not be empty"));
        }
        Ok(Self { config })
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(timeout_secs = self.config.timeout_secs))]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("oracle command must not be empty"))?;
        let argv = display_argv(Path::new(program), args);
        info!(command = %argv, "consulting oracle command");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let transcript = render_transcript(messages);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = run_with_input(
            cmd,
            transcript.as_bytes(),
            timeout,
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run oracle command `{argv}`"))?;

        if output.timed_out {
            warn!(timeout_secs = self.config.timeout_secs, "oracle command timed out");
            return Err(anyhow!("oracle command `{argv}` timed out after {timeout:?}"));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(exit_code = ?output.status.code(), "oracle command failed");
            return Err(anyhow!(
                "oracle command `{argv}` failed with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        let reply = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(reply_bytes = reply.len(), "oracle command replied");
        Ok(reply)
    }
}

/// Render messages as a role-tagged plain-text transcript.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[{}]\n", message.role.as_str()));
        out.push_str(message.content.trim_end());
        out.push('\n');
    }
    out
}

/// The configured oracle backend.
pub enum AnyOracle {
    Chat(ChatOracle),
    Command(CommandOracle),
}

impl AnyOracle {
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        match config {
            OracleConfig::Chat(chat) => Ok(AnyOracle::Chat(ChatOracle::from_config(chat)?)),
            OracleConfig::Command(cmd) => Ok(AnyOracle::Command(CommandOracle::new(cmd.clone())?)),
        }
    }
}

impl Oracle for AnyOracle {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        match self {
            AnyOracle::Chat(oracle) => oracle.complete(messages),
            AnyOracle::Command(oracle) => oracle.complete(messages),
        }
    }
}
