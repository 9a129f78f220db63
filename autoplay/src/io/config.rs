//! Session configuration stored in `autoplay.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::atomic::write_atomic;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "autoplay.toml";

/// Session configuration (TOML).
///
/// Missing fields default to the values a plain `autoplay play` uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutoplayConfig {
    /// Stop after this many dispatched actions.
    pub max_moves: u32,

    /// Length of the output aggregation window per turn.
    pub capture_timeout_ms: u64,

    /// Pause after each dispatch so the interpreter can process the command.
    pub turn_pause_ms: u64,

    /// Pause after spawning the interpreter, before the first capture.
    pub startup_delay_ms: u64,

    /// Number of recent action entries included in the oracle context.
    pub history_window: usize,

    /// Planning text is cut to this many characters in the performance table.
    pub planning_note_limit: usize,

    /// Directory receiving the session exports.
    pub output_dir: PathBuf,

    pub interpreter: InterpreterConfig,

    pub prompt: PromptConfig,

    pub oracle: OracleConfig,
}

impl Default for AutoplayConfig {
    fn default() -> Self {
        Self {
            max_moves: 100,
            capture_timeout_ms: 1_000,
            turn_pause_ms: 1_000,
            startup_delay_ms: 1_000,
            history_window: 30,
            planning_note_limit: 1_000,
            output_dir: PathBuf::from("."),
            interpreter: InterpreterConfig::default(),
            prompt: PromptConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

/// The interpreter binary and the game it runs (`program [args..] game_file`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InterpreterConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub game_file: PathBuf,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("dfrotz"),
            args: Vec::new(),
            game_file: PathBuf::from("zork1.z5"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// File whose contents replace the built-in system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_path: Option<PathBuf>,
}

/// Oracle backend selection, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OracleConfig {
    /// OpenAI-compatible chat-completions endpoint.
    Chat(ChatOracleConfig),
    /// External command reading the transcript on stdin.
    Command(CommandOracleConfig),
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig::Chat(ChatOracleConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatOracleConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ChatOracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 5_000,
            timeout_secs: 15,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandOracleConfig {
    /// Argv of the oracle command (e.g. `["llm", "-m", "gpt-4o"]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Stdout beyond this many bytes is discarded.
    pub output_limit_bytes: usize,
}

impl Default for CommandOracleConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

impl AutoplayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_moves == 0 {
            return Err(anyhow!("max_moves must be > 0"));
        }
        if self.capture_timeout_ms == 0 {
            return Err(anyhow!("capture_timeout_ms must be > 0"));
        }
        if self.history_window == 0 {
            return Err(anyhow!("history_window must be > 0"));
        }
        if self.interpreter.program.as_os_str().is_empty() {
            return Err(anyhow!("interpreter.program must not be empty"));
        }
        if self.interpreter.game_file.as_os_str().is_empty() {
            return Err(anyhow!("interpreter.game_file must not be empty"));
        }
        match &self.oracle {
            OracleConfig::Chat(chat) => {
                if chat.endpoint.trim().is_empty() || chat.model.trim().is_empty() {
                    return Err(anyhow!("oracle.endpoint and oracle.model must be set"));
                }
                if chat.timeout_secs == 0 {
                    return Err(anyhow!("oracle.timeout_secs must be > 0"));
                }
            }
            OracleConfig::Command(cmd) => {
                if cmd.command.is_empty() || cmd.command[0].trim().is_empty() {
                    return Err(anyhow!("oracle.command must be a non-empty array"));
                }
                if cmd.timeout_secs == 0 {
                    return Err(anyhow!("oracle.timeout_secs must be > 0"));
                }
            }
        }
        Ok(())
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn turn_pause(&self) -> Duration {
        Duration::from_millis(self.turn_pause_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// Read and validate `path`; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<AutoplayConfig> {
    let cfg = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<AutoplayConfig>(&raw)
            .with_context(|| format!("parse config {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AutoplayConfig::default(),
        Err(e) => return Err(e).with_context(|| format!("read config {}", path.display())),
    };
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Write `cfg` as TOML, replacing any existing file atomically.
pub fn write_config(path: &Path, cfg: &AutoplayConfig) -> Result<()> {
    cfg.validate()?;
    let body = toml::to_string_pretty(cfg).context("serialize config")?;
    write_atomic(path, &format!("{}\n", body.trim_end()))
}
