//! I/O for sessions: processes, oracle backends, prompts, and exports.

pub mod atomic;
pub mod chat_api;
pub mod config;
pub mod drain;
pub mod exports;
pub mod oracle;
pub mod process;
pub mod prompt;
