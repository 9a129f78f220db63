//! Oracle-driven player for line-oriented interactive fiction interpreters.
//!
//! A session spawns the interpreter, gathers its output into one snapshot per
//! turn, asks an external oracle for the next command, sends it, and keeps a
//! durable history of everything that happened. The crate is split into:
//!
//! - **[`core`]**: Pure, deterministic logic (score and action extraction,
//!   history bookkeeping). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (child processes, oracle backends,
//!   prompt rendering, exports, config).
//!
//! [`session`] ties the pieces into one explicitly owned context and
//! [`looping`] drives it turn by turn.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
