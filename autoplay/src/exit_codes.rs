//! Stable exit codes for the `autoplay` CLI.

/// Session ended normally (oracle quit or move cap).
pub const OK: i32 = 0;
/// Invalid config or any other error.
pub const INVALID: i32 = 1;
/// The interpreter or game file could not be found.
pub const MISSING_ARTIFACT: i32 = 2;
/// The child process went away mid-session.
pub const CHILD_UNAVAILABLE: i32 = 3;
