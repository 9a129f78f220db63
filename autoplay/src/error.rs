//! Fatal session errors.
//!
//! These travel inside `anyhow::Error` and are recovered with `downcast_ref`
//! where the caller needs to tell them apart (exit codes, tests).

use std::path::PathBuf;

/// Which required artifact could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Interpreter,
    GameFile,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Interpreter => write!(f, "interpreter"),
            ArtifactKind::GameFile => write!(f, "game file"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A required artifact is absent; raised before any child is spawned.
    #[error("missing {kind}: {}", path.display())]
    MissingArtifact { kind: ArtifactKind, path: PathBuf },
    /// The child's input is closed or the process has exited.
    #[error("child process unavailable: {reason}")]
    ChildUnavailable { reason: String },
}

impl SessionError {
    pub fn child_unavailable(reason: impl Into<String>) -> Self {
        SessionError::ChildUnavailable {
            reason: reason.into(),
        }
    }
}
