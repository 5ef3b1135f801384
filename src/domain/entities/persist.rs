//! Background persist task state.

/// Lifecycle of a persist task. Every state but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistState {
    /// Queued or copying bytes.
    #[default]
    Running,
    /// The destination file holds the full download.
    Succeeded,
    /// The download or copy failed; no destination file was left behind.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl PersistState {
    /// Returns true once the task can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for PersistState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
