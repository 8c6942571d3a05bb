use std::fmt;
use thiserror::Error;

/// The step of a distribution run that an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    Plan,
    Announce,
    Distribute,
    Compute,
    Collect,
    Synchronize,
    Report,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Load => "load",
            Phase::Plan => "plan",
            Phase::Announce => "announce",
            Phase::Distribute => "distribute",
            Phase::Compute => "compute",
            Phase::Collect => "collect",
            Phase::Synchronize => "synchronize",
            Phase::Report => "report",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("Invalid rank: {0}")]
    InvalidRank(i32),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Resource exhaustion: {0}")]
    ResourceError(String),
    #[error("Load error: {0}")]
    LoadError(String),
    #[error("Data error: {0}")]
    DataError(String),
    #[error("Invalid distribution plan: {0}")]
    PlanError(String),
    #[error("Communication error: {0}")]
    CommunicationError(String),
    #[error("Buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },
    #[error("Initialization error: {0}")]
    InitError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Shared memory error: {0}")]
    SharedMemoryError(String),
    #[error("Process error: {0}")]
    ProcessError(String),
    #[error("Group aborted by rank {by_rank}")]
    Aborted { by_rank: i32 },
    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<GroupError>,
    },
}

impl GroupError {
    /// Tag this error with the run phase it was raised in. Already-tagged
    /// errors keep their innermost phase.
    pub fn during(self, phase: Phase) -> Self {
        match self {
            tagged @ GroupError::Phase { .. } => tagged,
            other => GroupError::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The phase this error was tagged with, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            GroupError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Strip phase tagging and return the underlying error.
    pub fn root_cause(&self) -> &GroupError {
        match self {
            GroupError::Phase { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GroupError>;
