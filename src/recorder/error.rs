use std::fmt;

/// Why call setup stopped.
#[derive(Debug)]
pub enum SetupError {
    /// A final response was already sent to the caller; nothing more to do.
    RejectionAlreadySent { reason: String },
    /// Nothing was sent; the signaling layer's own timers clean up.
    Unhandled(anyhow::Error),
}

impl SetupError {
    pub fn is_handled(&self) -> bool {
        matches!(self, SetupError::RejectionAlreadySent { .. })
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::RejectionAlreadySent { reason } => write!(f, "rejected: {}", reason),
            SetupError::Unhandled(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SetupError {}

impl From<anyhow::Error> for SetupError {
    fn from(e: anyhow::Error) -> Self {
        SetupError::Unhandled(e)
    }
}
