use thiserror::Error;

/// Failures reported by a message source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The monitored chat does not exist. Fatal at startup.
    #[error("chat '{0}' not found")]
    ChatNotFound(String),

    /// The source could not be read this tick.
    #[error("message source unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why an ancestor walk could not decide a direction.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("no direction marker within {depth} ancestor levels")]
    Ambiguous { depth: usize },

    #[error("ancestor lookup failed: {0}")]
    Lookup(#[from] SourceError),
}

/// A single webhook call that did not succeed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint returned status {0}")]
    Status(u16),
}

impl DeliveryError {
    /// Status code carried by the failure, if the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DeliveryError::Transport(e) => e.status().map(|s| s.as_u16()),
            DeliveryError::Status(code) => Some(*code),
        }
    }

    /// Transport errors and 5xx responses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Transport(_) => true,
            DeliveryError::Status(code) => *code >= 500,
        }
    }
}
