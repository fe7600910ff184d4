use chrono::{DateTime, Utc};

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the monitored account
    Outgoing,
    /// Received from a counterpart
    Incoming,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Outgoing => write!(f, "outgoing"),
            Direction::Incoming => write!(f, "incoming"),
        }
    }
}

/// A newly observed, classified message ready for dispatch.
#[derive(Debug, Clone)]
pub struct Message {
    pub text: String,
    pub fingerprint: String,
    pub direction: Direction,
    pub observed_at: DateTime<Utc>,
}
