pub mod webhook;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use crate::error::DeliveryError;
use crate::matcher::PhraseMatcher;
use crate::message::{Direction, Message};

/// Outbound destination for a message event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Log of messages sent by the monitored account
    Outgoing,
    /// Log of messages received from counterparts
    Incoming,
    /// Incoming messages that matched a trigger phrase
    Alert,
}

impl Channel {
    /// Path suffix appended to the webhook base URL
    pub fn suffix(&self) -> &'static str {
        match self {
            Channel::Outgoing => "/m",
            Channel::Incoming => "/ef",
            Channel::Alert => "/alert",
        }
    }

    /// JSON body posted for `text` on this channel
    pub fn body(&self, text: &str) -> serde_json::Value {
        match self {
            Channel::Alert => json!({ "alert": text }),
            Channel::Outgoing | Channel::Incoming => json!({ "data": text }),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Outgoing => write!(f, "sent-log"),
            Channel::Incoming => write!(f, "received-log"),
            Channel::Alert => write!(f, "alert"),
        }
    }
}

/// Result of one channel call, kept for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub channel: Channel,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Transport that carries a channel event somewhere.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver `body` on `channel`, returning the response status on success.
    async fn post(&self, channel: Channel, body: &serde_json::Value) -> Result<u16, DeliveryError>;
}

/// Routes classified messages to their channels.
pub struct Dispatcher {
    sink: Box<dyn DeliverySink>,
    matcher: PhraseMatcher,
}

impl Dispatcher {
    pub fn new(sink: Box<dyn DeliverySink>, matcher: PhraseMatcher) -> Self {
        Self { sink, matcher }
    }

    /// Deliver `message` to its log channel and, for relevant incoming
    /// messages, to the alert channel. Channel calls are independent; failures
    /// are logged and recorded in the returned outcomes.
    pub async fn dispatch(&self, message: &Message) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(2);

        match message.direction {
            Direction::Outgoing => {
                outcomes.push(self.send(Channel::Outgoing, &message.text).await);
            }
            Direction::Incoming => {
                outcomes.push(self.send(Channel::Incoming, &message.text).await);
                if self.matcher.is_enabled() && self.matcher.is_relevant(&message.text) {
                    outcomes.push(self.send(Channel::Alert, &message.text).await);
                }
            }
        }

        outcomes
    }

    async fn send(&self, channel: Channel, text: &str) -> DeliveryOutcome {
        match self.sink.post(channel, &channel.body(text)).await {
            Ok(status) => {
                info!(channel = %channel, status, "Delivered message: {}", text);
                DeliveryOutcome {
                    channel,
                    status_code: Some(status),
                    error: None,
                }
            }
            Err(e) => {
                error!(channel = %channel, "Delivery failed: {}", e);
                DeliveryOutcome {
                    channel,
                    status_code: e.status_code(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
