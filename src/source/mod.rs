pub mod transcript;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::SourceError;

/// Structural markers carried by one container around a message
/// (e.g. the class names of a DOM node).
pub type MarkerSet = BTreeSet<String>;

/// The latest message as currently visible in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedMessage {
    /// Message text, already trimmed
    pub text: String,
    /// Source-specific handle used to look up the message's ancestors
    pub locator: usize,
}

/// Anything that can show the latest message of a chat and describe
/// where that message sits in its conversation.
#[async_trait]
pub trait MessageSource: Send {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Select the chat to monitor. `ChatNotFound` is fatal to the caller.
    async fn open(&mut self, chat: &str) -> Result<(), SourceError>;

    /// The most recent message, or `None` when the chat shows nothing yet.
    async fn latest_message(&mut self) -> Result<Option<ObservedMessage>, SourceError>;

    /// Marker sets of the containers enclosing `message`, nearest first,
    /// at most `max_depth` entries.
    async fn ancestor_markers(
        &mut self,
        message: &ObservedMessage,
        max_depth: usize,
    ) -> Result<Vec<MarkerSet>, SourceError>;

    /// Release whatever the source holds open.
    async fn close(&mut self) -> Result<(), SourceError>;
}

/// Build a marker set from string literals.
pub fn markers<I, S>(items: I) -> MarkerSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
