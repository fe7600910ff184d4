use tracing::{error, warn};

use crate::error::ClassificationError;
use crate::message::Direction;
use crate::source::{MarkerSet, MessageSource, ObservedMessage};

/// Marker on a container holding a message sent by the monitored account
pub const OUTGOING_MARKER: &str = "message-out";
/// Marker on a container holding a message from a counterpart
pub const INCOMING_MARKER: &str = "message-in";
/// How many enclosing containers are inspected before giving up
pub const MAX_ANCESTOR_DEPTH: usize = 10;

/// Search an ancestor chain, nearest first, for the first container that
/// carries a direction marker. Only the first `max_depth` levels count.
pub fn walk_ancestors(
    chain: &[MarkerSet],
    max_depth: usize,
) -> Result<Direction, ClassificationError> {
    for level in chain.iter().take(max_depth) {
        if level.contains(OUTGOING_MARKER) {
            return Ok(Direction::Outgoing);
        }
        if level.contains(INCOMING_MARKER) {
            return Ok(Direction::Incoming);
        }
    }
    Err(ClassificationError::Ambiguous {
        depth: chain.len().min(max_depth),
    })
}

/// Decide who produced `message`.
///
/// Anything undecidable is treated as incoming so it still goes through
/// phrase matching; a spurious alert is preferred over a missed one.
pub async fn classify(source: &mut dyn MessageSource, message: &ObservedMessage) -> Direction {
    let result = match source.ancestor_markers(message, MAX_ANCESTOR_DEPTH).await {
        Ok(chain) => walk_ancestors(&chain, MAX_ANCESTOR_DEPTH),
        Err(e) => Err(ClassificationError::Lookup(e)),
    };

    match result {
        Ok(direction) => direction,
        Err(e @ ClassificationError::Ambiguous { .. }) => {
            warn!("Could not determine message direction ({}), assuming incoming", e);
            Direction::Incoming
        }
        Err(e) => {
            error!("Error determining message direction: {}", e);
            Direction::Incoming
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::markers;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    fn neutral() -> MarkerSet {
        markers(["copyable-text"])
    }

    #[test]
    fn test_outgoing_found_at_depth() {
        let chain = vec![neutral(), neutral(), markers([OUTGOING_MARKER])];
        assert_eq!(walk_ancestors(&chain, 10).unwrap(), Direction::Outgoing);
    }

    #[test]
    fn test_incoming_found() {
        let chain = vec![neutral(), markers(["row", INCOMING_MARKER])];
        assert_eq!(walk_ancestors(&chain, 10).unwrap(), Direction::Incoming);
    }

    #[test]
    fn test_nearest_marker_wins() {
        let chain = vec![markers([INCOMING_MARKER]), markers([OUTGOING_MARKER])];
        assert_eq!(walk_ancestors(&chain, 10).unwrap(), Direction::Incoming);
    }

    #[test]
    fn test_marker_beyond_cap_ignored() {
        let mut chain = vec![neutral(); 10];
        chain.push(markers([OUTGOING_MARKER]));
        let err = walk_ancestors(&chain, 10).unwrap_err();
        assert!(matches!(err, ClassificationError::Ambiguous { depth: 10 }));
    }

    #[test]
    fn test_empty_chain_is_ambiguous() {
        let err = walk_ancestors(&[], 10).unwrap_err();
        assert!(matches!(err, ClassificationError::Ambiguous { depth: 0 }));
    }

    /// Source that only answers ancestor lookups
    struct ChainSource {
        chain: Result<Vec<MarkerSet>, ()>,
    }

    #[async_trait]
    impl MessageSource for ChainSource {
        fn name(&self) -> &str {
            "chain"
        }
        async fn open(&mut self, _chat: &str) -> Result<(), SourceError> {
            Ok(())
        }
        async fn latest_message(&mut self) -> Result<Option<ObservedMessage>, SourceError> {
            Ok(None)
        }
        async fn ancestor_markers(
            &mut self,
            _message: &ObservedMessage,
            _max_depth: usize,
        ) -> Result<Vec<MarkerSet>, SourceError> {
            self.chain
                .clone()
                .map_err(|_| SourceError::Unavailable("detached".to_string()))
        }
        async fn close(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
    }

    fn observed() -> ObservedMessage {
        ObservedMessage {
            text: "hi".to_string(),
            locator: 0,
        }
    }

    #[tokio::test]
    async fn test_classify_outgoing() {
        let mut source = ChainSource {
            chain: Ok(vec![neutral(), neutral(), markers([OUTGOING_MARKER])]),
        };
        assert_eq!(classify(&mut source, &observed()).await, Direction::Outgoing);
    }

    #[tokio::test]
    async fn test_classify_defaults_incoming_past_cap() {
        let mut source = ChainSource {
            chain: Ok(vec![neutral(); 11]),
        };
        assert_eq!(classify(&mut source, &observed()).await, Direction::Incoming);
    }

    /// Log sink shared with a scoped fmt subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_classify_warns_when_no_marker_within_cap() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut source = ChainSource {
            chain: Ok(vec![neutral(); 11]),
        };
        assert_eq!(classify(&mut source, &observed()).await, Direction::Incoming);

        let output = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
        assert!(output.contains("WARN"), "no warning logged: {output}");
        assert!(output.contains("assuming incoming"));
    }

    #[tokio::test]
    async fn test_classify_defaults_incoming_on_lookup_failure() {
        let mut source = ChainSource { chain: Err(()) };
        assert_eq!(classify(&mut source, &observed()).await, Direction::Incoming);
    }
}
