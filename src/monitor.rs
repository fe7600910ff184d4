use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::delivery::{DeliveryOutcome, Dispatcher};
use crate::direction;
use crate::identity::IdentityTracker;
use crate::message::{Direction, Message};
use crate::source::MessageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    Terminated,
}

/// What a single tick ended up doing
#[derive(Debug)]
pub enum TickOutcome {
    /// The chat shows no message yet
    Empty,
    /// The source could not be read; the tick was skipped
    SourceUnavailable,
    /// The latest message was already processed
    Duplicate,
    Dispatched {
        direction: Direction,
        outcomes: Vec<DeliveryOutcome>,
    },
}

/// Polls one chat and dispatches every newly seen message.
pub struct Monitor {
    source: Box<dyn MessageSource>,
    dispatcher: Dispatcher,
    tracker: IdentityTracker,
    interval: Duration,
    state: MonitorState,
}

impl Monitor {
    pub fn new(source: Box<dyn MessageSource>, dispatcher: Dispatcher, interval: Duration) -> Self {
        Self {
            source,
            dispatcher,
            tracker: IdentityTracker::new(),
            interval,
            state: MonitorState::Idle,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Open the monitored chat. A missing chat closes the source and fails.
    pub async fn open(&mut self, chat: &str) -> Result<()> {
        if let Err(e) = self.source.open(chat).await {
            error!("Failed to open chat on {}: {}", self.source.name(), e);
            self.shutdown().await;
            return Err(e.into());
        }
        info!("Monitoring chat: {}", chat);
        Ok(())
    }

    /// Run one poll: read the latest message, drop it if already seen,
    /// otherwise classify and dispatch it.
    pub async fn tick(&mut self) -> TickOutcome {
        self.state = MonitorState::Polling;
        let outcome = self.poll().await;
        self.state = MonitorState::Idle;
        outcome
    }

    async fn poll(&mut self) -> TickOutcome {
        let observed = match self.source.latest_message().await {
            Ok(Some(observed)) => observed,
            Ok(None) => return TickOutcome::Empty,
            Err(e) => {
                warn!("Message source unavailable, skipping tick: {}", e);
                return TickOutcome::SourceUnavailable;
            }
        };

        let (is_new, fingerprint) = self.tracker.is_new(&observed.text);
        if !is_new {
            debug!(fingerprint = %fingerprint, "No new message");
            return TickOutcome::Duplicate;
        }

        let direction = direction::classify(self.source.as_mut(), &observed).await;
        let message = Message {
            text: observed.text,
            fingerprint,
            direction,
            observed_at: Utc::now(),
        };

        info!(
            direction = %message.direction,
            fingerprint = %message.fingerprint,
            observed_at = %message.observed_at,
            "New message: {}",
            message.text
        );

        let outcomes = self.dispatcher.dispatch(&message).await;
        TickOutcome::Dispatched {
            direction,
            outcomes,
        }
    }

    /// Poll at the fixed interval until `shutdown` resolves. Cancellation is
    /// only observed between ticks; the source is closed before returning.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            if let TickOutcome::Dispatched {
                direction,
                outcomes,
            } = self.tick().await
            {
                for outcome in outcomes.iter().filter(|o| !o.is_success()) {
                    debug!(
                        channel = %outcome.channel,
                        status = ?outcome.status_code,
                        "Delivery not completed: {}",
                        outcome.error.as_deref().unwrap_or_default()
                    );
                }
                debug!(direction = %direction, calls = outcomes.len(), "Tick complete");
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping monitor");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.source.close().await {
            error!("Failed to close {} source: {}", self.source.name(), e);
        }
        self.state = MonitorState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use crate::delivery::tests::RecordingSink;
    use crate::delivery::webhook::WebhookSink;
    use crate::delivery::Channel;
    use crate::direction::{INCOMING_MARKER, OUTGOING_MARKER};
    use crate::error::SourceError;
    use crate::matcher::PhraseMatcher;
    use crate::source::{markers, MarkerSet, ObservedMessage};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    /// One scripted poll result: `None` for an empty chat, `Err` for failure
    type Frame = Result<Option<(&'static str, &'static str)>, ()>;

    /// Source that replays a fixed sequence of frames, one per poll
    struct ScriptedSource {
        frames: VecDeque<Frame>,
        current_marker: &'static str,
        closed: Arc<AtomicBool>,
        missing_chat: bool,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Frame>) -> Self {
            Self {
                frames: frames.into(),
                current_marker: INCOMING_MARKER,
                closed: Arc::new(AtomicBool::new(false)),
                missing_chat: false,
            }
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn open(&mut self, chat: &str) -> Result<(), SourceError> {
            if self.missing_chat {
                return Err(SourceError::ChatNotFound(chat.to_string()));
            }
            Ok(())
        }

        async fn latest_message(&mut self) -> Result<Option<ObservedMessage>, SourceError> {
            match self.frames.pop_front().unwrap_or(Ok(None)) {
                Ok(Some((text, marker))) => {
                    self.current_marker = marker;
                    Ok(Some(ObservedMessage {
                        text: text.to_string(),
                        locator: 0,
                    }))
                }
                Ok(None) => Ok(None),
                Err(()) => Err(SourceError::Unavailable("page reloading".to_string())),
            }
        }

        async fn ancestor_markers(
            &mut self,
            _message: &ObservedMessage,
            _max_depth: usize,
        ) -> Result<Vec<MarkerSet>, SourceError> {
            Ok(vec![
                markers(["selectable-text"]),
                markers([self.current_marker]),
            ])
        }

        async fn close(&mut self) -> Result<(), SourceError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn monitor(source: ScriptedSource, sink: &RecordingSink, phrases: &[&str]) -> Monitor {
        let matcher = PhraseMatcher::new(phrases.iter().map(|s| s.to_string()).collect(), 85);
        let dispatcher = Dispatcher::new(Box::new(sink.clone()), matcher);
        Monitor::new(Box::new(source), dispatcher, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_alert_scenario_and_dedup() {
        let source = ScriptedSource::new(vec![
            Ok(Some(("URGENT: server down", INCOMING_MARKER))),
            Ok(Some(("URGENT: server down", INCOMING_MARKER))),
        ]);
        let sink = RecordingSink::default();
        let mut monitor = monitor(source, &sink, &["urgent", "server down"]);

        match monitor.tick().await {
            TickOutcome::Dispatched {
                direction,
                outcomes,
            } => {
                assert_eq!(direction, Direction::Incoming);
                assert_eq!(outcomes.len(), 2);
            }
            other => panic!("expected dispatch, got {other:?}"),
        }

        let calls = sink.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (Channel::Incoming, json!({ "data": "URGENT: server down" })));
        assert_eq!(calls[1], (Channel::Alert, json!({ "alert": "URGENT: server down" })));

        assert!(matches!(monitor.tick().await, TickOutcome::Duplicate));
        assert_eq!(sink.calls().len(), 2);
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[tokio::test]
    async fn test_alert_scenario_posts_to_webhook_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = WebhookSink::new(&WebhookConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            max_retries: 0,
            retry_backoff_ms: 1,
        })
        .unwrap();
        let matcher = PhraseMatcher::new(vec!["urgent".into(), "server down".into()], 90);
        let source = ScriptedSource::new(vec![
            Ok(Some(("URGENT: server down", INCOMING_MARKER))),
            Ok(Some(("URGENT: server down", INCOMING_MARKER))),
        ]);
        let mut monitor = Monitor::new(
            Box::new(source),
            Dispatcher::new(Box::new(sink), matcher),
            Duration::from_millis(1),
        );

        monitor.tick().await;
        assert!(matches!(monitor.tick().await, TickOutcome::Duplicate));

        let requests = server.received_requests().await.unwrap();
        let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
        assert_eq!(paths, vec!["/ef", "/alert"]);
        let bodies: Vec<serde_json::Value> = requests
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect();
        assert_eq!(
            bodies,
            vec![
                json!({ "data": "URGENT: server down" }),
                json!({ "alert": "URGENT: server down" }),
            ]
        );
    }

    #[tokio::test]
    async fn test_outgoing_message_logged_without_alert() {
        let source = ScriptedSource::new(vec![Ok(Some(("server down, fixing", OUTGOING_MARKER)))]);
        let sink = RecordingSink::default();
        let mut monitor = monitor(source, &sink, &["server down"]);

        assert!(matches!(
            monitor.tick().await,
            TickOutcome::Dispatched {
                direction: Direction::Outgoing,
                ..
            }
        ));
        let channels: Vec<Channel> = sink.calls().into_iter().map(|(c, _)| c).collect();
        assert_eq!(channels, vec![Channel::Outgoing]);
    }

    #[tokio::test]
    async fn test_empty_and_unavailable_ticks_continue() {
        let source = ScriptedSource::new(vec![
            Ok(None),
            Err(()),
            Ok(Some(("hello", INCOMING_MARKER))),
        ]);
        let sink = RecordingSink::default();
        let mut monitor = monitor(source, &sink, &[]);

        assert!(matches!(monitor.tick().await, TickOutcome::Empty));
        assert!(matches!(monitor.tick().await, TickOutcome::SourceUnavailable));
        assert!(matches!(monitor.tick().await, TickOutcome::Dispatched { .. }));
        assert_eq!(sink.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_message_dispatched_again() {
        let source = ScriptedSource::new(vec![
            Ok(Some(("one", INCOMING_MARKER))),
            Ok(Some(("two", INCOMING_MARKER))),
            Ok(Some(("one", INCOMING_MARKER))),
        ]);
        let sink = RecordingSink::default();
        let mut monitor = monitor(source, &sink, &[]);

        for _ in 0..3 {
            assert!(matches!(monitor.tick().await, TickOutcome::Dispatched { .. }));
        }
        assert_eq!(sink.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_stop_polling() {
        let source = ScriptedSource::new(vec![
            Ok(Some(("first", INCOMING_MARKER))),
            Ok(Some(("second", INCOMING_MARKER))),
        ]);
        let sink = RecordingSink {
            failing: vec![Channel::Incoming],
            ..Default::default()
        };
        let mut monitor = monitor(source, &sink, &[]);

        for _ in 0..2 {
            match monitor.tick().await {
                TickOutcome::Dispatched { outcomes, .. } => assert!(!outcomes[0].is_success()),
                other => panic!("expected dispatch, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_closes_source() {
        let source = ScriptedSource::new(vec![Ok(Some(("hello", INCOMING_MARKER)))]);
        let closed = Arc::clone(&source.closed);
        let sink = RecordingSink::default();
        let mut monitor = monitor(source, &sink, &[]);

        monitor.run(async {}).await;

        assert_eq!(monitor.state(), MonitorState::Terminated);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(sink.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_run_keeps_polling_until_shutdown() {
        let source = ScriptedSource::new(vec![
            Ok(Some(("a", INCOMING_MARKER))),
            Ok(Some(("a", INCOMING_MARKER))),
            Ok(Some(("b", INCOMING_MARKER))),
        ]);
        let sink = RecordingSink::default();
        let mut monitor = monitor(source, &sink, &[]);

        let probe = sink.clone();
        monitor
            .run(async move {
                while probe.calls().len() < 2 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await;

        let texts: Vec<serde_json::Value> = sink.calls().into_iter().map(|(_, b)| b).collect();
        assert_eq!(texts, vec![json!({ "data": "a" }), json!({ "data": "b" })]);
    }

    #[tokio::test]
    async fn test_open_missing_chat_closes_source() {
        let mut source = ScriptedSource::new(Vec::new());
        source.missing_chat = true;
        let closed = Arc::clone(&source.closed);
        let sink = RecordingSink::default();
        let mut monitor = monitor(source, &sink, &[]);

        let err = monitor.open("Nobody").await.unwrap_err();
        assert!(err.to_string().contains("Nobody"));
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(monitor.state(), MonitorState::Terminated);
    }
}
