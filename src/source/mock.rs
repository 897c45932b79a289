use async_trait::async_trait;
use bytes::Bytes;
use flume::Sender;
use std::collections::VecDeque;

use super::{MessageSource, NextMessage};
use crate::error::SourceResult;
use crate::transmission::mock::MockEvent;

/// Replays a fixed script, then reports the end of the stream.
pub struct MockSource {
    script: VecDeque<NextMessage>,
    events: Option<Sender<MockEvent>>,
    fetched: usize,
}

impl MockSource {
    pub fn new(script: impl IntoIterator<Item = NextMessage>) -> Self {
        Self {
            script: script.into_iter().collect(),
            events: None,
            fetched: 0,
        }
    }

    pub fn from_messages<M: Into<Bytes>>(messages: impl IntoIterator<Item = M>) -> Self {
        Self::new(
            messages
                .into_iter()
                .map(|message| NextMessage::Message(message.into())),
        )
    }

    /// Shares the event log of a `MockRadio`, so shutdown order can be checked.
    pub fn with_events(mut self, events: Sender<MockEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Number of `next_message` calls served so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }
}

#[async_trait]
impl MessageSource for MockSource {
    async fn next_message(&mut self) -> NextMessage {
        self.fetched += 1;
        self.script.pop_front().unwrap_or(NextMessage::EndOfStream)
    }

    async fn shutdown(&mut self) -> SourceResult<()> {
        if let Some(events) = &self.events {
            let _ = events.send(MockEvent::SourceShutdown);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_mock_source_replays_then_ends() {
    let mut source = MockSource::from_messages([&b"first"[..], &b""[..]]);
    assert!(matches!(source.next_message().await, NextMessage::Message(m) if m == "first"));
    assert!(matches!(source.next_message().await, NextMessage::Message(m) if m.is_empty()));
    assert!(matches!(source.next_message().await, NextMessage::EndOfStream));
    assert_eq!(source.fetched(), 3);
}
