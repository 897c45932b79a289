use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;

use super::retry::{Action, LinkAttempt, RetryPolicy};
use super::sending::LinkSender;
use super::splitting::split;
use crate::config::RelayConfig;
use crate::error::{ConfigError, RelayError};
use crate::rtcm::message_type;
use crate::source::{CorrectionMessage, MessageSource, NextMessage};
use crate::transmission::RadioLike;
use crate::util::format_bytes;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    pub messages: u64,
    pub frames_sent: u64,
    pub frames_abandoned: u64,
    pub retries: u64,
    pub bytes_sent: u64,
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages relayed, {} frames ({}) sent, {} frames dropped, {} resends",
            self.messages,
            self.frames_sent,
            format_bytes(self.bytes_sent),
            self.frames_abandoned,
            self.retries
        )
    }
}

/// Pulls correction messages and pushes them over the radio, frame by frame.
///
/// Strictly sequential: a message's frames all go out (or are dropped)
/// before the next message is fetched, and a cooldown stalls everything.
pub struct RelayLoop<S: MessageSource, R: RadioLike> {
    source: S,
    sender: LinkSender<R>,
    policy: RetryPolicy,
    frame_size: NonZeroUsize,
    send_timeout: Duration,
    stats: RelayStats,
    torn_down: bool,
}

impl<S: MessageSource, R: RadioLike> RelayLoop<S, R> {
    pub fn new(source: S, radio: R, config: &RelayConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_policy(
            source,
            radio,
            config.frame_size()?,
            config.send_timeout(),
            RetryPolicy::new(config.retry, config.cooldown()),
        ))
    }

    pub fn with_policy(
        source: S,
        radio: R,
        frame_size: NonZeroUsize,
        send_timeout: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            sender: LinkSender::new(radio),
            policy,
            frame_size,
            send_timeout,
            stats: RelayStats::default(),
            torn_down: false,
        }
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Relays until a fatal error, then shuts down. Not resumable.
    pub async fn run(&mut self) -> RelayError {
        let err = self.pump().await;
        log::error!("Relay failed: {err}");
        self.shutdown().await;
        err
    }

    /// Like `run`, but also stops cleanly once `stop` resolves.
    pub async fn run_until<F>(&mut self, stop: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            err = self.pump() => Err(err),
            () = stop => Ok(()),
        };
        match &outcome {
            Ok(()) => log::info!("Shutdown requested"),
            Err(err) => log::error!("Relay failed: {err}"),
        }
        self.shutdown().await;
        outcome
    }

    async fn pump(&mut self) -> RelayError {
        loop {
            let message = match self.source.next_message().await {
                NextMessage::Message(message) => message,
                NextMessage::EndOfStream => return RelayError::SourceExhausted,
                NextMessage::Error(err) => return err.into(),
            };
            if let Err(err) = self.relay_message(&message).await {
                return err;
            }
        }
    }

    async fn relay_message(&mut self, message: &CorrectionMessage) -> Result<(), RelayError> {
        self.stats.messages += 1;
        match message_type(message) {
            Some(kind) => log::debug!("Got RTCM {kind} ({} bytes)", message.len()),
            None => log::debug!("Got message of {} bytes", message.len()),
        }

        for (frame_index, frame) in split(message, self.frame_size).enumerate() {
            self.transmit_frame(frame_index, &frame).await?;
        }
        Ok(())
    }

    async fn transmit_frame(
        &mut self,
        frame_index: usize,
        frame: &Bytes,
    ) -> Result<(), RelayError> {
        let mut attempt = LinkAttempt::new(frame_index);
        loop {
            log::trace!("Sending frame {frame_index}: {}", hex::encode(frame));
            self.sender.send(frame).await?;

            match self.sender.wait_until_sent(self.send_timeout).await {
                Ok(()) => {
                    self.stats.frames_sent += 1;
                    self.stats.bytes_sent += frame.len() as u64;
                    return Ok(());
                }
                Err(err) if err.is_timeout() => {
                    let lost = self.sender.packets_lost().await?;
                    match self.policy.on_timeout(&attempt) {
                        Action::RetryAfterDelay(delay) => {
                            log::warn!(
                                "Timeout waiting for transmission of frame {frame_index} ({lost} packets lost), resending in {delay:?}"
                            );
                            tokio::time::sleep(delay).await;
                            attempt.retries += 1;
                            self.stats.retries += 1;
                        }
                        Action::Abandon { cooldown } => {
                            log::warn!(
                                "Timeout waiting for transmission of frame {frame_index} ({lost} packets lost), dropping it after {cooldown:?}"
                            );
                            tokio::time::sleep(cooldown).await;
                            self.stats.frames_abandoned += 1;
                            return Ok(());
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // Radio off, then the source session, then the radio's I/O handle.
    // Failures are logged and swallowed.
    async fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(err) = self.sender.radio_mut().power_down().await {
            log::error!("Failed to power down the radio: {err}");
        }
        if let Err(err) = self.source.shutdown().await {
            log::error!("Failed to close the correction source: {err}");
        }
        if let Err(err) = self.sender.radio_mut().release().await {
            log::error!("Failed to release the radio: {err}");
        }
        log::info!("Relay stopped: {}", self.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mock::MockSource;
    use crate::transmission::mock::{MockEvent, MockRadio};

    fn relay(source: MockSource, radio: MockRadio) -> RelayLoop<MockSource, MockRadio> {
        RelayLoop::new(source, radio, &RelayConfig::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_frame_size() {
        let (radio, _events) = MockRadio::new();
        let config = RelayConfig {
            frame_size: 0,
            ..Default::default()
        };
        assert!(RelayLoop::new(MockSource::new([]), radio, &config).is_err());
    }

    #[test]
    fn stats_are_readable() {
        let stats = RelayStats {
            messages: 2,
            frames_sent: 5,
            frames_abandoned: 1,
            retries: 0,
            bytes_sent: 140,
        };
        let line = stats.to_string();
        assert!(line.starts_with("2 messages relayed, 5 frames ("));
        assert!(line.ends_with("sent, 1 frames dropped, 0 resends"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_runs_once() {
        let (radio, events) = MockRadio::new();
        let mut relay = relay(MockSource::new([]), radio);

        assert!(matches!(relay.run().await, RelayError::SourceExhausted));
        relay.shutdown().await;

        let power_downs = events
            .drain()
            .filter(|event| *event == MockEvent::PowerDown)
            .count();
        assert_eq!(power_downs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_frames_and_bytes() {
        let (radio, _events) = MockRadio::new();
        let mut relay = relay(
            MockSource::from_messages([vec![1u8; 70], vec![2u8; 32]]),
            radio,
        );

        relay.run().await;
        assert_eq!(
            relay.stats(),
            &RelayStats {
                messages: 2,
                frames_sent: 4,
                frames_abandoned: 0,
                retries: 0,
                bytes_sent: 102,
            }
        );
    }
}
