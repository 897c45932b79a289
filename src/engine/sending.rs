use std::time::Duration;

use crate::error::LinkResult;
use crate::transmission::RadioLike;

/// Sole owner of the radio's transmit side.
///
/// Transport mechanics only: a timeout is reported to the caller, never
/// retried here.
pub struct LinkSender<R: RadioLike> {
    radio: R,
}

impl<R: RadioLike> LinkSender<R> {
    pub fn new(radio: R) -> Self {
        Self { radio }
    }

    /// Clears the lost-packet counter, then hands `frame` to the radio.
    pub async fn send(&mut self, frame: &[u8]) -> LinkResult<()> {
        self.radio.reset_lost_counter().await?;
        self.radio.send(frame).await
    }

    pub async fn wait_until_sent(&mut self, timeout: Duration) -> LinkResult<()> {
        self.radio.wait_until_sent(timeout).await
    }

    /// Packets lost since the last `send`.
    pub async fn packets_lost(&mut self) -> LinkResult<u8> {
        self.radio.packets_lost().await
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmission::mock::{MockEvent, MockRadio, WaitOutcome};
    use bytes::Bytes;

    #[tokio::test(start_paused = true)]
    async fn test_counter_reset_precedes_every_send() -> LinkResult<()> {
        let (radio, events) = MockRadio::new();
        let mut sender = LinkSender::new(radio.script([WaitOutcome::Timeout]));

        sender.send(b"one").await?;
        let err = sender
            .wait_until_sent(Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(sender.packets_lost().await?, 1);

        sender.send(b"two").await?;
        assert_eq!(sender.packets_lost().await?, 0);
        sender.wait_until_sent(Duration::from_millis(500)).await?;

        assert_eq!(
            events.drain().collect::<Vec<_>>(),
            vec![
                MockEvent::ResetLostCounter,
                MockEvent::Send(Bytes::from_static(b"one")),
                MockEvent::TimedOut,
                MockEvent::ResetLostCounter,
                MockEvent::Send(Bytes::from_static(b"two")),
                MockEvent::Confirmed,
            ]
        );
        Ok(())
    }
}
