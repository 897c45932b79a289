use super::RadioLike;
use crate::error::{LinkError, LinkResult};
use async_trait::async_trait;
use bytes::Bytes;
use flume::{Receiver, Sender};
use std::collections::VecDeque;
use std::time::Duration;

/// Everything that happens to the mock radio and mock source, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    ResetLostCounter,
    Send(Bytes),
    Confirmed,
    TimedOut,
    HardwareFailure,
    PowerDown,
    Release,
    SourceShutdown,
}

/// What the next `wait_until_sent` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Sent,
    Timeout,
    Disconnected,
}

pub struct MockRadio {
    outcomes: VecDeque<WaitOutcome>,
    events: Sender<MockEvent>,
    lost: u8,
    powered: bool,
    fail_power_down: bool,
}

impl MockRadio {
    pub fn new() -> (Self, Receiver<MockEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self::with_events(tx), rx)
    }

    pub fn with_events(events: Sender<MockEvent>) -> Self {
        Self {
            outcomes: VecDeque::new(),
            events,
            lost: 0,
            powered: true,
            fail_power_down: false,
        }
    }

    /// Outcomes for the following waits; once exhausted every wait succeeds.
    pub fn script(mut self, outcomes: impl IntoIterator<Item = WaitOutcome>) -> Self {
        self.outcomes.extend(outcomes);
        self
    }

    pub fn failing_power_down(mut self) -> Self {
        self.fail_power_down = true;
        self
    }

    fn record(&self, event: MockEvent) {
        // The observer may have gone away.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl RadioLike for MockRadio {
    async fn reset_lost_counter(&mut self) -> LinkResult<()> {
        self.lost = 0;
        self.record(MockEvent::ResetLostCounter);
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> LinkResult<()> {
        if !self.powered {
            return Err(LinkError::Hardware("radio is powered down".into()));
        }
        self.record(MockEvent::Send(Bytes::copy_from_slice(payload)));
        Ok(())
    }

    async fn wait_until_sent(&mut self, timeout: Duration) -> LinkResult<()> {
        match self.outcomes.pop_front().unwrap_or(WaitOutcome::Sent) {
            WaitOutcome::Sent => {
                self.record(MockEvent::Confirmed);
                Ok(())
            }
            WaitOutcome::Timeout => {
                tokio::time::sleep(timeout).await;
                self.lost = self.lost.saturating_add(1);
                self.record(MockEvent::TimedOut);
                Err(LinkError::Timeout(timeout))
            }
            WaitOutcome::Disconnected => {
                self.record(MockEvent::HardwareFailure);
                Err(LinkError::Hardware("radio disconnected".into()))
            }
        }
    }

    async fn packets_lost(&mut self) -> LinkResult<u8> {
        Ok(self.lost)
    }

    async fn power_down(&mut self) -> LinkResult<()> {
        self.powered = false;
        self.record(MockEvent::PowerDown);
        if self.fail_power_down {
            return Err(LinkError::Hardware("power down not acknowledged".into()));
        }
        Ok(())
    }

    async fn release(&mut self) -> LinkResult<()> {
        self.record(MockEvent::Release);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_mock_radio_script() -> LinkResult<()> {
    let (radio, events) = MockRadio::new();
    let mut radio = radio.script([WaitOutcome::Timeout, WaitOutcome::Disconnected]);

    radio.reset_lost_counter().await?;
    radio.send(b"abc").await?;
    let start = tokio::time::Instant::now();
    assert!(radio.wait_until_sent(Duration::from_millis(500)).await.unwrap_err().is_timeout());
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert_eq!(radio.packets_lost().await?, 1);

    assert!(matches!(
        radio.wait_until_sent(Duration::from_millis(500)).await,
        Err(LinkError::Hardware(_))
    ));
    radio.wait_until_sent(Duration::from_millis(500)).await?;

    radio.power_down().await?;
    assert!(radio.send(b"late").await.is_err());

    assert_eq!(
        events.drain().collect::<Vec<_>>(),
        vec![
            MockEvent::ResetLostCounter,
            MockEvent::Send(Bytes::from_static(b"abc")),
            MockEvent::TimedOut,
            MockEvent::HardwareFailure,
            MockEvent::Confirmed,
            MockEvent::PowerDown,
        ]
    );
    Ok(())
}
