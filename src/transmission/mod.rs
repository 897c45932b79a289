pub mod mock;
pub mod real;
pub mod sink;

use std::time::Duration;

use crate::error::LinkResult;

/// The primitives of a point-to-point, auto-acknowledged radio pipe.
///
/// Address, channel and payload configuration happen before the handle is
/// constructed; the relay only drives the transmit side.
#[async_trait::async_trait]
pub trait RadioLike: Send {
    async fn reset_lost_counter(&mut self) -> LinkResult<()>;
    async fn send(&mut self, payload: &[u8]) -> LinkResult<()>;
    /// Resolves once the peer acknowledged the last payload, or fails with
    /// `LinkError::Timeout` when `timeout` elapses first.
    async fn wait_until_sent(&mut self, timeout: Duration) -> LinkResult<()>;
    async fn packets_lost(&mut self) -> LinkResult<u8>;
    async fn power_down(&mut self) -> LinkResult<()>;

    /// Releases the I/O handle underneath the radio.
    async fn release(&mut self) -> LinkResult<()> {
        Ok(())
    }
}
