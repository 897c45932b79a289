pub mod mock;
pub mod ntrip;

use bytes::Bytes;

use crate::error::{SourceError, SourceResult};

/// One whole RTCM message, opaque to the relay.
pub type CorrectionMessage = Bytes;

#[derive(Debug)]
pub enum NextMessage {
    Message(CorrectionMessage),
    EndOfStream,
    Error(SourceError),
}

/// A connected stream of correction messages, pulled one at a time.
#[async_trait::async_trait]
pub trait MessageSource: Send {
    /// Waits for the next message. There is no timeout here; a stalled
    /// stream stalls the caller.
    async fn next_message(&mut self) -> NextMessage;

    /// Releases the session. Called once, during shutdown.
    async fn shutdown(&mut self) -> SourceResult<()> {
        Ok(())
    }
}
