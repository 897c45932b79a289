pub mod relay;
pub mod retry;
pub mod sending;
pub mod splitting;

pub use relay::{RelayLoop, RelayStats};
pub use retry::{Action, LinkAttempt, RetryPolicy};
pub use sending::LinkSender;
pub use splitting::{Frames, split};
