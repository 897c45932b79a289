use std::time::Duration;

use crate::config::RetryMode;

/// The frame currently on the air and how it has fared so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAttempt {
    pub frame_index: usize,
    pub retries: u32,
}

impl LinkAttempt {
    pub fn new(frame_index: usize) -> Self {
        Self {
            frame_index,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Sleep, then transmit the same frame again.
    RetryAfterDelay(Duration),
    /// Sleep, then drop the frame and continue with the next one.
    Abandon { cooldown: Duration },
}

/// Decides what happens after a transmission timeout.
///
/// Every timeout costs one cooldown. In `Abandon` mode the frame is then
/// skipped without a second transmission; whether that loss is intended or
/// the resend was simply never implemented is unresolved, so `Resend` is
/// offered as an opt-in alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    mode: RetryMode,
    cooldown: Duration,
}

impl RetryPolicy {
    pub fn new(mode: RetryMode, cooldown: Duration) -> Self {
        Self { mode, cooldown }
    }

    pub fn on_timeout(&self, attempt: &LinkAttempt) -> Action {
        match self.mode {
            RetryMode::Resend { max_retries } if attempt.retries < max_retries => {
                Action::RetryAfterDelay(self.cooldown)
            }
            _ => Action::Abandon {
                cooldown: self.cooldown,
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryMode::Abandon, crate::constants::DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(10);

    #[test]
    fn abandon_never_retries() {
        let policy = RetryPolicy::default();
        let mut attempt = LinkAttempt::new(3);
        for _ in 0..3 {
            assert_eq!(
                policy.on_timeout(&attempt),
                Action::Abandon { cooldown: COOLDOWN }
            );
            attempt.retries += 1;
        }
    }

    #[test]
    fn resend_until_limit() {
        let policy = RetryPolicy::new(RetryMode::Resend { max_retries: 2 }, COOLDOWN);
        let mut attempt = LinkAttempt::new(0);

        assert_eq!(policy.on_timeout(&attempt), Action::RetryAfterDelay(COOLDOWN));
        attempt.retries += 1;
        assert_eq!(policy.on_timeout(&attempt), Action::RetryAfterDelay(COOLDOWN));
        attempt.retries += 1;
        assert_eq!(
            policy.on_timeout(&attempt),
            Action::Abandon { cooldown: COOLDOWN }
        );
    }

    #[test]
    fn resend_with_zero_retries_is_abandon() {
        let policy = RetryPolicy::new(RetryMode::Resend { max_retries: 0 }, COOLDOWN);
        assert_eq!(
            policy.on_timeout(&LinkAttempt::new(0)),
            Action::Abandon { cooldown: COOLDOWN }
        );
    }
}
