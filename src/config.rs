use directories::ProjectDirs;
use serde::Deserialize;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_COOLDOWN, DEFAULT_FRAME_SIZE, DEFAULT_NTRIP_PORT, DEFAULT_RETRANSMIT_DELAY,
    DEFAULT_RF_ADDRESS, DEFAULT_SEND_TIMEOUT, MAX_FRAME_SIZE, MAX_RF_ADDRESS_LEN,
    MIN_RF_ADDRESS_LEN,
};
use crate::error::ConfigError;

/// What the relay does with a frame whose transmission timed out.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryMode {
    /// Cool down, then move on to the next frame. The timed-out frame is lost.
    #[default]
    Abandon,
    /// Cool down and send the same frame again, at most `max_retries` times.
    Resend { max_retries: u32 },
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub frame_size: usize,
    pub send_timeout_ms: u64,
    pub cooldown_secs: u64,
    pub retry: RetryMode,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT.as_millis() as u64,
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
            retry: RetryMode::Abandon,
        }
    }
}

impl RelayConfig {
    pub fn frame_size(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.frame_size)
            .filter(|size| size.get() <= MAX_FRAME_SIZE)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "frame_size must be between 1 and {MAX_FRAME_SIZE}, got {}",
                    self.frame_size
                ))
            })
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NtripConfig {
    pub host: String,
    pub port: u16,
    pub mountpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for NtripConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_NTRIP_PORT,
            mountpoint: String::new(),
            username: None,
            password: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RadioConfig {
    /// Pipe address, 3 to 5 ASCII characters.
    pub address: String,
    pub bind: SocketAddr,
    pub peer: SocketAddr,
    pub retransmit_delay_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_RF_ADDRESS.into(),
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            peer: SocketAddr::from(([127, 0, 0, 1], 24024)),
            retransmit_delay_ms: DEFAULT_RETRANSMIT_DELAY.as_millis() as u64,
        }
    }
}

impl RadioConfig {
    pub fn retransmit_delay(&self) -> Duration {
        Duration::from_millis(self.retransmit_delay_ms)
    }
}

pub fn validate_address(address: &str) -> Result<(), ConfigError> {
    let length_ok = (MIN_RF_ADDRESS_LEN..=MAX_RF_ADDRESS_LEN).contains(&address.len());
    if !length_ok || !address.is_ascii() {
        return Err(ConfigError::Invalid(format!(
            "invalid address {address:?}, addresses must be {MIN_RF_ADDRESS_LEN} to {MAX_RF_ADDRESS_LEN} ASCII characters"
        )));
    }
    Ok(())
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub relay: RelayConfig,
    pub ntrip: NtripConfig,
    pub radio: RadioConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let toml_str = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_str)?)
    }

    /// `relay.toml` in the platform config directory, e.g. `~/.config/rtcmrelay/`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "rtcmrelay").map(|dirs| dirs.config_dir().join("relay.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.relay.frame_size()?;
        if self.relay.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid("send_timeout_ms must be positive".into()));
        }
        if self.ntrip.host.is_empty() {
            return Err(ConfigError::Missing("ntrip.host"));
        }
        if self.ntrip.mountpoint.is_empty() {
            return Err(ConfigError::Missing("ntrip.mountpoint"));
        }
        validate_address(&self.radio.address)
    }
}
