use std::time::Duration;

/// Largest payload a single NRF24 transmission can carry.
pub const MAX_FRAME_SIZE: usize = 32;
pub const DEFAULT_FRAME_SIZE: usize = MAX_FRAME_SIZE;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRANSMIT_DELAY: Duration = Duration::from_millis(50);

pub const DEFAULT_RF_ADDRESS: &str = "NTRIP";
pub const MIN_RF_ADDRESS_LEN: usize = 3;
pub const MAX_RF_ADDRESS_LEN: usize = 5;

pub const DEFAULT_NTRIP_PORT: u16 = 2101;
pub const NTRIP_USER_AGENT: &str = concat!("NTRIP rtcmrelay/", env!("CARGO_PKG_VERSION"));

pub const RTCM_PREAMBLE: u8 = 0xD3;
pub const RTCM_HEADER_LEN: usize = 3;
pub const RTCM_CRC_LEN: usize = 3;
pub const RTCM_MAX_PAYLOAD_LEN: usize = 1023;
