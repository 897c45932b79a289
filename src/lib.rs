pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod rtcm;
pub mod source;
pub mod transmission;
pub mod util;
