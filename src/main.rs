use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use std::net::SocketAddr;
use std::path::PathBuf;

use rtcmrelay::config::{Config, RetryMode};
use rtcmrelay::engine::RelayLoop;
use rtcmrelay::source::ntrip::NtripClient;
use rtcmrelay::transmission::real::UdpRadio;
use rtcmrelay::util::log::init as init_log;

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay RTCM corrections from an NTRIP caster over a radio link", long_about = None)]
struct Args {
    /// The path to the config file (TOML format).
    #[arg(short, long, value_name = "CONFIG", env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "HOST", env = "NTRIP_HOST")]
    ntrip_host: Option<String>,

    #[arg(long, value_name = "PORT", env = "NTRIP_PORT")]
    ntrip_port: Option<u16>,

    #[arg(long, value_name = "MOUNTPOINT", env = "NTRIP_MOUNTPOINT")]
    mountpoint: Option<String>,

    #[arg(long, value_name = "USERNAME", env = "NTRIP_USERNAME")]
    username: Option<String>,

    #[arg(long, value_name = "PASSWORD", env = "NTRIP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Radio pipe address, 3 to 5 ASCII characters.
    #[arg(short, long, value_name = "ADDRESS", env = "RF_ADDRESS")]
    address: Option<String>,

    /// Local address of the radio link socket.
    #[arg(long, value_name = "BIND")]
    bind: Option<SocketAddr>,

    /// Address of the far end of the radio link.
    #[arg(long, value_name = "PEER")]
    peer: Option<SocketAddr>,

    #[arg(long, value_name = "BYTES")]
    frame_size: Option<usize>,

    /// Resend a timed-out frame up to N times instead of dropping it.
    #[arg(long, value_name = "N")]
    resend: Option<u32>,

    /// Increase logging verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => match Config::default_path().filter(|path| path.is_file()) {
                Some(path) => {
                    log::info!("Using config {}", path.display());
                    Config::load(&path)?
                }
                None => Config::default(),
            },
        };

        if let Some(host) = &self.ntrip_host {
            config.ntrip.host = host.clone();
        }
        if let Some(port) = self.ntrip_port {
            config.ntrip.port = port;
        }
        if let Some(mountpoint) = &self.mountpoint {
            config.ntrip.mountpoint = mountpoint.clone();
        }
        if self.username.is_some() {
            config.ntrip.username = self.username.clone();
        }
        if self.password.is_some() {
            config.ntrip.password = self.password.clone();
        }
        if let Some(address) = &self.address {
            config.radio.address = address.clone();
        }
        if let Some(bind) = self.bind {
            config.radio.bind = bind;
        }
        if let Some(peer) = self.peer {
            config.radio.peer = peer;
        }
        if let Some(frame_size) = self.frame_size {
            config.relay.frame_size = frame_size;
        }
        if let Some(max_retries) = self.resend {
            config.relay.retry = RetryMode::Resend { max_retries };
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_log(args.verbose);

    let config = args.load_config()?;

    let radio = UdpRadio::bind(
        config.radio.bind,
        config.radio.peer,
        &config.radio.address,
        config.radio.retransmit_delay(),
    )
    .await
    .context("Failed to open the radio link")?;

    let source = NtripClient::connect(&config.ntrip)
        .await
        .context("Not connected to NTRIP server")?;

    println!(
        "Send to {} {} via {}",
        "radio".blue(),
        config.radio.address.green(),
        config.radio.peer.magenta()
    );
    log::info!(
        "Frames of {} bytes, {} ms send timeout, {} s cooldown, {:?}",
        config.relay.frame_size,
        config.relay.send_timeout_ms,
        config.relay.cooldown_secs,
        config.relay.retry
    );

    let mut relay = RelayLoop::new(source, radio, &config.relay)?;
    let stop = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    match relay.run_until(stop).await {
        Ok(()) => {
            println!("{}", "Stopped.".yellow());
            Ok(())
        }
        Err(err) => {
            eprintln!("{}: {err}", "Relay failed".red());
            Err(err.into())
        }
    }
}
