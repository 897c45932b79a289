use anyhow::anyhow;
use clap::Parser;
use owo_colors::OwoColorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use rtcmrelay::config::validate_address;
use rtcmrelay::constants::DEFAULT_RF_ADDRESS;
use rtcmrelay::rtcm::message_type;
use rtcmrelay::transmission::sink::RadioSink;
use rtcmrelay::util::{format_bytes, log::init as init_log};

#[derive(Parser, Debug)]
#[command(author, version, about = "Receiving end of the radio link: acknowledges frames and reassembles RTCM", long_about = None)]
struct Args {
    /// Listening addr
    #[arg(short, long, value_name = "LISTEN", default_value = "0.0.0.0:24024")]
    listening: SocketAddr,

    /// Radio pipe address this sink answers to.
    #[arg(short, long, value_name = "ADDRESS", env = "RF_ADDRESS", default_value = DEFAULT_RF_ADDRESS)]
    address: String,

    /// Append reassembled RTCM to this file, e.g. the receiver's serial device.
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Increase logging verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_log(args.verbose);
    validate_address(&args.address)?;

    let mut output = match &args.output {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|err| anyhow!("Failed to open {}: {err}", path.display()))?,
        ),
        None => None,
    };

    let mut sink = RadioSink::bind(args.listening, &args.address).await?;
    println!(
        "Listening on {} for pipe {}",
        sink.local_addr()?.magenta(),
        args.address.green()
    );

    let mut received: u64 = 0;
    loop {
        sink.receive().await?;

        while let Some(message) = sink.next_message() {
            received += message.len() as u64;
            match message_type(&message) {
                Some(kind) => println!(
                    "RTCM {:>4} {:>5} bytes  (total {})",
                    kind.green(),
                    message.len(),
                    format_bytes(received).blue()
                ),
                None => println!("RTCM ---- {:>5} bytes", message.len()),
            }
            if let Some(file) = output.as_mut() {
                file.write_all(&message).await?;
                file.flush().await?;
            }
        }
    }
}
