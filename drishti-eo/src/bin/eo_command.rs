//! Command sender - toggles streaming/display on a Drishti EO node
//!
//! ```sh
//! eo_command <enable-stream|disable-stream|enable-display|disable-display> [host] [port]
//! ```
//!
//! Sends a single 5-byte command frame. The node never answers; check its
//! log (or the video stream) to see the effect.

use std::net::UdpSocket;

use drishti_eo::config::DEFAULT_COMMAND_PORT;
use drishti_eo::streaming::{Command, encode_command};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        eprintln!(
            "Usage: eo_command <enable-stream|disable-stream|enable-display|disable-display> [host] [port]"
        );
        std::process::exit(1);
    };
    let command: Command = name.parse()?;
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match args.next() {
        Some(port) => port.parse::<u16>()?,
        None => DEFAULT_COMMAND_PORT,
    };
    let address = format!("{}:{}", host, port);

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    let frame = encode_command(command);
    socket.send_to(&frame, &address)?;

    log::info!("Sent {} ({:02X?}) to {}", command.name(), frame, address);
    Ok(())
}
