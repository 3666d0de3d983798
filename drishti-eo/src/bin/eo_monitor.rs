//! Telemetry monitor - prints every bearing record a Drishti EO node sends
//!
//! Connects to the telemetry port, retrying once a second until the node is
//! up, and reconnects the same way if the node goes away.
//!
//! ```sh
//! eo_monitor [host] [port]        # defaults: 127.0.0.1 3456
//! RUST_LOG=debug eo_monitor 192.168.1.20
//! ```

use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use drishti_eo::config::DEFAULT_TELEMETRY_PORT;
use drishti_eo::streaming::TelemetryDecoder;
use drishti_eo::utils::setup_ctrl_c_handler;

const RETRY_INTERVAL: Duration = Duration::from_secs(1);
const READ_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match args.next() {
        Some(port) => port.parse::<u16>()?,
        None => DEFAULT_TELEMETRY_PORT,
    };
    let address = format!("{}:{}", host, port);

    let running = setup_ctrl_c_handler()?;
    let mut total: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let stream = match TcpStream::connect(&address) {
            Ok(stream) => stream,
            Err(e) => {
                log::debug!("Connect to {} failed: {}; retrying", address, e);
                thread::sleep(RETRY_INTERVAL);
                continue;
            }
        };
        log::info!("Connected to {}", address);
        total += monitor(stream, &running)?;
        log::info!("Disconnected from {}", address);
    }

    log::info!("Received {} records", total);
    Ok(())
}

/// Print records until the connection closes or Ctrl-C; returns the count
fn monitor(mut stream: TcpStream, running: &AtomicBool) -> std::io::Result<u64> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut decoder = TelemetryDecoder::new();
    let mut buffer = [0u8; 1024];
    let mut count = 0;

    while running.load(Ordering::SeqCst) {
        let n = match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Read error: {}", e);
                break;
            }
        };

        for record in decoder.push(&buffer[..n]) {
            count += 1;
            println!(
                "t={:.6}  az={:+.2}  el={:+.2}  dist={:.2}",
                record.timestamp, record.azimuth, record.elevation, record.distance
            );
        }
    }

    if decoder.discarded_bytes() > 0 {
        log::warn!("{} corrupt bytes discarded", decoder.discarded_bytes());
    }
    Ok(count)
}
