//! Full node scenarios over real sockets on ephemeral ports

use std::io::{ErrorKind, Read};
use std::net::{TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use drishti_eo::devices::SyntheticCamera;
use drishti_eo::state::SharedFlags;
use drishti_eo::streaming::{
    CommandListener, ServerOptions, TelemetryDecoder, TelemetryRecord, TelemetryServer,
};
use drishti_eo::tracker::{CloseReason, ControlLoop, ControlLoopConfig, SessionSummary};
use drishti_eo::tracking::ZeroProcessor;

const POLL: Duration = Duration::from_millis(50);

fn start_server() -> TelemetryServer {
    TelemetryServer::start_with_options(
        "127.0.0.1",
        0,
        ServerOptions {
            poll_timeout: POLL,
            write_timeout: Duration::from_millis(500),
        },
    )
    .unwrap()
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

fn loop_config(publish_interval: Duration) -> ControlLoopConfig {
    ControlLoopConfig {
        publish_interval,
        client_poll_interval: Duration::from_millis(10),
        scale_divisor: 2,
        display: false,
        wait_for_reconnect: false,
    }
}

/// Run a control loop over a small synthetic camera on its own thread
fn spawn_control_loop(
    server: Arc<TelemetryServer>,
    flags: SharedFlags,
    running: Arc<AtomicBool>,
    publish_interval: Duration,
) -> thread::JoinHandle<SessionSummary> {
    thread::spawn(move || {
        let camera = SyntheticCamera::new(64, 48, 100, None, 11).unwrap();
        let mut control = ControlLoop::new(
            loop_config(publish_interval),
            Box::new(camera),
            Box::new(ZeroProcessor),
            flags,
            running,
        );
        control.run(&*server)
    })
}

/// Collect records from a telemetry client for `duration`
fn read_records(client: &mut TcpStream, duration: Duration) -> Vec<TelemetryRecord> {
    client
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();
    let mut decoder = TelemetryDecoder::new();
    let mut records = Vec::new();
    let mut buffer = [0u8; 4096];
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        match client.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => records.extend(decoder.push(&buffer[..n])),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => panic!("telemetry read failed: {}", e),
        }
    }
    assert_eq!(decoder.discarded_bytes(), 0);
    records
}

#[test]
fn command_then_periodic_telemetry() {
    let server = Arc::new(start_server());
    let flags = SharedFlags::default();
    let mut listener =
        CommandListener::start_with_timeout("127.0.0.1", 0, flags.clone(), POLL).unwrap();

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    wait_until("client registration", || server.connection_count() == 1);

    let commander = UdpSocket::bind("127.0.0.1:0").unwrap();
    commander
        .send_to(&[0xA5, 0xE1, 0x01, 0x01, 0xCB], listener.local_addr())
        .unwrap();
    wait_until("stream flag", || flags.is_stream_enabled());
    assert!(!flags.is_display_enabled());

    // A 4-byte datagram is dropped without touching the flags
    commander
        .send_to(&[0xA5, 0xE1, 0x01, 0xCB], listener.local_addr())
        .unwrap();
    wait_until("malformed datagram", || listener.stats().malformed == 1);
    assert!(flags.is_stream_enabled());

    let running = Arc::new(AtomicBool::new(true));
    let interval = Duration::from_millis(200);
    let handle = spawn_control_loop(
        Arc::clone(&server),
        flags.clone(),
        Arc::clone(&running),
        interval,
    );

    let records = read_records(&mut client, Duration::from_millis(1100));
    running.store(false, Ordering::SeqCst);
    let summary = handle.join().unwrap();

    assert_eq!(summary.close_reason, CloseReason::Stopped);
    assert!(records.len() >= 3, "only {} records", records.len());
    assert!(records.len() <= 7, "{} records exceeds the publish rate", records.len());
    assert!(summary.frames_processed > summary.records_published);
    for record in &records {
        assert_eq!(record.azimuth, 0.0);
        assert_eq!(record.elevation, 0.0);
        assert_eq!(record.distance, 0.0);
        assert!((0.0..86400.0).contains(&record.timestamp));
    }
    for pair in records.windows(2) {
        let gap = pair[1].timestamp - pair[0].timestamp;
        // Skip the wrap at local midnight
        if gap >= 0.0 {
            assert!(gap >= 0.19, "records only {:.3}s apart", gap);
        }
    }

    listener.stop();
    let mut server = Arc::try_unwrap(server).ok().unwrap();
    server.stop();
}

#[test]
fn every_client_gets_identical_payload() {
    let server = start_server();
    let mut clients: Vec<TcpStream> = (0..3)
        .map(|_| TcpStream::connect(server.local_addr()).unwrap())
        .collect();
    wait_until("three clients", || server.connection_count() == 3);

    let payload = br#"{"timestamp":1.5,"azimuth":2.0,"elevation":-3.0,"distance":0.0}"#;
    assert_eq!(server.broadcast(payload), 3);

    for client in &mut clients {
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut received = vec![0u8; payload.len()];
        client.read_exact(&mut received).unwrap();
        assert_eq!(&received[..], &payload[..]);
    }
}

#[test]
fn session_ends_when_last_client_leaves() {
    let server = Arc::new(start_server());
    let running = Arc::new(AtomicBool::new(true));

    let client = TcpStream::connect(server.local_addr()).unwrap();
    wait_until("client registration", || server.connection_count() == 1);

    let handle = spawn_control_loop(
        Arc::clone(&server),
        SharedFlags::default(),
        Arc::clone(&running),
        Duration::from_millis(20),
    );

    thread::sleep(Duration::from_millis(200));
    drop(client);

    let summary = handle.join().unwrap();
    assert_eq!(summary.close_reason, CloseReason::ClientsDisconnected);
    assert!(summary.records_published >= 1);
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn stop_closes_clients_and_sockets() {
    let mut server = start_server();
    let addr = server.local_addr();
    let mut client = TcpStream::connect(addr).unwrap();
    wait_until("client registration", || server.connection_count() == 1);

    let mut listener =
        CommandListener::start_with_timeout("127.0.0.1", 0, SharedFlags::default(), POLL).unwrap();
    let command_addr = listener.local_addr();

    server.stop();
    listener.stop();

    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut buffer = [0u8; 16];
    let closed = match client.read(&mut buffer) {
        Ok(0) => true,
        Err(e) => e.kind() == ErrorKind::ConnectionReset,
        Ok(_) => false,
    };
    assert!(closed, "client still open after stop");

    assert_eq!(server.connection_count(), 0);
    assert!(UdpSocket::bind(command_addr).is_ok());
}
