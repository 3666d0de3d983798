//! Drishti EO - tracking node daemon
//!
//! ## Protocol Architecture
//!
//! - **TCP (port 3456)**: Telemetry to every connected consumer (JSON, best-effort)
//! - **UDP (port 2468)**: Commands in (5-byte frames, fire-and-forget)
//! - **UDP (optional)**: Video frames out to one viewer while streaming is enabled
//!
//! The camera is only read while at least one telemetry client is connected.

use std::env;
use std::process;

use drishti_eo::config::AppConfig;
use drishti_eo::devices::{LogDisplay, RawRecorder, create_frame_source};
use drishti_eo::error::{Error, Result};
use drishti_eo::state::SharedFlags;
use drishti_eo::streaming::{CommandListener, ServerOptions, TelemetryServer, UdpFrameStreamer};
use drishti_eo::tracker::{ControlLoop, ControlLoopConfig};
use drishti_eo::tracking::ZeroProcessor;
use drishti_eo::utils::setup_ctrl_c_handler;

const USAGE: &str = "\
Usage: drishti-eo [OPTIONS]

Options:
  -c, --config <path>      Configuration file (TOML)
  -d, --device <path>      Camera device or recording to replay
  -r, --rate <hz>          Telemetry publish rate
  -v, --visual             Show every frame on the display output
  -s, --save <path>        Record processed frames to a file
  -t, --stream <ip> <port> Stream processed frames to a viewer
  -h, --help               Print this help";

/// Command-line overrides on top of the configuration file
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<String>,
    device: Option<String>,
    rate: Option<f64>,
    visual: bool,
    save: Option<String>,
    stream: Option<String>,
    help: bool,
}

/// Parse command-line arguments (program name excluded)
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    fn value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> Result<String> {
        args.next()
            .ok_or_else(|| Error::InvalidParameter(format!("{} requires a value", flag)))
    }

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => parsed.config = Some(value(&mut args, &arg)?),
            "-d" | "--device" => parsed.device = Some(value(&mut args, &arg)?),
            "-r" | "--rate" => {
                let raw = value(&mut args, &arg)?;
                let rate = raw
                    .parse::<f64>()
                    .map_err(|_| Error::InvalidParameter(format!("invalid rate '{}'", raw)))?;
                parsed.rate = Some(rate);
            }
            "-v" | "--visual" => parsed.visual = true,
            "-s" | "--save" => parsed.save = Some(value(&mut args, &arg)?),
            "-t" | "--stream" => {
                let ip = value(&mut args, &arg)?;
                let port = value(&mut args, &arg)?;
                parsed.stream = Some(format!("{}:{}", ip, port));
            }
            "-h" | "--help" => parsed.help = true,
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unexpected argument '{}'",
                    other
                )));
            }
        }
    }

    Ok(parsed)
}

/// Load the configuration file (or defaults) and apply overrides
fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    if let Some(device) = &args.device {
        config.camera.device = device.clone();
    }
    if let Some(rate) = args.rate {
        config.tracking.publish_rate_hz = rate;
    }
    if args.visual {
        config.tracking.display = true;
    }
    if let Some(path) = &args.save {
        config.tracking.record_path = Some(path.clone());
    }
    if let Some(target) = &args.stream {
        config.tracking.stream_target = Some(target.clone());
    }

    config.validate()?;
    Ok(config)
}

fn run(config: AppConfig) -> Result<()> {
    let running = setup_ctrl_c_handler()?;
    let flags = SharedFlags::default();

    log::info!(
        "Camera: {} ({}x{} @ {} fps, downscale /{})",
        config.camera.source,
        config.camera.width,
        config.camera.height,
        config.camera.fps,
        config.camera.scale_divisor
    );
    log::info!("Publish rate: {} Hz", config.tracking.publish_rate_hz);

    let mut server = TelemetryServer::start_with_options(
        &config.telemetry.bind_address,
        config.telemetry.port,
        ServerOptions {
            poll_timeout: config.telemetry.poll_timeout(),
            write_timeout: config.telemetry.write_timeout(),
        },
    )?;
    let mut listener = CommandListener::start_with_timeout(
        &config.command.bind_address,
        config.command.port,
        flags.clone(),
        config.command.poll_timeout(),
    )?;

    let source = create_frame_source(&config.camera)?;
    let mut control = ControlLoop::new(
        ControlLoopConfig::from_app(&config),
        source,
        Box::new(ZeroProcessor),
        flags,
        running,
    )
    .with_display(Box::new(LogDisplay::default()));

    if let Some(path) = &config.tracking.record_path {
        control = control.with_recorder(Box::new(RawRecorder::create(path)?));
    }
    if let Some(target) = config.tracking.stream_addr()? {
        control = control.with_streamer(Box::new(UdpFrameStreamer::new(target)?));
    }

    log::info!("Drishti EO running. Press Ctrl-C to stop.");
    let summary = control.run(&server);
    drop(control);

    listener.stop();
    server.stop();

    let commands = listener.stats();
    let telemetry = server.stats();
    log::info!(
        "Shutdown complete: {} frames, {} records, {} clients served, {} commands applied",
        summary.frames_processed,
        summary.records_published,
        telemetry.accepted,
        commands.applied
    );
    Ok(())
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            process::exit(1);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return;
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("Drishti EO v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}
