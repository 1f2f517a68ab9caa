//! rover-cam: live MJPEG camera server with telemetry overlays.
//!
//! Captures frames continuously, overlays joystick/power/CPU/FPS telemetry,
//! streams the result to any number of HTTP clients, and saves snapshots
//! when the debounced controller button fires.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use rover_cam::camera::{
    list_devices, CameraSettings, CameraSource, DeviceSpec, FrameSource, Resolution,
};
use rover_cam::overlay::OverlayRenderer;
use rover_cam::server::{ServerContext, StreamingServer, URL_PATH_MJPG};
use rover_cam::snapshot::{SnapshotWriter, SNAPSHOT_DIR};
use rover_cam::telemetry::{RobotTelemetry, TelemetryState};

/// rover-cam: MJPEG camera streaming server
#[derive(Parser)]
#[command(name = "rover-cam")]
#[command(version, about = "MJPEG camera streaming server with telemetry overlays")]
struct Cli {
    /// Address to bind (default: this machine's outbound IPv4 address)
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Requested frame width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Requested frame height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Document root for the index page
    #[arg(long, default_value = "html")]
    directory: PathBuf,

    /// Capture device: integer index or named backend
    #[arg(long, default_value = "jetson")]
    device: DeviceSpec,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List available cameras
    ListCameras,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(Command::ListCameras) = &cli.command {
        match list_devices() {
            Ok(devices) if devices.is_empty() => println!("No cameras found"),
            Ok(devices) => {
                for device in devices {
                    println!("{}", device);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let settings = CameraSettings {
        device: cli.device.clone(),
        resolution: Resolution {
            width: cli.width,
            height: cli.height,
        },
    };
    // A camera that fails to open is fatal; nothing to serve without it.
    let camera = Arc::new(CameraSource::open(settings)?);
    let actual = camera.actual_resolution();
    log::info!(
        "camera '{}' open at {}x{}",
        cli.device,
        actual.width,
        actual.height
    );

    let telemetry = Arc::new(TelemetryState::new());
    let snapshots = SnapshotWriter::new(SNAPSHOT_DIR)?;

    // The messaging transport invokes this subscriber as joystick/power/CPU
    // messages arrive; it lives for the whole process.
    let _telemetry_feed = RobotTelemetry::new(Arc::clone(&telemetry));

    let running = Arc::new(AtomicBool::new(true));
    setup_ctrlc_handler(Arc::clone(&running))?;

    let bind = cli.bind.unwrap_or_else(default_bind_addr);
    let addr = SocketAddr::new(bind, cli.port);
    let ctx = ServerContext {
        source: Arc::clone(&camera) as Arc<dyn FrameSource>,
        telemetry,
        renderer: OverlayRenderer::new(),
        snapshots,
        document_root: cli.directory,
        running: Arc::clone(&running),
    };
    let server = Arc::new(StreamingServer::bind(addr, ctx)?);
    log::info!("stream at http://{}{}", server.local_addr(), URL_PATH_MJPG);

    let accept_thread = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.run())
    };

    while running.load(Ordering::SeqCst) && camera.is_open() {
        thread::sleep(Duration::from_millis(100));
    }

    log::info!("server is stopping ...");
    running.store(false, Ordering::SeqCst);
    // Wakes every per-connection loop; released exactly once no matter how
    // many connections are active.
    camera.release();
    let _ = accept_thread.join();
    server.join_workers(Duration::from_secs(2));

    Ok(())
}

fn setup_ctrlc_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

/// Best-effort discovery of the address clients can reach us on (the
/// wireless interface on the robot). Connecting a UDP socket sends no
/// packets; it only resolves the outbound interface.
fn default_bind_addr() -> IpAddr {
    let fallback = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    let Ok(socket) = UdpSocket::bind(("0.0.0.0", 0)) else {
        return fallback;
    };
    if socket.connect(("8.8.8.8", 80)).is_err() {
        return fallback;
    }
    socket.local_addr().map(|a| a.ip()).unwrap_or(fallback)
}
