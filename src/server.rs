//! Threaded HTTP server for the live MJPEG stream.
//!
//! One thread per accepted connection. Every connection shares the same
//! frame source and telemetry store; each runs its own
//! capture/render/encode/send loop at whatever pace its client sustains.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;

use crate::camera::{CameraError, Frame, FrameSource};
use crate::overlay::{OverlayRenderer, MODE_PAUSED};
use crate::snapshot::SnapshotWriter;
use crate::telemetry::TelemetryState;

/// Route serving the MJPEG stream.
pub const URL_PATH_MJPG: &str = "/camera.mjpg";
/// Route answered with a plain-text 404.
pub const URL_PATH_FAVICON: &str = "/favicon.ico";

/// Multipart boundary marker, written verbatim before every frame part and
/// advertised in the stream's Content-type header.
pub const MJPEG_BOUNDARY: &str = "--jpgboundary";

/// Upper bound on one blocking frame wait; a timeout skips the cycle and a
/// closed source ends the connection within this interval.
pub const FRAME_TIMEOUT: Duration = Duration::from_millis(50);

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const JPEG_QUALITY: u8 = 80;
const SNAPSHOT_FLASH_DURATION: Duration = Duration::from_secs(3);

/// Errors that keep the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: io::Error,
    },
    #[error("failed to configure listener: {0}")]
    Listener(io::Error),
}

/// Everything a connection thread needs, shared across all of them.
pub struct ServerContext {
    pub source: Arc<dyn FrameSource>,
    pub telemetry: Arc<TelemetryState>,
    pub renderer: OverlayRenderer,
    pub snapshots: SnapshotWriter,
    pub document_root: PathBuf,
    pub running: Arc<AtomicBool>,
}

/// Accepts connections and hands each one to its own worker thread.
pub struct StreamingServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<ServerContext>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamingServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] when the address is unavailable; fatal
    /// at startup.
    pub fn bind(addr: SocketAddr, ctx: ServerContext) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        // Non-blocking so the accept loop can poll the shutdown flag.
        listener.set_nonblocking(true).map_err(ServerError::Listener)?;
        let local_addr = listener.local_addr().map_err(ServerError::Listener)?;

        Ok(Self {
            listener,
            local_addr,
            ctx: Arc::new(ctx),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the shutdown flag clears or the frame source
    /// closes. Returns once no new connections will be accepted; workers may
    /// still be draining, see [`StreamingServer::join_workers`].
    pub fn run(&self) {
        log::info!("server started on http://{}", self.local_addr);

        while self.ctx.running.load(Ordering::SeqCst) && self.ctx.source.is_open() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    log::info!("client connected [{}]", peer);
                    // The worker blocks on socket writes; undo any
                    // non-blocking flag inherited from the listener.
                    if let Err(e) = stream.set_nonblocking(false) {
                        log::error!("failed to configure client socket: {}", e);
                        continue;
                    }
                    let ctx = Arc::clone(&self.ctx);
                    let spawned = thread::Builder::new()
                        .name(format!("client-{}", peer))
                        .spawn(move || handle_connection(stream, peer, ctx));
                    match spawned {
                        Ok(handle) => {
                            if let Ok(mut workers) = self.workers.lock() {
                                workers.push(handle);
                            }
                        }
                        Err(e) => log::error!("failed to spawn connection thread: {}", e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.reap_finished();
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    log::error!("accept error: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        log::info!("server stopped accepting connections");
    }

    /// Wait up to `timeout` for all connection threads to finish; anything
    /// still running after the deadline is detached with a warning.
    pub fn join_workers(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            self.reap_finished();
            let remaining = self.workers.lock().map(|w| w.len()).unwrap_or(0);
            if remaining == 0 {
                return;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "{} connection thread(s) still running at shutdown, detaching",
                    remaining
                );
                if let Ok(mut workers) = self.workers.lock() {
                    workers.clear();
                }
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn reap_finished(&self) {
        if let Ok(mut workers) = self.workers.lock() {
            let mut still_running = Vec::new();
            for handle in workers.drain(..) {
                if handle.is_finished() {
                    let _ = handle.join();
                } else {
                    still_running.push(handle);
                }
            }
            *workers = still_running;
        }
    }
}

fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    if let Err(e) = serve_client(stream, &ctx) {
        match e.kind() {
            // A peer hanging up mid-stream is routine, not an error.
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => {
                log::debug!("client {} disconnected", peer)
            }
            _ => log::warn!("client {}: {}", peer, e),
        }
    }
}

fn serve_client(mut stream: TcpStream, ctx: &ServerContext) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let Some(path) = parse_request_path(&request_line) else {
        return write_simple_response(&mut stream, "400 Bad Request", "text/plain", b"bad request");
    };

    // Drain the remaining request headers; nothing in them matters here.
    let mut header = String::new();
    loop {
        header.clear();
        let n = reader.read_line(&mut header)?;
        if n == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    let result = match path.as_str() {
        URL_PATH_MJPG => stream_mjpeg(&mut stream, ctx),
        URL_PATH_FAVICON => write_simple_response(
            &mut stream,
            "404 Not Found",
            "text/plain",
            b"favicon is not found",
        ),
        _ => serve_index(&mut stream, ctx),
    };
    log::info!("connection closing [{}]", path);
    result
}

/// The per-connection streaming loop.
///
/// Runs for as long as the frame source stays open and the peer keeps
/// reading: capture, render, encode, optionally persist a snapshot, write
/// one multipart part, stamp the cycle interval.
fn stream_mjpeg(stream: &mut TcpStream, ctx: &ServerContext) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-type: multipart/x-mixed-replace; boundary={}\r\n\r\n",
        MJPEG_BOUNDARY
    )?;

    while ctx.running.load(Ordering::SeqCst) && ctx.source.is_open() {
        let cycle_start = Instant::now();

        let mut frame = match ctx.source.get_frame(FRAME_TIMEOUT) {
            Ok(frame) => frame,
            // Transient: skip this cycle, keep the connection.
            Err(CameraError::CaptureTimeout) => continue,
            // Source released (or poisoned): end the connection cleanly.
            Err(_) => break,
        };

        let readout = ctx.telemetry.readout();
        if readout.display_mode == MODE_PAUSED {
            // Paused display tier: no encode, no send this cycle.
            continue;
        }

        ctx.renderer.render(&mut frame, &readout);

        let jpg = match encode_jpeg(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("JPEG encode failed: {}", e);
                continue;
            }
        };

        if ctx.telemetry.take_snapshot_request() {
            match ctx.snapshots.write(&jpg) {
                Ok(path) => {
                    log::info!("snapshot saved to {}", path.display());
                    ctx.telemetry
                        .set_flash_message("snapshot saved", SNAPSHOT_FLASH_DURATION);
                }
                Err(e) => log::error!("snapshot write failed: {}", e),
            }
        }

        write_mjpeg_part(stream, &jpg)?;

        ctx.telemetry
            .set_frame_interval(cycle_start.elapsed().as_secs_f64());
    }

    Ok(())
}

/// Write one multipart frame part.
///
/// Byte layout: the boundary marker line, a `Content-type` line, a
/// `Content-length` line carrying the exact payload size, a blank line, then
/// the raw JPEG bytes.
pub fn write_mjpeg_part(w: &mut impl Write, jpg: &[u8]) -> io::Result<()> {
    write!(w, "{}\r\n", MJPEG_BOUNDARY)?;
    write!(w, "Content-type: image/jpeg\r\n")?;
    write!(w, "Content-length: {}\r\n\r\n", jpg.len())?;
    w.write_all(jpg)?;
    w.flush()
}

/// Encode an RGB frame as JPEG.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.encode(
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgb8,
    )?;
    Ok(out)
}

fn serve_index(stream: &mut TcpStream, ctx: &ServerContext) -> io::Result<()> {
    let path = ctx.document_root.join("index.html");
    match fs::read(&path) {
        Ok(body) => write_simple_response(stream, "200 OK", "text/html", &body),
        Err(e) => {
            log::warn!("failed to read {}: {}", path.display(), e);
            write_simple_response(stream, "404 Not Found", "text/plain", b"index.html not found")
        }
    }
}

fn write_simple_response(
    w: &mut impl Write,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> io::Result<()> {
    write!(
        w,
        "HTTP/1.1 {}\r\nContent-type: {}\r\nContent-length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    )?;
    w.write_all(body)?;
    w.flush()
}

fn parse_request_path(request_line: &str) -> Option<String> {
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    parts.next().map(|path| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FrameFormat;

    #[test]
    fn test_parse_request_path() {
        assert_eq!(
            parse_request_path("GET /camera.mjpg HTTP/1.1\r\n").as_deref(),
            Some("/camera.mjpg")
        );
        assert_eq!(
            parse_request_path("GET / HTTP/1.0\r\n").as_deref(),
            Some("/")
        );
        assert_eq!(parse_request_path("\r\n"), None);
        assert_eq!(parse_request_path("GET"), None);
    }

    #[test]
    fn test_mjpeg_part_framing_is_byte_exact() {
        let payload = b"not-really-a-jpeg".to_vec();
        let mut out = Vec::new();
        write_mjpeg_part(&mut out, &payload).unwrap();

        let expected_head = format!(
            "--jpgboundary\r\nContent-type: image/jpeg\r\nContent-length: {}\r\n\r\n",
            payload.len()
        );
        assert!(out.starts_with(expected_head.as_bytes()));
        assert_eq!(&out[expected_head.len()..], payload.as_slice());
        assert_eq!(out.len(), expected_head.len() + payload.len());
    }

    #[test]
    fn test_mjpeg_part_content_length_matches_payload() {
        let payload = vec![0xabu8; 4096];
        let mut out = Vec::new();
        write_mjpeg_part(&mut out, &payload).unwrap();

        let text = String::from_utf8_lossy(&out[..128]);
        assert!(text.contains("Content-length: 4096\r\n"));
    }

    #[test]
    fn test_simple_response_shape() {
        let mut out = Vec::new();
        write_simple_response(&mut out, "404 Not Found", "text/plain", b"favicon is not found")
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-type: text/plain\r\n"));
        assert!(text.contains("Content-length: 20\r\n"));
        assert!(text.ends_with("\r\n\r\nfavicon is not found"));
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let frame = Frame {
            data: vec![128; 16 * 16 * 3],
            width: 16,
            height: 16,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        };
        let jpg = encode_jpeg(&frame).unwrap();
        assert!(jpg.len() > 2);
        assert_eq!(&jpg[..2], &[0xff, 0xd8]);
        assert_eq!(&jpg[jpg.len() - 2..], &[0xff, 0xd9]);
    }
}
