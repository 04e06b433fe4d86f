use crate::candidates::redact;
use crate::errors::CaptureError;
use crate::frame::{Frame, PixelFormat};
use crate::source::{FrameStream, VideoSource};
use common::Shutdown;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Frames decoded ahead of the reader. Older frames are useless for sampling,
/// so the pump blocks instead of buffering more.
const PUMP_DEPTH: usize = 2;

const PROBE_POLL: Duration = Duration::from_millis(20);

/// Decodes network streams by running `ffmpeg` as a child process and reading
/// raw RGB frames from its stdout.
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    ffmpeg: String,
    ffprobe: String,
    io_timeout: Duration,
    shutdown: Shutdown,
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
            io_timeout: Duration::from_secs(10),
            shutdown: Shutdown::new(),
        }
    }
}

impl FfmpegSource {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, io_timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            io_timeout,
            shutdown: Shutdown::new(),
        }
    }

    /// Abandon opens in progress once `shutdown` is raised.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub(crate) fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    fn probe_dimensions(&self, url: &str, timeout: Duration) -> Result<(u32, u32), CaptureError> {
        let mut command = Command::new(&self.ffprobe);
        command
            .args(["-v", "error"])
            .args(input_args(url, self.io_timeout))
            .args(["-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height"])
            .args(["-of", "csv=p=0"])
            .arg(url);

        let output = run_with_timeout(command, url, timeout, &self.shutdown)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_dimensions(&stdout).ok_or_else(|| CaptureError::Open {
            url: redact(url),
            reason: format!("no video stream reported (got {:?})", stdout.trim()),
        })
    }
}

impl VideoSource for FfmpegSource {
    fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn FrameStream>, CaptureError> {
        let (width, height) = self.probe_dimensions(url, timeout)?;

        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(input_args(url, self.io_timeout))
            .args(["-i", url])
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::Open {
                url: redact(url),
                reason: format!("failed to spawn {}: {}", self.ffmpeg, e),
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::Open {
                url: redact(url),
                reason: "decoder stdout not captured".into(),
            });
        };

        let (tx, rx) = bounded(PUMP_DEPTH);
        let pump = thread::Builder::new()
            .name("ffmpeg-pump".into())
            .spawn(move || pump_frames(stdout, width, height, tx))?;

        tracing::debug!(url = %redact(url), width, height, "Decoder started");

        Ok(Box::new(FfmpegStream {
            child,
            frames: Some(rx),
            pump: Some(pump),
        }))
    }
}

/// A running decoder process plus the thread that slices its output.
struct FfmpegStream {
    child: Child,
    frames: Option<Receiver<Result<Frame, CaptureError>>>,
    pump: Option<JoinHandle<()>>,
}

impl FrameStream for FfmpegStream {
    fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>, CaptureError> {
        let Some(frames) = &self.frames else {
            return Err(CaptureError::EndOfStream);
        };
        match frames.recv_timeout(wait) {
            Ok(frame) => frame.map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::EndOfStream),
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        // Killing the child closes its stdout, which ends the pump's read.
        let _ = self.child.kill();
        let _ = self.child.wait();
        // Dropping the receiver unblocks a pump stuck on a full channel.
        self.frames.take();
        if let Some(pump) = self.pump.take()
            && pump.join().is_err()
        {
            tracing::warn!("Frame pump thread panicked");
        }
    }
}

fn pump_frames(
    mut stdout: ChildStdout,
    width: u32,
    height: u32,
    tx: Sender<Result<Frame, CaptureError>>,
) {
    let frame_len = width as usize * height as usize * PixelFormat::Rgb8.channels();
    loop {
        let mut data = vec![0u8; frame_len];
        let item = match stdout.read_exact(&mut data) {
            Ok(()) => Frame::new(width, height, PixelFormat::Rgb8, data),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CaptureError::EndOfStream),
            Err(e) => Err(CaptureError::Io(e)),
        };
        let terminal = matches!(&item, Err(e) if !e.is_transient());
        if tx.send(item).is_err() || terminal {
            return;
        }
    }
}

/// Demuxer options applied to every input: TCP for RTSP, a socket I/O timeout
/// and low-latency flags.
pub fn input_args(url: &str, io_timeout: Duration) -> Vec<String> {
    let micros = io_timeout.as_micros().to_string();
    let mut args = Vec::with_capacity(8);
    if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
        args.extend(["-rtsp_transport".into(), "tcp".into(), "-timeout".into(), micros]);
    } else {
        args.extend(["-rw_timeout".into(), micros]);
    }
    args.extend([
        "-fflags".into(),
        "nobuffer".into(),
        "-flags".into(),
        "low_delay".into(),
    ]);
    args
}

/// Parse `WIDTHxHEIGHT` as printed by `ffprobe -of csv=p=0` (`1920,1080`).
pub fn parse_dimensions(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once(',')?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().trim_end_matches(',').parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Run a command to completion, killing it once `timeout` has elapsed or
/// shutdown is raised.
fn run_with_timeout(
    mut command: Command,
    url: &str,
    timeout: Duration,
    shutdown: &Shutdown,
) -> Result<Output, CaptureError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CaptureError::Open {
            url: redact(url),
            reason: format!("failed to spawn probe: {}", e),
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            break;
        }
        if shutdown.is_triggered() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::Cancelled { url: redact(url) });
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::OpenTimeout {
                url: redact(url),
                timeout,
            });
        }
        thread::sleep(PROBE_POLL);
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CaptureError::Open {
            url: redact(url),
            reason: match stderr.lines().last() {
                Some(line) if !line.trim().is_empty() => line.trim().to_string(),
                _ => format!("probe exited with {}", output.status),
            },
        });
    }
    Ok(output)
}
