use capture::{
    CaptureError, FfmpegSource, Frame, FrameBuffer, FrameStream, HlsSource, PixelFormat,
    ReaderConfig, ReaderState, StreamReader, VideoSource,
};
use common::Shutdown;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// What a scripted connection does on each `next_frame` call.
#[derive(Clone)]
enum Step {
    Frame(u32, u32, u8),
    Corrupt,
    Idle,
    End,
}

/// What the source does on each `open` call; once the plan runs out every
/// open fails.
#[derive(Clone)]
enum Connect {
    Refuse,
    Stream(Vec<Step>),
}

#[derive(Default)]
struct Tracker {
    opens: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

struct ScriptedSource {
    plan: Mutex<VecDeque<Connect>>,
    tracker: Arc<Tracker>,
}

impl ScriptedSource {
    fn new(plan: Vec<Connect>) -> (Arc<Self>, Arc<Tracker>) {
        let tracker = Arc::new(Tracker::default());
        let source = Arc::new(Self {
            plan: Mutex::new(plan.into()),
            tracker: Arc::clone(&tracker),
        });
        (source, tracker)
    }
}

struct ScriptedStream {
    steps: VecDeque<Step>,
    tracker: Arc<Tracker>,
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FrameStream for ScriptedStream {
    fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>, CaptureError> {
        match self.steps.pop_front().unwrap_or(Step::Idle) {
            Step::Frame(w, h, v) => Ok(Some(
                Frame::new(w, h, PixelFormat::Rgb8, vec![v; (w * h * 3) as usize]).unwrap(),
            )),
            Step::Corrupt => Err(CaptureError::Decode("bad NAL unit".into())),
            Step::Idle => {
                thread::sleep(wait);
                Ok(None)
            }
            Step::End => Err(CaptureError::EndOfStream),
        }
    }
}

impl VideoSource for ScriptedSource {
    fn open(&self, url: &str, _timeout: Duration) -> Result<Box<dyn FrameStream>, CaptureError> {
        self.tracker.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.plan.lock().unwrap().pop_front().unwrap_or(Connect::Refuse);
        match next {
            Connect::Refuse => Err(CaptureError::Open {
                url: url.into(),
                reason: "connection refused".into(),
            }),
            Connect::Stream(steps) => {
                let live = self.tracker.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.tracker.max_live.fetch_max(live, Ordering::SeqCst);
                Ok(Box::new(ScriptedStream {
                    steps: steps.into(),
                    tracker: Arc::clone(&self.tracker),
                }))
            }
        }
    }
}

fn fast_config() -> ReaderConfig {
    ReaderConfig {
        open_timeout: Duration::from_millis(50),
        reconnect_backoff: Duration::from_millis(30),
        stall_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        max_width: 1920,
        max_fps: 0.0,
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Test that an unreachable source is retried with the fixed backoff
///
/// Tests:
/// - At least three connect attempts within a window of ~3 backoffs
/// - Attempts are spaced by the backoff, not hammered
/// - Shutdown during backoff stops the reader promptly in `Stopped`
#[test]
fn test_reader_retries_unreachable_source() {
    let (source, tracker) = ScriptedSource::new(Vec::new());
    let buffer = Arc::new(FrameBuffer::new());
    let reader = StreamReader::new("main", "rtsp://cam/", source, Arc::clone(&buffer), fast_config());
    let status = reader.status();
    let shutdown = Shutdown::new();
    let handle = reader.spawn(shutdown.clone()).unwrap();

    thread::sleep(Duration::from_millis(150));
    let attempts = tracker.opens.load(Ordering::SeqCst);
    assert!(attempts >= 3, "expected >= 3 attempts, got {attempts}");
    assert!(attempts <= 7, "backoff not honoured, got {attempts} attempts");

    let stop = Instant::now();
    shutdown.trigger();
    handle.join().unwrap();
    assert!(stop.elapsed() < Duration::from_secs(1));
    assert_eq!(status.state(), ReaderState::Stopped);
    assert!(buffer.snapshot().is_none());
}

/// Test shutdown while an HLS reader waits for its playlist
///
/// Tests:
/// - The playlist wait and the decoder probe see the shutdown flag
/// - The reader exits well before the open timeout runs out
#[test]
fn test_reader_stops_while_waiting_for_hls_playlist() {
    let shutdown = Shutdown::new();
    let hls = HlsSource::new(FfmpegSource::default().with_shutdown(shutdown.clone())).unwrap();
    let reader = StreamReader::new(
        "main",
        "http://127.0.0.1:1/hls/stream.m3u8",
        Arc::new(hls),
        Arc::new(FrameBuffer::new()),
        ReaderConfig::default(),
    );
    let status = reader.status();
    let handle = reader.spawn(shutdown.clone()).unwrap();

    thread::sleep(Duration::from_millis(200));
    assert_eq!(status.state(), ReaderState::Connecting);

    let stop = Instant::now();
    shutdown.trigger();
    handle.join().unwrap();
    assert!(stop.elapsed() < Duration::from_secs(1));
    assert_eq!(status.state(), ReaderState::Stopped);
}

/// Test reconnect after the stream ends
///
/// Tests:
/// - Frames from both connections are published with increasing sequences
/// - The first connection is released before the second is opened
/// - Disconnects are counted
#[test]
fn test_reader_reconnects_after_end_of_stream() {
    let (source, tracker) = ScriptedSource::new(vec![
        Connect::Stream(vec![Step::Frame(4, 4, 1), Step::Frame(4, 4, 2), Step::End]),
        Connect::Refuse,
        Connect::Stream(vec![Step::Frame(4, 4, 3)]),
    ]);
    let buffer = Arc::new(FrameBuffer::new());
    let reader = StreamReader::new("sub", "rtsp://cam/sub", source, Arc::clone(&buffer), fast_config());
    let status = reader.status();
    let shutdown = Shutdown::new();
    let handle = reader.spawn(shutdown.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(2), || buffer.sequence() >= 3));
    shutdown.trigger();
    handle.join().unwrap();

    let latest = buffer.snapshot().unwrap();
    assert_eq!(latest.sequence(), 3);
    assert_eq!(latest.data()[0], 3);
    assert_eq!(tracker.max_live.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
    assert_eq!(tracker.opens.load(Ordering::SeqCst), 3);

    let stats = status.snapshot();
    assert_eq!(stats.frames_published, 3);
    assert_eq!(stats.disconnects, 1);
}

/// Test that corrupt frames are skipped without reconnecting
#[test]
fn test_reader_skips_transient_decode_errors() {
    let (source, tracker) = ScriptedSource::new(vec![Connect::Stream(vec![
        Step::Corrupt,
        Step::Frame(2, 2, 10),
        Step::Corrupt,
        Step::Corrupt,
        Step::Frame(2, 2, 11),
    ])]);
    let buffer = Arc::new(FrameBuffer::new());
    let reader = StreamReader::new("main", "rtsp://cam/", source, Arc::clone(&buffer), fast_config());
    let status = reader.status();
    let shutdown = Shutdown::new();
    let handle = reader.spawn(shutdown.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(2), || buffer.sequence() >= 2));
    assert_eq!(status.state(), ReaderState::Streaming);
    shutdown.trigger();
    handle.join().unwrap();

    let stats = status.snapshot();
    assert_eq!(stats.decode_errors, 3);
    assert_eq!(stats.disconnects, 0);
    assert_eq!(tracker.opens.load(Ordering::SeqCst), 1);
}

/// Test downscaling of frames wider than the limit
#[test]
fn test_reader_downscales_wide_frames() {
    let (source, _tracker) = ScriptedSource::new(vec![Connect::Stream(vec![Step::Frame(
        3840, 216, 50,
    )])]);
    let buffer = Arc::new(FrameBuffer::new());
    let reader = StreamReader::new("main", "rtsp://cam/", source, Arc::clone(&buffer), fast_config());
    let shutdown = Shutdown::new();
    let handle = reader.spawn(shutdown.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(5), || buffer.sequence() >= 1));
    shutdown.trigger();
    handle.join().unwrap();

    let frame = buffer.snapshot().unwrap();
    assert_eq!((frame.width(), frame.height()), (1920, 108));
}

/// Test the stall watchdog
///
/// Tests:
/// - A silent stream is abandoned after the stall timeout and reopened
/// - The last published frame stays visible while no new frames arrive
#[test]
fn test_reader_abandons_stalled_stream() {
    let (source, tracker) = ScriptedSource::new(vec![
        Connect::Stream(vec![Step::Frame(2, 2, 42)]),
        Connect::Stream(Vec::new()),
    ]);
    let buffer = Arc::new(FrameBuffer::new());
    let config = ReaderConfig {
        stall_timeout: Duration::from_millis(60),
        ..fast_config()
    };
    let reader = StreamReader::new("main", "rtsp://cam/", source, Arc::clone(&buffer), config);
    let status = reader.status();
    let shutdown = Shutdown::new();
    let handle = reader.spawn(shutdown.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        tracker.opens.load(Ordering::SeqCst) >= 2
    }));
    let stale = buffer.snapshot().unwrap();
    assert_eq!(stale.sequence(), 1);
    assert_eq!(stale.data()[0], 42);

    shutdown.trigger();
    handle.join().unwrap();
    assert!(status.snapshot().disconnects >= 1);
}

/// Test publish rate cap: a burst of frames is thinned, not queued
#[test]
fn test_reader_paces_bursts() {
    let burst = (0..20).map(|i| Step::Frame(2, 2, i)).collect();
    let (source, _tracker) = ScriptedSource::new(vec![Connect::Stream(burst)]);
    let buffer = Arc::new(FrameBuffer::new());
    let config = ReaderConfig {
        max_fps: 1.0,
        ..fast_config()
    };
    let reader = StreamReader::new("main", "rtsp://cam/", source, Arc::clone(&buffer), config);
    let status = reader.status();
    let shutdown = Shutdown::new();
    let handle = reader.spawn(shutdown.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        let s = status.snapshot();
        s.frames_published + s.frames_dropped >= 20
    }));
    shutdown.trigger();
    handle.join().unwrap();

    let stats = status.snapshot();
    assert_eq!(stats.frames_published, 1);
    assert_eq!(stats.frames_dropped, 19);
    assert_eq!(buffer.snapshot().unwrap().data()[0], 0);
}
