use anyhow::{Context, bail};
use capture::{
    FfmpegSource, FrameBuffer, HlsSource, StreamCandidate, StreamReader, VideoSource,
    discover_streams, redact,
};
use common::{Shutdown, TelemetryGuard, setup_logging};
use detection::{
    DetectionState, Dispatcher, FileAlertLog, HttpDetector, SamplingStream, SceneChangeGate,
    sampling_order,
};
use gateway::config::{Settings, SourceKind, get_configuration};
use gateway::routes::run_server;
use gateway::state::{AppState, FeedSettings, StreamHandle};
use gateway::supervisor::Supervisor;
use std::sync::Arc;

const SERVICE_NAME: &str = "firewatch";

fn main() -> anyhow::Result<()> {
    let settings = get_configuration().context("Failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    // TelemetryGuard installs its own subscriber; its exporters need the runtime.
    let _telemetry = match settings.otel_endpoint.as_deref() {
        Some(endpoint) => Some(runtime.block_on(async {
            TelemetryGuard::init(
                SERVICE_NAME,
                endpoint,
                settings.log_level.as_str(),
                settings.environment,
            )
        })?),
        None => {
            setup_logging(settings.log_level.as_str(), settings.environment);
            None
        }
    };

    tracing::info!(
        environment = settings.environment.as_str(),
        source = ?settings.source.kind,
        bind = %settings.server.bind,
        "Firewatch starting"
    );

    let shutdown = Shutdown::register_signals().context("Failed to register signal handlers")?;

    // Build everything that can fail on bad configuration before any thread starts.
    let detector = build_detector(&settings)?;
    let (source, streams, description) = select_streams(&settings, &shutdown)?;

    let mut supervisor = Supervisor::new(shutdown.clone());
    let reader_config = settings.capture.reader_config();
    let mut handles = Vec::with_capacity(streams.len());
    for candidate in &streams {
        let buffer = Arc::new(FrameBuffer::new());
        let reader = StreamReader::new(
            &candidate.name,
            &candidate.url,
            Arc::clone(&source),
            Arc::clone(&buffer),
            reader_config.clone(),
        );
        let status = supervisor
            .spawn_reader(reader)
            .with_context(|| format!("Failed to start reader for {}", candidate.name))?;
        handles.push(StreamHandle::new(&candidate.name, &candidate.url, buffer, status));
    }

    let detection_state = Arc::new(DetectionState::new(settings.detection.history_capacity));
    match detector {
        Some((detector, alert_log)) => {
            let sampling = sampling_order(
                handles
                    .iter()
                    .map(|h| SamplingStream::new(&h.name, Arc::clone(&h.buffer)))
                    .collect(),
                &settings.detection.sampling_preference,
            );
            let mut dispatcher = Dispatcher::new(
                detector,
                sampling,
                SceneChangeGate::new(settings.detection.scene.clone()),
                Arc::clone(&detection_state),
                settings.detection.dispatcher_config(),
            );
            if let Some(log) = alert_log {
                dispatcher = dispatcher.with_alert_sink(Box::new(log));
            }
            supervisor
                .spawn_dispatcher(dispatcher)
                .context("Failed to start detection dispatcher")?;
        }
        None => tracing::info!("Fire detection disabled"),
    }

    let state = AppState::new(
        &settings.detection.camera_id,
        &description,
        handles,
        detection_state,
        settings.detection.enabled,
        FeedSettings {
            fps: settings.server.stream_fps,
            jpeg_quality: settings.server.jpeg_quality,
        },
        shutdown,
    );

    let served = runtime.block_on(run_server(&settings.server.bind, state));
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server failed");
    }

    supervisor.shutdown_and_join();
    tracing::info!("Firewatch stopped");
    served
}

/// The HTTP detector and optional alert log, or `None` when detection is off.
fn build_detector(settings: &Settings) -> anyhow::Result<Option<(HttpDetector, Option<FileAlertLog>)>> {
    let detection = &settings.detection;
    if !detection.enabled {
        return Ok(None);
    }
    if detection.endpoint.trim().is_empty() {
        bail!("detection.endpoint must be set when detection is enabled");
    }

    let detector = HttpDetector::new(
        detection.endpoint.trim(),
        &detection.camera_id,
        detection.request_timeout(),
    )
    .context("Failed to build detector client")?;

    let alert_log = detection
        .alert_log
        .as_ref()
        .map(|path| {
            FileAlertLog::open(path)
                .with_context(|| format!("Failed to open alert log {}", path.display()))
        })
        .transpose()?;

    tracing::info!(
        endpoint = %detector.endpoint(),
        camera_id = %detection.camera_id,
        interval = ?detection.dispatcher_config().interval,
        "Fire detection enabled"
    );
    Ok(Some((detector, alert_log)))
}

/// Resolve the configured source into the streams to read.
///
/// RTSP cameras are probed and startup fails when nothing answers. HLS is
/// taken as a single stream whose reader waits for the playlist.
fn select_streams(
    settings: &Settings,
    shutdown: &Shutdown,
) -> anyhow::Result<(Arc<dyn VideoSource>, Vec<StreamCandidate>, String)> {
    let capture = &settings.capture;
    let ffmpeg = FfmpegSource::new(&capture.ffmpeg_path, &capture.ffprobe_path, capture.io_timeout())
        .with_shutdown(shutdown.clone());

    match settings.source.kind {
        SourceKind::Rtsp => {
            let camera = settings.source.camera();
            let base = camera.base_url().context("Invalid camera address")?;
            let candidates = camera.candidates().context("Invalid camera address")?;
            let fallback = camera.fallback().context("Invalid camera address")?;

            tracing::info!(camera = %redact(base.as_str()), "Probing camera streams");
            let working = discover_streams(&ffmpeg, &candidates, &fallback, capture.probe_timeout());
            if working.is_empty() {
                bail!(
                    "No working RTSP streams found at {}:{}",
                    camera.host,
                    camera.port
                );
            }

            let names: Vec<_> = working.iter().map(|c| c.name.as_str()).collect();
            tracing::info!(streams = ?names, "Accepted camera streams");
            let source: Arc<dyn VideoSource> = Arc::new(ffmpeg);
            Ok((source, working, base.to_string()))
        }
        SourceKind::Hls => {
            let url = settings.source.hls_url.clone();
            let hls = HlsSource::new(ffmpeg).context("Failed to build HLS client")?;
            tracing::info!(url = %redact(&url), "Using HLS source");
            let source: Arc<dyn VideoSource> = Arc::new(hls);
            Ok((source, vec![StreamCandidate::new("main", url.clone())], url))
        }
    }
}
