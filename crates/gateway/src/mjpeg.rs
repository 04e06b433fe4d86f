use crate::state::FeedSettings;
use axum::body::Bytes;
use capture::FrameBuffer;
use common::Shutdown;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;

pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Wrap one JPEG as a `multipart/x-mixed-replace` part.
pub fn part(jpeg: &[u8]) -> Bytes {
    const HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let mut out = Vec::with_capacity(HEADER.len() + jpeg.len() + 2);
    out.extend_from_slice(HEADER);
    out.extend_from_slice(jpeg);
    out.extend_from_slice(b"\r\n");
    Bytes::from(out)
}

/// Start a per-client feed of `buffer` at the configured rate.
///
/// The encoder task ends when the client goes away or shutdown is requested,
/// which also ends the returned stream. A frame is only re-encoded when the
/// buffer has published a new one.
pub fn feed(
    buffer: Arc<FrameBuffer>,
    settings: FeedSettings,
    shutdown: Shutdown,
) -> ReceiverStream<Result<Bytes, Infallible>> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last: Option<(u64, Bytes)> = None;
        let mut parts_sent = 0u64;

        loop {
            ticker.tick().await;
            if shutdown.is_triggered() || tx.is_closed() {
                break;
            }
            let Some(frame) = buffer.snapshot() else {
                continue;
            };

            let sequence = frame.sequence();
            let chunk = match &last {
                Some((seq, chunk)) if *seq == sequence => chunk.clone(),
                _ => {
                    let quality = settings.jpeg_quality;
                    match tokio::task::spawn_blocking(move || frame.to_jpeg(quality)).await {
                        Ok(Ok(jpeg)) => {
                            let chunk = part(&jpeg);
                            last = Some((sequence, chunk.clone()));
                            chunk
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(error = %e, "Failed to encode feed frame");
                            continue;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Feed encoder task failed");
                            break;
                        }
                    }
                }
            };

            if tx.send(Ok(chunk)).await.is_err() {
                break;
            }
            parts_sent += 1;
        }

        tracing::debug!(parts_sent, "MJPEG feed closed");
    });

    ReceiverStream::new(rx)
}
