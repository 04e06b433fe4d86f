use crate::frame::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Slot {
    frame: Option<Arc<Frame>>,
    sequence: u64,
}

/// Single-slot holder of the most recent frame of one stream.
///
/// One reader thread publishes; any number of consumers take snapshots. The
/// lock only guards a pointer swap, so a consumer never sees a partially
/// written frame and never stalls the publisher for longer than an `Arc`
/// clone. Last write wins: consumers may skip sequence numbers.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the held frame and return the sequence number stamped on it.
    /// The first publish is sequence 1.
    pub fn publish(&self, frame: Frame) -> u64 {
        let mut slot = self.slot();
        slot.sequence += 1;
        let sequence = slot.sequence;
        slot.frame = Some(Arc::new(frame.stamped(sequence)));
        sequence
    }

    /// Latest frame, or `None` if nothing was published (or it was cleared).
    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.slot().frame.clone()
    }

    /// Sequence of the last publish; 0 before the first one.
    pub fn sequence(&self) -> u64 {
        self.slot().sequence
    }

    /// Drop the held frame. The sequence counter keeps counting.
    pub fn clear(&self) {
        self.slot().frame = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slot().frame.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn solid(value: u8) -> Frame {
        Frame::new(2, 2, PixelFormat::Rgb8, vec![value; 12]).unwrap()
    }

    #[test]
    fn starts_empty() {
        let buffer = FrameBuffer::new();
        assert!(buffer.snapshot().is_none());
        assert!(buffer.is_empty());
        assert_eq!(buffer.sequence(), 0);
    }

    #[test]
    fn publish_stamps_increasing_sequences() {
        let buffer = FrameBuffer::new();
        assert_eq!(buffer.publish(solid(1)), 1);
        assert_eq!(buffer.publish(solid(2)), 2);

        let latest = buffer.snapshot().unwrap();
        assert_eq!(latest.sequence(), 2);
        assert_eq!(latest.data()[0], 2);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_publishes() {
        let buffer = FrameBuffer::new();
        buffer.publish(solid(10));
        let held = buffer.snapshot().unwrap();

        buffer.publish(solid(20));

        assert_eq!(held.sequence(), 1);
        assert!(held.data().iter().all(|&b| b == 10));
    }

    #[test]
    fn clear_hides_frame_but_keeps_counting() {
        let buffer = FrameBuffer::new();
        buffer.publish(solid(1));
        buffer.clear();
        assert!(buffer.snapshot().is_none());
        assert_eq!(buffer.sequence(), 1);
        assert_eq!(buffer.publish(solid(2)), 2);
    }
}
