use crate::boxes::BoundingBox;
use crate::response::DetectionResult;
use capture::Frame;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneGateConfig {
    /// Mean absolute byte difference below which two frames count as the same scene.
    pub diff_threshold: f64,
    pub static_frame_threshold: u32,
    pub box_iou_threshold: f64,
    pub box_static_threshold: u32,
}

impl Default for SceneGateConfig {
    fn default() -> Self {
        Self {
            diff_threshold: 5.0,
            static_frame_threshold: 3,
            box_iou_threshold: 0.95,
            box_static_threshold: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameVerdict {
    Call { difference: Option<f64> },
    Suppress { static_frames: u32 },
}

impl FrameVerdict {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, FrameVerdict::Suppress { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoxVerdict {
    NoFire,
    /// Fire worth alerting on.
    NewAlert,
    /// Fire in the same place as before.
    StaticRepeat { iou: f64, repeats: u32 },
}

/// Decides per tick whether the scene changed enough to call the detector,
/// and whether a fire result is news.
#[derive(Debug, Default)]
pub struct SceneChangeGate {
    config: SceneGateConfig,
    prev_frame: Option<Arc<Frame>>,
    static_frame_count: u32,
    prev_box: Option<BoundingBox>,
    static_box_count: u32,
}

impl SceneChangeGate {
    pub fn new(config: SceneGateConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn static_frame_count(&self) -> u32 {
        self.static_frame_count
    }

    pub fn static_box_count(&self) -> u32 {
        self.static_box_count
    }

    pub fn reference_box(&self) -> Option<&BoundingBox> {
        self.prev_box.as_ref()
    }

    /// Compare `frame` with the previous sampled frame, then remember it.
    pub fn observe_frame(&mut self, frame: Arc<Frame>) -> FrameVerdict {
        let difference = self
            .prev_frame
            .as_deref()
            .map(|prev| mean_abs_diff(prev, &frame));

        match difference {
            Some(Some(d)) if d < self.config.diff_threshold => self.static_frame_count += 1,
            Some(_) => self.static_frame_count = 0,
            None => {}
        }
        self.prev_frame = Some(frame);

        if self.static_frame_count >= self.config.static_frame_threshold {
            FrameVerdict::Suppress {
                static_frames: self.static_frame_count,
            }
        } else {
            FrameVerdict::Call {
                difference: difference.flatten(),
            }
        }
    }

    /// Forget the reference box. A tick without a usable detector answer
    /// counts as a gap in the fire.
    pub fn clear_boxes(&mut self) {
        self.prev_box = None;
        self.static_box_count = 0;
    }

    /// Classify a detector result. Only the first box is tracked.
    pub fn observe_detection(&mut self, result: &DetectionResult) -> BoxVerdict {
        let fire = result.fire_detected();
        let current = result.primary_box().filter(|_| fire);

        let Some(current) = current else {
            self.clear_boxes();
            return if fire {
                BoxVerdict::NewAlert
            } else {
                BoxVerdict::NoFire
            };
        };

        let iou = match &self.prev_box {
            Some(prev) => {
                let iou = prev.iou(current);
                if iou > self.config.box_iou_threshold {
                    self.static_box_count += 1;
                } else {
                    self.static_box_count = 0;
                    self.prev_box = Some(current.clone());
                }
                iou
            }
            None => {
                self.static_box_count = 0;
                self.prev_box = Some(current.clone());
                0.0
            }
        };

        if self.static_box_count >= self.config.box_static_threshold {
            BoxVerdict::StaticRepeat {
                iou,
                repeats: self.static_box_count,
            }
        } else {
            BoxVerdict::NewAlert
        }
    }
}

/// Mean absolute per-byte difference over all channels, or `None` when the
/// frames cannot be compared pixel for pixel.
pub fn mean_abs_diff(a: &Frame, b: &Frame) -> Option<f64> {
    if !a.same_geometry(b) || a.data().is_empty() {
        return None;
    }
    let total: u64 = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum();
    Some(total as f64 / a.data().len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::PixelFormat;

    fn solid(value: u8) -> Arc<Frame> {
        Arc::new(Frame::new(8, 8, PixelFormat::Rgb8, vec![value; 8 * 8 * 3]).unwrap())
    }

    fn fire(boxes: &str) -> DetectionResult {
        DetectionResult::new(200, format!(r#"{{"fire_detected": true, "boxes": {boxes}}}"#))
    }

    fn no_fire() -> DetectionResult {
        DetectionResult::new(200, r#"{"fire_detected": false, "boxes": []}"#)
    }

    // ========== Pixel Gate ==========

    #[test]
    fn first_frame_is_always_called() {
        let mut gate = SceneChangeGate::default();
        assert_eq!(
            gate.observe_frame(solid(0)),
            FrameVerdict::Call { difference: None }
        );
        assert_eq!(gate.static_frame_count(), 0);
    }

    #[test]
    fn identical_frames_increase_static_count() {
        let mut gate = SceneChangeGate::default();
        let frame = solid(100);
        gate.observe_frame(Arc::clone(&frame));
        for expected in 1..=5 {
            gate.observe_frame(Arc::clone(&frame));
            assert_eq!(gate.static_frame_count(), expected);
        }
    }

    #[test]
    fn fourth_identical_tick_is_first_suppressed() {
        let mut gate = SceneChangeGate::default();
        let frame = solid(42);
        let verdicts: Vec<_> = (0..6)
            .map(|_| gate.observe_frame(Arc::clone(&frame)).is_suppressed())
            .collect();
        assert_eq!(verdicts, [false, false, false, true, true, true]);
    }

    #[test]
    fn changed_frame_resets_static_count() {
        let mut gate = SceneChangeGate::default();
        for _ in 0..4 {
            gate.observe_frame(solid(10));
        }
        assert!(gate.static_frame_count() >= 3);

        let verdict = gate.observe_frame(solid(30));
        assert_eq!(gate.static_frame_count(), 0);
        assert_eq!(verdict, FrameVerdict::Call { difference: Some(20.0) });
    }

    #[test]
    fn difference_at_threshold_counts_as_change() {
        let mut gate = SceneChangeGate::default();
        gate.observe_frame(solid(10));
        gate.observe_frame(solid(15));
        assert_eq!(gate.static_frame_count(), 0);

        gate.observe_frame(solid(19));
        assert_eq!(gate.static_frame_count(), 1);
    }

    #[test]
    fn geometry_change_counts_as_change() {
        let mut gate = SceneChangeGate::default();
        gate.observe_frame(solid(0));
        gate.observe_frame(solid(0));
        assert_eq!(gate.static_frame_count(), 1);

        let wide = Arc::new(Frame::new(16, 4, PixelFormat::Rgb8, vec![0; 16 * 4 * 3]).unwrap());
        assert_eq!(gate.observe_frame(wide), FrameVerdict::Call { difference: None });
        assert_eq!(gate.static_frame_count(), 0);
    }

    #[test]
    fn mean_abs_diff_averages_over_channels() {
        let a = Frame::new(1, 2, PixelFormat::Rgb8, vec![0, 0, 0, 0, 0, 0]).unwrap();
        let b = Frame::new(1, 2, PixelFormat::Rgb8, vec![6, 0, 0, 0, 0, 6]).unwrap();
        assert_eq!(mean_abs_diff(&a, &b), Some(2.0));
    }

    // ========== Box Gate ==========

    #[test]
    fn first_box_is_a_new_alert() {
        let mut gate = SceneChangeGate::default();
        assert_eq!(
            gate.observe_detection(&fire(r#"[[10,10,50,50,"fire"]]"#)),
            BoxVerdict::NewAlert
        );
        assert_eq!(gate.static_box_count(), 0);
        assert!(gate.reference_box().is_some());
    }

    #[test]
    fn repeated_box_is_a_static_repeat() {
        let mut gate = SceneChangeGate::default();
        let result = fire(r#"[[10,10,50,50,"fire"]]"#);
        gate.observe_detection(&result);
        assert_eq!(
            gate.observe_detection(&result),
            BoxVerdict::StaticRepeat {
                iou: 1.0,
                repeats: 1
            }
        );
        assert!(matches!(
            gate.observe_detection(&result),
            BoxVerdict::StaticRepeat { repeats: 2, .. }
        ));
    }

    #[test]
    fn moved_box_becomes_new_reference() {
        let mut gate = SceneChangeGate::default();
        gate.observe_detection(&fire("[[10,10,50,50]]"));
        gate.observe_detection(&fire("[[10,10,50,50]]"));
        assert_eq!(gate.static_box_count(), 1);

        assert_eq!(
            gate.observe_detection(&fire("[[100,100,140,140]]")),
            BoxVerdict::NewAlert
        );
        assert_eq!(gate.static_box_count(), 0);
        assert_eq!(
            gate.reference_box(),
            Some(&BoundingBox::new(100.0, 100.0, 140.0, 140.0))
        );

        // The moved box is now the reference, so staying put is static.
        assert!(matches!(
            gate.observe_detection(&fire("[[100,100,140,140]]")),
            BoxVerdict::StaticRepeat { .. }
        ));
    }

    #[test]
    fn gap_fully_resets_box_tracking() {
        let mut gate = SceneChangeGate::default();
        let result = fire("[[10,10,50,50]]");
        gate.observe_detection(&result);
        gate.observe_detection(&result);

        assert_eq!(gate.observe_detection(&no_fire()), BoxVerdict::NoFire);
        assert!(gate.reference_box().is_none());
        assert_eq!(gate.static_box_count(), 0);

        assert_eq!(gate.observe_detection(&result), BoxVerdict::NewAlert);
    }

    #[test]
    fn cleared_boxes_realert_the_same_fire() {
        let mut gate = SceneChangeGate::default();
        let result = fire("[[10,10,50,50]]");
        gate.observe_detection(&result);
        gate.observe_detection(&result);
        assert_eq!(gate.static_box_count(), 1);

        gate.clear_boxes();
        assert!(gate.reference_box().is_none());
        assert_eq!(gate.static_box_count(), 0);
        assert_eq!(gate.observe_detection(&result), BoxVerdict::NewAlert);
    }

    #[test]
    fn fire_without_boxes_alerts_and_clears_reference() {
        let mut gate = SceneChangeGate::default();
        gate.observe_detection(&fire("[[10,10,50,50]]"));
        assert_eq!(gate.observe_detection(&fire("[]")), BoxVerdict::NewAlert);
        assert!(gate.reference_box().is_none());
    }

    #[test]
    fn boxes_without_fire_flag_are_ignored() {
        let mut gate = SceneChangeGate::default();
        let result = DetectionResult::new(200, r#"{"fire_detected": false, "boxes": [[1,1,9,9]]}"#);
        assert_eq!(gate.observe_detection(&result), BoxVerdict::NoFire);
        assert!(gate.reference_box().is_none());
    }
}
