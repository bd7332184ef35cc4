//! Hand detection and landmark estimation.
//!
//! [`MediaPipeHands`] follows MediaPipe's two-stage hand pipeline: a palm detector finds hands in
//! the frame, then a landmark network runs on an upright, square crop around each palm.

pub mod landmark;
pub mod palm;

use crate::config::HandConfig;
use crate::detection::{Detection, Detector};
use crate::image::{ImageView, Resolution};
use crate::landmark::Estimator;
use crate::rect::{Rect, RotatedRect};
use crate::timer::Timer;

use self::landmark::{Handedness, LandmarkNetwork};
use self::palm::PalmNetwork;

/// Number of landmarks per hand.
pub const NUM_LANDMARKS: usize = 21;

/// How much of the palm box height the hand crop is shifted towards the fingers.
const ROI_SHIFT_Y: f32 = -0.5;
/// Size of the hand crop relative to the longer side of the palm box.
const ROI_SCALE: f32 = 2.6;

/// A hand found in a frame.
///
/// Landmarks are normalized: X and Y are in range 0 to 1 relative to the frame width and height
/// (values slightly outside are possible when the hand is cut off), Z is a relative depth scaled
/// like X.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedHand {
    landmarks: [[f32; 3]; NUM_LANDMARKS],
    presence: f32,
    handedness: Option<Handedness>,
}

impl DetectedHand {
    pub fn new(landmarks: [[f32; 3]; NUM_LANDMARKS], presence: f32) -> Self {
        Self {
            landmarks,
            presence,
            handedness: None,
        }
    }

    pub fn with_handedness(self, handedness: Handedness) -> Self {
        Self {
            handedness: Some(handedness),
            ..self
        }
    }

    /// Returns the normalized landmarks in [`LandmarkIdx`] order.
    pub fn landmarks(&self) -> &[[f32; 3]; NUM_LANDMARKS] {
        &self.landmarks
    }

    pub fn landmark(&self, idx: LandmarkIdx) -> [f32; 3] {
        self.landmarks[idx as usize]
    }

    pub fn presence(&self) -> f32 {
        self.presence
    }

    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    /// Converts the landmarks to integer pixel coordinates in a frame of resolution `res`.
    ///
    /// Fractional coordinates are truncated towards zero.
    pub fn pixel_landmarks(&self, res: Resolution) -> [(i32, i32); NUM_LANDMARKS] {
        let (w, h) = (res.width() as f32, res.height() as f32);
        self.landmarks
            .map(|[x, y, _]| ((x * w) as i32, (y * h) as i32))
    }
}

/// Per-frame hand landmark detector.
///
/// Implementations take the frame by shared reference, so it cannot be modified while they run.
pub trait HandDetector {
    fn process(&mut self, rgb: ImageView<'_>) -> anyhow::Result<Vec<DetectedHand>>;

    /// Timers of the detector's internal stages, logged along with the frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<D: HandDetector + ?Sized> HandDetector for Box<D> {
    fn process(&mut self, rgb: ImageView<'_>) -> anyhow::Result<Vec<DetectedHand>> {
        (**self).process(rgb)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

/// Two-stage hand landmark detector.
pub struct MediaPipeHands {
    palm_detector: Detector,
    estimator: Estimator<LandmarkNetwork>,
    max_hands: usize,
    min_presence: f32,
}

impl MediaPipeHands {
    /// Loads the palm and landmark models named by `config`.
    pub fn from_config(config: &HandConfig) -> anyhow::Result<Self> {
        log::info!(
            "loading hand models from {} and {}",
            config.palm_model.display(),
            config.landmark_model.display()
        );
        let mut palm_detector = Detector::new("palm", PalmNetwork::load(&config.palm_model)?);
        palm_detector.set_threshold(config.min_detection_confidence);
        let estimator = Estimator::new("landmark", LandmarkNetwork::load(&config.landmark_model)?);

        Ok(Self {
            palm_detector,
            estimator,
            max_hands: config.max_hands,
            min_presence: config.min_presence,
        })
    }
}

impl HandDetector for MediaPipeHands {
    fn process(&mut self, rgb: ImageView<'_>) -> anyhow::Result<Vec<DetectedHand>> {
        let palms = self.palm_detector.detect(&rgb)?.to_vec();
        let res = rgb.resolution();

        let mut hands = Vec::new();
        for palm in palms.iter().take(self.max_hands) {
            let roi = hand_roi(palm);
            let result = self.estimator.estimate(&rgb.view(roi))?;
            if result.presence() < self.min_presence {
                log::trace!("dropping hand with presence {}", result.presence());
                continue;
            }

            let mut landmarks = [[0.0; 3]; NUM_LANDMARKS];
            for (out, &[x, y, z]) in landmarks.iter_mut().zip(result.landmarks()) {
                *out = normalize(roi.transform_out(x, y), z, res);
            }
            hands.push(
                DetectedHand::new(landmarks, result.presence())
                    .with_handedness(result.handedness()),
            );
        }

        Ok(hands)
    }

    fn timers(&self) -> Vec<&Timer> {
        self.palm_detector
            .timers()
            .chain(self.estimator.timers())
            .collect()
    }
}

/// Computes the region of interest to run the landmark network on from a palm detection.
///
/// The region is rotated so that the fingers point up, shifted from the palm towards the fingers
/// and enlarged to a square that covers the whole hand.
fn hand_roi(palm: &Detection) -> RotatedRect {
    let rect = palm.bounding_rect();
    let angle = palm.angle();

    // Shift along the rotated Y axis.
    let shift = ROI_SHIFT_Y * rect.height();
    let (sin, cos) = angle.sin_cos();
    let (dx, dy) = (-shift * sin, shift * cos);

    let size = rect.width().max(rect.height()) * ROI_SCALE;
    RotatedRect::new(
        Rect::from_center(rect.x_center() + dx, rect.y_center() + dy, size, size),
        angle,
    )
}

fn normalize([x, y]: [f32; 2], z: f32, res: Resolution) -> [f32; 3] {
    let (w, h) = (res.width() as f32, res.height() as f32);
    [x / w, y / h, z / w]
}

/// Names for the hand landmarks, in network output order.
///
/// - **CMC**: Carpometacarpal joint, the lowest joint of the thumb, near the wrist.
/// - **MCP**: Metacarpophalangeal joint, the knuckles near the palm.
/// - **PIP**/**IP**: (Proximal) interphalangeal joint, between the MCP and DIP.
/// - **DIP**: Distal interphalangeal joint, the highest joint of a finger.
/// - **Tip**: the tip of the finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// The bones of the hand skeleton, as pairs of connected landmarks.
pub const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm:
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;

    fn palm(rect: Rect, angle: f32) -> Detection {
        let mut det = Detection::new(0.9, rect);
        det.set_angle(angle);
        det
    }

    #[test]
    fn roi_of_upright_palm() {
        let roi = hand_roi(&palm(Rect::from_center(100.0, 100.0, 40.0, 20.0), 0.0));
        assert_eq!(roi.rotation_radians(), 0.0);
        // Shifted up by half the palm height, 2.6 times the longer side.
        assert_eq!(roi.rect().center(), (100.0, 90.0));
        assert_abs_diff_eq!(roi.rect().width(), 104.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rect().height(), 104.0, epsilon = 1e-4);
    }

    #[test]
    fn roi_follows_rotation() {
        // Fingers pointing right: the crop moves right.
        let roi = hand_roi(&palm(Rect::from_center(100.0, 100.0, 20.0, 20.0), FRAC_PI_2));
        let (x, y) = roi.rect().center();
        assert_abs_diff_eq!(x, 110.0, epsilon = 1e-4);
        assert_abs_diff_eq!(y, 100.0, epsilon = 1e-4);

        // The top edge of the crop (where the fingers are) lies on the right.
        let [tx, ty] = roi.transform_out(26.0, 0.0);
        assert_abs_diff_eq!(tx, x + 26.0, epsilon = 1e-3);
        assert_abs_diff_eq!(ty, y, epsilon = 1e-3);
    }

    #[test]
    fn normalizes_by_frame_size() {
        assert_eq!(
            normalize([320.0, 120.0], -64.0, Resolution::new(640, 480)),
            [0.5, 0.25, -0.1]
        );
    }

    #[test]
    fn pixel_landmarks() {
        let mut landmarks = [[0.5, 0.5, 0.0]; NUM_LANDMARKS];
        landmarks[LandmarkIdx::ThumbTip as usize] = [0.1, 0.875, 0.0];
        landmarks[LandmarkIdx::PinkyTip as usize] = [0.5078125, 0.0, 0.0];
        landmarks[LandmarkIdx::Wrist as usize] = [-0.015625, 1.03125, 0.0];
        let hand = DetectedHand::new(landmarks, 1.0);

        let px = hand.pixel_landmarks(Resolution::new(200, 100));
        assert_eq!(px[LandmarkIdx::IndexFingerTip as usize], (100, 50));
        // 87.5 is truncated, not rounded.
        assert_eq!(px[LandmarkIdx::ThumbTip as usize], (20, 87));
        assert_eq!(px[LandmarkIdx::Wrist as usize], (-3, 103));
        assert_eq!(hand.landmark(LandmarkIdx::ThumbTip), [0.1, 0.875, 0.0]);

        let px = hand.pixel_landmarks(Resolution::new(64, 48));
        assert_eq!(px[LandmarkIdx::PinkyTip as usize], (32, 0));
    }

    #[test]
    fn skeleton_covers_every_landmark() {
        assert_eq!(CONNECTIVITY.len(), 21);
        let mut seen = [false; NUM_LANDMARKS];
        for &(a, b) in CONNECTIVITY {
            seen[a as usize] = true;
            seen[b as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(LandmarkIdx::PinkyTip as usize, NUM_LANDMARKS - 1);
    }
}
