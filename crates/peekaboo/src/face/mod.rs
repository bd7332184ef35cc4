//! Face detection.
//!
//! [`BlazeFaceDetector`] runs MediaPipe's short-range "BlazeFace" network over a small image
//! pyramid and only reports faces that were found repeatedly, which makes it behave like a
//! classic cascade detector with a scale factor and a minimum neighbor count.

mod blazeface;

pub use blazeface::{BlazeFaceDetector, ShortRangeNetwork};

use crate::image::ImageView;
use crate::rect::Rect;
use crate::timer::Timer;

/// An axis-aligned face bounding box in frame pixel coordinates.
///
/// Only valid for the frame it was detected in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedFace {
    rect: Rect,
    confidence: f32,
}

impl DetectedFace {
    pub fn new(rect: Rect, confidence: f32) -> Self {
        Self { rect, confidence }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

/// Per-frame face detector.
pub trait FaceDetector {
    /// Detects all faces in a grayscale frame.
    fn detect(&mut self, gray: ImageView<'_>) -> anyhow::Result<Vec<DetectedFace>>;

    /// Timers of the detector's internal stages, logged along with the frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, gray: ImageView<'_>) -> anyhow::Result<Vec<DetectedFace>> {
        (**self).detect(gray)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}
