//! Object detection with single-shot detector (SSD) networks.
//!
//! Face and palm detection share everything except the network itself: anchor decoding lives in
//! [`ssd`], merging of duplicates in [`nms`], and [`Detector`] ties them together and maps results
//! from network input space back into the caller's view.

pub mod nms;
pub mod ssd;

use anyhow::bail;

use crate::image::{AsImageView, ImageView, Resolution};
use crate::nn::{Cnn, Outputs};
use crate::rect::Rect;
use crate::timer::Timer;

use self::nms::NonMaxSuppression;

/// A network that finds objects in an image.
pub trait DetectionModel {
    fn cnn(&self) -> &Cnn;

    /// Appends every candidate scoring at least `threshold` to `detections`, in network input
    /// pixel coordinates.
    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Vec<Detection>,
    ) -> anyhow::Result<()>;
}

/// Runs a [`DetectionModel`] and post-processes its candidates.
pub struct Detector {
    model: Box<dyn DetectionModel>,
    threshold: f32,
    nms: NonMaxSuppression,
    detections: Vec<Detection>,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
}

impl Detector {
    /// Creates a detector; `label` prefixes the names of its timers.
    pub fn new(label: &str, model: impl DetectionModel + 'static) -> Self {
        Self {
            model: Box::new(model),
            threshold: 0.5,
            nms: NonMaxSuppression::new(),
            detections: Vec::new(),
            t_infer: Timer::new(format!("{label} infer")),
            t_extract: Timer::new(format!("{label} extract")),
            t_nms: Timer::new(format!("{label} nms")),
        }
    }

    pub fn input_resolution(&self) -> Resolution {
        self.model.cnn().input_resolution()
    }

    /// Minimum confidence of a candidate, 0.5 by default.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }

    /// Detects objects in `image`, merging duplicates. Positions are in `image` coordinates.
    pub fn detect<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&[Detection]> {
        self.run(image.as_view())?;
        self.detections = self.t_nms.time(|| self.nms.process(&mut self.detections));
        Ok(&self.detections)
    }

    /// Like [`Detector::detect`], but leaves duplicates in, for callers that merge the results of
    /// several runs themselves.
    pub fn detect_raw<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&[Detection]> {
        self.run(image.as_view())?;
        Ok(&self.detections)
    }

    fn run(&mut self, image: ImageView<'_>) -> anyhow::Result<()> {
        self.detections.clear();
        let cnn = self.model.cnn();
        let input_res = cnn.input_resolution();
        let Some(aspect) = input_res.aspect_ratio() else {
            bail!("detection network input {input_res} is empty");
        };

        // Pad the image out to the network's aspect ratio rather than distorting it.
        let area = image.rect().grow_to_fit_aspect(aspect);
        let outputs = self.t_infer.time(|| cnn.estimate(&image.view(area)))?;
        log::trace!("detection network outputs: {outputs:?}");
        self.t_extract.time(|| {
            self.model
                .extract(&outputs, self.threshold, &mut self.detections)
        })?;

        let scale = area.width() / input_res.width() as f32;
        for det in &mut self.detections {
            det.map_from_input(area, scale);
        }
        Ok(())
    }
}

/// An object found by a [`Detector`].
///
/// Besides its bounding box, a detection carries a confidence from 0 to 1, a clockwise rotation
/// (0 for networks that don't predict one) and model-specific keypoints.
#[derive(Debug, Clone)]
pub struct Detection {
    confidence: f32,
    angle: f32,
    rect: Rect,
    keypoints: Vec<Keypoint>,
    support: u32,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self::with_keypoints(confidence, rect, Vec::new())
    }

    pub fn with_keypoints(confidence: f32, rect: Rect, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            angle: 0.0,
            rect,
            keypoints,
            support: 1,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Clockwise rotation of the object in radians.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
    }

    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// How many raw candidates were merged into this detection; 1 for unmerged ones.
    pub fn support(&self) -> u32 {
        self.support
    }

    /// Shifts the box and keypoints by `(x, y)`.
    pub fn translate(&mut self, x: f32, y: f32) {
        self.rect = self.rect.move_by(x, y);
        for kp in &mut self.keypoints {
            kp.x += x;
            kp.y += y;
        }
    }

    /// Converts from network input pixels into the coordinates of the view `area` was cut from.
    fn map_from_input(&mut self, area: Rect, scale: f32) {
        let map = |x: f32, y: f32| (x * scale + area.x(), y * scale + area.y());
        let (xc, yc) = map(self.rect.x_center(), self.rect.y_center());
        let (w, h) = (self.rect.width() * scale, self.rect.height() * scale);
        self.rect = Rect::from_center(xc, yc, w, h);
        for kp in &mut self.keypoints {
            (kp.x, kp.y) = map(kp.x, kp.y);
        }
    }
}

/// A point of interest on a detected object, e.g. the wrist of a palm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    x: f32,
    y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_network_coordinates_into_view() {
        // A 256x256 area starting at (-32, 10), sampled by a 128x128 network.
        let area = Rect::from_top_left(-32.0, 10.0, 256.0, 256.0);
        let mut det = Detection::with_keypoints(
            0.9,
            Rect::from_center(64.0, 32.0, 10.0, 20.0),
            vec![Keypoint::new(0.0, 128.0)],
        );
        det.map_from_input(area, 2.0);

        assert_eq!(det.bounding_rect(), Rect::from_center(96.0, 74.0, 20.0, 40.0));
        assert_eq!(det.keypoints(), &[Keypoint::new(-32.0, 266.0)]);
        assert_eq!(det.support(), 1);
    }

    #[test]
    fn translation_moves_keypoints_along() {
        let mut det = Detection::with_keypoints(
            0.5,
            Rect::from_top_left(0.0, 0.0, 4.0, 4.0),
            vec![Keypoint::new(1.0, 1.0), Keypoint::new(3.0, 2.0)],
        );
        det.translate(10.0, -5.0);
        assert_eq!(det.bounding_rect(), Rect::from_top_left(10.0, -5.0, 4.0, 4.0));
        assert_eq!(
            det.keypoints(),
            &[Keypoint::new(11.0, -4.0), Keypoint::new(13.0, -3.0)],
        );
    }
}
