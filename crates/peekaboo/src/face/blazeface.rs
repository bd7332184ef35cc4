use std::path::Path;

use anyhow::ensure;

use crate::config::FaceConfig;
use crate::detection::{
    nms::NonMaxSuppression,
    ssd::{AnchorGrid, Anchors},
    Detection, DetectionModel, Detector,
};
use crate::image::{ImageView, Resolution};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};
use crate::rect::Rect;
use crate::timer::Timer;

use super::{DetectedFace, FaceDetector};

/// The short-range BlazeFace network, best for faces within about 2 meters of the camera.
///
/// Takes a 128x128 RGB input and decodes 896 SSD anchors, each with a box and 6 facial keypoints.
pub struct ShortRangeNetwork {
    cnn: Cnn,
    anchors: Anchors,
}

impl ShortRangeNetwork {
    /// Loads the network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?.load()?;
        Ok(Self {
            cnn: Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(-1.0..=1.0))?,
            anchors: Anchors::new(&[AnchorGrid::new(2, 16, 16), AnchorGrid::new(6, 8, 8)]),
        })
    }
}

impl DetectionModel for ShortRangeNetwork {
    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Vec<Detection>,
    ) -> anyhow::Result<()> {
        ensure!(
            outputs.len() >= 2,
            "face detection network has {} outputs, expected boxes and scores",
            outputs.len()
        );
        self.anchors.decode(
            self.cnn.input_resolution(),
            &outputs[0],
            &outputs[1],
            threshold,
            detections,
        )
    }
}

/// Face detector running a [`DetectionModel`] over an image pyramid.
///
/// Level `k` of the pyramid tiles the whole frame with overlapping crops of `1 / scale_factor^k`
/// of its size. Raw detections of all levels are merged by overlap, and a face is only reported
/// when at least `min_neighbors` raw detections back up the strongest one.
pub struct BlazeFaceDetector {
    detector: Detector,
    nms: NonMaxSuppression,
    scale_factor: f32,
    min_neighbors: u32,
    max_levels: u32,
    raw: Vec<Detection>,
    t_merge: Timer,
}

impl BlazeFaceDetector {
    /// Loads the face detection model named by `config` and creates a detector with its
    /// parameters.
    pub fn from_config(config: &FaceConfig) -> anyhow::Result<Self> {
        log::info!("loading face detection model from {}", config.model.display());
        Self::new(ShortRangeNetwork::load(&config.model)?, config)
    }

    pub fn new<N>(network: N, config: &FaceConfig) -> anyhow::Result<Self>
    where
        N: DetectionModel + 'static,
    {
        ensure!(
            config.scale_factor > 1.0,
            "face detection scale factor must be greater than 1, got {}",
            config.scale_factor
        );
        ensure!(
            config.max_levels > 0,
            "face detection needs at least one pyramid level"
        );

        Ok(Self {
            detector: Detector::new("face", network),
            nms: NonMaxSuppression::new(),
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            max_levels: config.max_levels,
            raw: Vec::new(),
            t_merge: Timer::new("face merge"),
        })
    }
}

impl FaceDetector for BlazeFaceDetector {
    fn detect(&mut self, gray: ImageView<'_>) -> anyhow::Result<Vec<DetectedFace>> {
        self.raw.clear();

        let crops = pyramid_crops(
            gray.resolution(),
            self.detector.input_resolution(),
            self.scale_factor,
            self.max_levels,
        );
        for crop in crops {
            let view = gray.view(crop);
            let detections = self.detector.detect_raw(&view)?;
            self.raw.extend(detections.iter().map(|det| {
                let mut det = det.clone();
                det.translate(crop.x(), crop.y());
                det
            }));
        }

        let _guard = self.t_merge.start();
        let raw_count = self.raw.len();
        let faces = merge_neighbors(&mut self.nms, &mut self.raw, self.min_neighbors);
        log::trace!("{} faces from {} raw detections", faces.len(), raw_count);
        Ok(faces)
    }

    fn timers(&self) -> Vec<&Timer> {
        self.detector.timers().chain([&self.t_merge]).collect()
    }
}

/// Computes the crops of `frame` making up the detection pyramid, largest level first.
///
/// The first level is always the whole frame. Further levels shrink by `scale_factor` each and end
/// when a crop would be smaller than the network input. Every level covers the whole frame with
/// tiles overlapping by at least half their size, so anything up to half a tile in size lies
/// completely inside one of them.
fn pyramid_crops(
    frame: Resolution,
    input: Resolution,
    scale_factor: f32,
    max_levels: u32,
) -> Vec<Rect> {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    let min_side = input.width().min(input.height()) as f32;

    let mut crops = vec![Rect::from_top_left(0.0, 0.0, w, h)];
    for k in 1..max_levels {
        let shrink = scale_factor.powi(k as i32);
        let (crop_w, crop_h) = (w / shrink, h / shrink);
        if crop_w.min(crop_h) < min_side {
            break;
        }
        for y in tile_offsets(h, crop_h) {
            for x in tile_offsets(w, crop_w) {
                crops.push(Rect::from_top_left(x, y, crop_w, crop_h));
            }
        }
    }
    crops
}

/// Start offsets of tiles of length `tile` spread evenly over `0..len`, at most `tile / 2` apart.
///
/// The first tile starts at 0 and the last one ends at `len`.
fn tile_offsets(len: f32, tile: f32) -> impl Iterator<Item = f32> {
    let free = (len - tile).max(0.0);
    let gaps = (free / (tile * 0.5)).ceil() as u32;
    (0..=gaps).map(move |i| match gaps {
        0 => 0.0,
        _ => free * i as f32 / gaps as f32,
    })
}

/// Merges overlapping raw detections and keeps the clusters with more than `min_neighbors`
/// members.
fn merge_neighbors(
    nms: &mut NonMaxSuppression,
    raw: &mut Vec<Detection>,
    min_neighbors: u32,
) -> Vec<DetectedFace> {
    nms.process(raw)
        .into_iter()
        .filter(|det| det.support() > min_neighbors)
        .map(|det| DetectedFace::new(det.bounding_rect(), det.confidence()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Groups consecutive crops of the same size into levels.
    fn levels(crops: &[Rect]) -> Vec<Vec<Rect>> {
        let mut levels: Vec<Vec<Rect>> = Vec::new();
        for &crop in crops {
            match levels.last_mut() {
                Some(level) if level[0].height() == crop.height() => level.push(crop),
                _ => levels.push(vec![crop]),
            }
        }
        levels
    }

    fn contains(outer: &Rect, inner: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        outer.x() <= inner.x() + EPS
            && outer.y() <= inner.y() + EPS
            && inner.x() + inner.width() <= outer.x() + outer.width() + EPS
            && inner.y() + inner.height() <= outer.y() + outer.height() + EPS
    }

    #[test]
    fn pyramid_levels_shrink_by_scale_factor() {
        let crops = pyramid_crops(Resolution::new(640, 480), Resolution::new(128, 128), 1.3, 4);
        let levels = levels(&crops);
        assert_eq!(levels[0], [Rect::from_top_left(0.0, 0.0, 640.0, 480.0)]);
        assert_eq!(levels.iter().map(Vec::len).collect::<Vec<_>>(), [1, 4, 9, 16]);
        for (k, level) in levels.iter().enumerate() {
            let expected = 480.0 / 1.3f32.powi(k as i32);
            for crop in level {
                assert!((crop.height() - expected).abs() < 1e-3, "{crop:?}");
            }
        }
    }

    #[test]
    fn every_level_reaches_the_frame_edges() {
        let frame = Rect::from_top_left(0.0, 0.0, 640.0, 480.0);
        let crops = pyramid_crops(Resolution::new(640, 480), Resolution::new(128, 128), 1.3, 4);
        let faces = [
            Rect::from_top_left(0.0, 0.0, 60.0, 60.0),
            Rect::from_top_left(10.0, 200.0, 60.0, 60.0),
            Rect::from_top_left(580.0, 420.0, 60.0, 60.0),
            Rect::from_top_left(300.0, 0.0, 60.0, 60.0),
            Rect::from_top_left(290.0, 210.0, 60.0, 60.0),
        ];

        for level in levels(&crops) {
            for crop in &level {
                assert!(contains(&frame, crop), "{crop:?} leaves the frame");
            }
            for face in &faces {
                assert!(
                    level.iter().any(|crop| contains(crop, face)),
                    "{face:?} not inside any crop of {level:?}"
                );
            }
        }
    }

    #[test]
    fn pyramid_stops_at_network_size() {
        let crops = pyramid_crops(Resolution::new(200, 200), Resolution::new(128, 128), 1.3, 10);
        assert_eq!(levels(&crops).len(), 2);

        // Frames smaller than the network input still get one pass.
        let crops = pyramid_crops(Resolution::new(64, 48), Resolution::new(128, 128), 1.3, 4);
        assert_eq!(crops, [Rect::from_top_left(0.0, 0.0, 64.0, 48.0)]);
    }

    #[test]
    fn tile_offsets_span_the_length() {
        assert_eq!(tile_offsets(640.0, 400.0).collect::<Vec<_>>(), [0.0, 120.0, 240.0]);
        assert_eq!(tile_offsets(100.0, 100.0).collect::<Vec<_>>(), [0.0]);
    }

    fn cluster(x: f32, count: usize) -> impl Iterator<Item = Detection> {
        (0..count).map(move |i| {
            Detection::new(0.6 + i as f32 * 0.01, Rect::from_center(x + i as f32, 50.0, 40.0, 40.0))
        })
    }

    #[test]
    fn requires_min_neighbors() {
        let mut raw = cluster(50.0, 6).chain(cluster(300.0, 5)).collect::<Vec<_>>();
        let faces = merge_neighbors(&mut NonMaxSuppression::new(), &mut raw, 5);

        // 6 detections: the seed plus 5 neighbors. The 5-detection cluster is dropped.
        assert_eq!(faces.len(), 1);
        let face = faces[0];
        assert!((face.rect().x_center() - 52.5).abs() < 0.5, "{face:?}");
        assert!((face.confidence() - 0.65).abs() < 1e-6);
    }

    #[test]
    fn zero_neighbors_keeps_everything() {
        let mut raw = cluster(50.0, 1).chain(cluster(300.0, 2)).collect::<Vec<_>>();
        let faces = merge_neighbors(&mut NonMaxSuppression::new(), &mut raw, 0);
        assert_eq!(faces.len(), 2);
    }
}
