//! Palm detection.

use std::path::Path;

use anyhow::ensure;
use nalgebra::{Point2, Rotation2, Vector2};

use crate::detection::{
    ssd::{AnchorGrid, Anchors},
    Detection, DetectionModel,
};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

/// A keypoint of a palm [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

/// MediaPipe's "lite" palm detection network.
///
/// Takes a 192x192 RGB input and decodes 2016 SSD anchors, each with a palm box and 7 keypoints.
/// This network is a lot heavier than the face detector, CPU inference takes several times as long.
pub struct PalmNetwork {
    cnn: Cnn,
    anchors: Anchors,
}

impl PalmNetwork {
    /// Loads the network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?.load()?;
        Ok(Self {
            cnn: Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(0.0..=1.0))?,
            anchors: Anchors::new(&[AnchorGrid::new(2, 24, 24), AnchorGrid::new(6, 12, 12)]),
        })
    }
}

impl DetectionModel for PalmNetwork {
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
            "palm detection network has {} outputs, expected boxes and scores",
            outputs.len()
        );

        let start = detections.len();
        self.anchors.decode(
            self.cnn.input_resolution(),
            &outputs[0],
            &outputs[1],
            threshold,
            detections,
        )?;

        for det in &mut detections[start..] {
            ensure!(
                det.keypoints().len() == 7,
                "palm detection has {} keypoints, expected 7",
                det.keypoints().len()
            );
            let angle = palm_angle(det);
            det.set_angle(angle);
        }

        Ok(())
    }
}

/// Computes the clockwise rotation of a palm; 0 means the fingers point up.
fn palm_angle(det: &Detection) -> f32 {
    let a = det.keypoints()[Keypoint::MiddleFingerMcp as usize];
    let finger = Point2::new(a.x(), a.y());
    let b = det.keypoints()[Keypoint::Wrist as usize];
    let wrist = Point2::new(b.x(), b.y());

    Rotation2::rotation_between(&Vector2::y(), &(wrist - finger)).angle()
}
