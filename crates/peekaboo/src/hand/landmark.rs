//! The hand landmark network.

use std::path::Path;

use anyhow::ensure;

use crate::landmark::{Estimate, LandmarkModel, Position};
use crate::nn::{tensor::Tensor, Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

use super::NUM_LANDMARKS;

/// Handedness scores above this mean a right hand.
const RIGHT_HAND_THRESHOLD: f32 = 0.5;

/// What [`LandmarkNetwork`] predicts for one hand crop.
#[derive(Debug, Clone)]
pub struct LandmarkResult {
    landmarks: [Position; NUM_LANDMARKS],
    presence: f32,
    handedness_score: f32,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        Self {
            landmarks: [[0.0; 3]; NUM_LANDMARKS],
            presence: 0.0,
            handedness_score: 0.0,
        }
    }
}

impl LandmarkResult {
    pub fn landmarks(&self) -> &[Position; NUM_LANDMARKS] {
        &self.landmarks
    }

    /// Confidence that the crop contains a hand at all, from 0 to 1.
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Which hand this is. Meaningless when [`presence`](Self::presence) is low.
    pub fn handedness(&self) -> Handedness {
        if self.handedness_score > RIGHT_HAND_THRESHOLD {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }
}

impl Estimate for LandmarkResult {
    fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.landmarks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// MediaPipe's hand landmark model (the "lite" variant works, as does "full").
///
/// Input is a 224x224 RGB crop with the fingers pointing up. Only the first three outputs are
/// computed: screen landmarks `[1, 63]`, presence `[1, 1]` and handedness `[1, 1]`. The
/// world-space landmarks are skipped.
pub struct LandmarkNetwork {
    cnn: Cnn,
}

impl LandmarkNetwork {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?
            .with_output_selection([0, 1, 2])
            .load()?;
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(0.0..=1.0))?;
        Ok(Self { cnn })
    }
}

impl LandmarkModel for LandmarkNetwork {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, result: &mut LandmarkResult) -> anyhow::Result<()> {
        ensure!(
            outputs.len() == 3,
            "expected 3 hand landmark outputs, got {}",
            outputs.len()
        );
        decode(&outputs[0], &outputs[1], &outputs[2], result)
    }
}

fn decode(
    landmarks: &Tensor,
    presence: &Tensor,
    handedness: &Tensor,
    result: &mut LandmarkResult,
) -> anyhow::Result<()> {
    ensure!(
        landmarks.shape() == [1, NUM_LANDMARKS * 3],
        "hand landmarks have shape {:?}, expected [1, {}]",
        landmarks.shape(),
        NUM_LANDMARKS * 3,
    );
    for (name, score) in [("presence", presence), ("handedness", handedness)] {
        ensure!(
            score.shape() == [1, 1],
            "hand {name} has shape {:?}, expected [1, 1]",
            score.shape(),
        );
    }

    result.presence = presence.index([0, 0]).as_singular();
    result.handedness_score = handedness.index([0, 0]).as_singular();
    let coords = landmarks.index([0]).as_slice().chunks_exact(3);
    for (pos, xyz) in result.landmarks.iter_mut().zip(coords) {
        *pos = [xyz[0], xyz[1], xyz[2]];
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(value: f32) -> Tensor {
        Tensor::from_iter(&[1, 1], [value])
    }

    #[test]
    fn decodes_outputs() {
        let coords = Tensor::from_iter(&[1, 63], (0..63).map(|i| i as f32));
        let mut result = LandmarkResult::default();
        decode(&coords, &score(0.97), &score(0.2), &mut result).unwrap();

        assert_eq!(result.presence(), 0.97);
        assert_eq!(result.handedness(), Handedness::Left);
        assert_eq!(result.landmarks()[0], [0.0, 1.0, 2.0]);
        assert_eq!(result.landmarks()[20], [60.0, 61.0, 62.0]);

        decode(&coords, &score(0.5), &score(0.8), &mut result).unwrap();
        assert_eq!(result.handedness(), Handedness::Right);
    }

    #[test]
    fn rejects_wrong_shapes() {
        let mut result = LandmarkResult::default();
        let short = Tensor::from_iter(&[1, 60], [0.0; 60]);
        assert!(decode(&short, &score(0.0), &score(0.0), &mut result).is_err());

        let coords = Tensor::from_iter(&[1, 63], [0.0; 63]);
        let wide = Tensor::from_iter(&[1, 2], [0.0; 2]);
        assert!(decode(&coords, &wide, &score(0.0), &mut result).is_err());
    }
}
