//! Merging of overlapping detections.
//!
//! SSD networks fire many anchors for a single object, and running a network over several crops
//! of the same frame multiplies that further. [`NonMaxSuppression`] groups detections whose boxes
//! overlap enough and replaces each group with its confidence-weighted average (non-maximum
//! averaging, which jitters less from frame to frame than keeping only the best box).
//!
//! Every merged detection remembers how many raw detections went into it, see
//! [`Detection::support`]. The face detector uses this like a "minimum neighbors" filter.

use itertools::Itertools;

use crate::rect::Rect;

use super::{Detection, Keypoint};

/// Groups overlapping detections and averages each group.
pub struct NonMaxSuppression {
    iou_thresh: f32,
    group: Vec<Detection>,
}

impl NonMaxSuppression {
    /// Detections whose intersection over union reaches this value belong to the same object.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            group: Vec::new(),
        }
    }

    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    /// Merges overlapping `detections`, leaving `detections` empty.
    ///
    /// The result is ordered by descending confidence. Each output keeps the confidence of the
    /// strongest detection of its group.
    pub fn process(&mut self, detections: &mut Vec<Detection>) -> Vec<Detection> {
        // Strongest last, so that `pop` yields them first.
        detections.sort_unstable_by(|a, b| a.confidence.total_cmp(&b.confidence));

        let mut merged = Vec::new();
        while let Some(best) = detections.pop() {
            let best_rect = best.bounding_rect();
            let iou_thresh = self.iou_thresh;
            self.group.clear();
            self.group.extend(
                detections
                    .iter()
                    .filter(|det| best_rect.iou(&det.bounding_rect()) >= iou_thresh)
                    .cloned(),
            );
            detections.retain(|det| best_rect.iou(&det.bounding_rect()) < iou_thresh);

            self.group.push(best);
            merged.push(average(&self.group));
        }
        merged
    }
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Averages `group`, weighting every member by its confidence.
///
/// The last member is the strongest one and provides the confidence of the result. Angles are
/// averaged as unit vectors, so that angles close to +π and -π average to about ±π.
fn average(group: &[Detection]) -> Detection {
    let best = &group[group.len() - 1];
    let mut keypoints = vec![Keypoint::new(0.0, 0.0); best.keypoints.len()];
    let [mut xc, mut yc, mut w, mut h, mut total] = [0.0; 5];
    let (mut sin, mut cos) = (0.0f32, 0.0f32);
    let mut support = 0;
    for det in group {
        let weight = det.confidence;
        let rect = det.bounding_rect();
        xc += rect.x_center() * weight;
        yc += rect.y_center() * weight;
        w += rect.width() * weight;
        h += rect.height() * weight;
        sin += det.angle.sin() * weight;
        cos += det.angle.cos() * weight;
        for (sum, kp) in keypoints.iter_mut().zip_eq(&det.keypoints) {
            sum.x += kp.x * weight;
            sum.y += kp.y * weight;
        }
        total += weight;
        support += det.support;
    }

    for kp in &mut keypoints {
        kp.x /= total;
        kp.y /= total;
    }
    let rect = Rect::from_center(xc / total, yc / total, w / total, h / total);
    Detection {
        confidence: best.confidence,
        angle: sin.atan2(cos),
        rect,
        keypoints,
        support,
    }
}
