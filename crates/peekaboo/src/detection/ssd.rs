//! Anchor grids of single shot detectors (SSDs) and decoding of their raw outputs.
//!
//! The MediaPipe detectors predict one box per anchor. Anchors have a fixed size and sit at the
//! centers of the cells of one or more feature map grids, so an anchor is just a point.

use anyhow::ensure;

use crate::{nn::tensor::Tensor, num::sigmoid, rect::Rect, resolution::Resolution};

use super::{Detection, Keypoint};

/// A feature map grid with `per_cell` anchors in each cell.
#[derive(Debug, Clone, Copy)]
pub struct AnchorGrid {
    per_cell: u32,
    cells: Resolution,
}

impl AnchorGrid {
    /// # Panics
    ///
    /// Panics if `per_cell` is 0.
    pub fn new(per_cell: u32, columns: u32, rows: u32) -> Self {
        assert!(per_cell > 0, "anchor grid without anchors");
        Self {
            per_cell,
            cells: Resolution::new(columns, rows),
        }
    }

    /// Anchor centers of this grid in output order (row by row), normalized to 0..1.
    fn centers(&self) -> impl Iterator<Item = [f32; 2]> + '_ {
        let (columns, rows) = (self.cells.width(), self.cells.height());
        (0..rows).flat_map(move |row| {
            (0..columns).flat_map(move |col| {
                let center = [
                    (col as f32 + 0.5) / columns as f32,
                    (row as f32 + 0.5) / rows as f32,
                ];
                (0..self.per_cell).map(move |_| center)
            })
        })
    }
}

/// All anchors of a network, in the order its outputs list them.
pub struct Anchors {
    centers: Vec<[f32; 2]>,
}

impl Anchors {
    pub fn new(grids: &[AnchorGrid]) -> Self {
        Self {
            centers: grids.iter().flat_map(|grid| grid.centers()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Normalized center of anchor `index`.
    pub fn center(&self, index: usize) -> [f32; 2] {
        self.centers[index]
    }

    /// Decodes the `boxes` and `scores` outputs of an SSD network.
    ///
    /// `boxes` is `[1, anchors, 4 + 2 * keypoints]`: per anchor the box center (relative to the
    /// anchor), box width and height, then keypoint positions (also relative to the anchor), all
    /// in input pixels. `scores` is `[1, anchors, 1]` and holds logits.
    ///
    /// Every candidate with a confidence of at least `threshold` is appended to `detections`.
    pub fn decode(
        &self,
        input_res: Resolution,
        boxes: &Tensor,
        scores: &Tensor,
        threshold: f32,
        detections: &mut Vec<Detection>,
    ) -> anyhow::Result<()> {
        let count = self.len();
        ensure!(
            boxes.rank() == 3 && boxes.shape()[..2] == [1, count],
            "box output {:?} does not match {count} anchors",
            boxes.shape()
        );
        ensure!(
            scores.shape() == [1, count, 1],
            "score output {:?} does not match {count} anchors",
            scores.shape()
        );
        let values = boxes.shape()[2];
        ensure!(
            values >= 4 && values % 2 == 0,
            "{values} values per box cannot hold a box and whole keypoints"
        );

        let (w, h) = (input_res.width() as f32, input_res.height() as f32);
        let anchors = scores.index([0]).iter().zip(self.centers.iter().copied());
        for (i, (logit, [ax, ay])) in anchors.enumerate() {
            let confidence = sigmoid(logit.as_slice()[0]);
            if confidence < threshold {
                continue;
            }

            let raw = boxes.index([0, i]).as_slice();
            let at = |dx: f32, dy: f32| Keypoint::new(ax * w + dx, ay * h + dy);
            let center = at(raw[0], raw[1]);
            let keypoints = raw[4..].chunks_exact(2).map(|p| at(p[0], p[1])).collect();
            detections.push(Detection::with_keypoints(
                confidence,
                Rect::from_center(center.x(), center.y(), raw[2], raw[3]),
                keypoints,
            ));
        }

        Ok(())
    }
}
