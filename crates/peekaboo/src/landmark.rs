//! Running landmark networks on image crops.
//!
//! A landmark network looks at a small region of interest (a hand, say) and predicts the positions
//! of a fixed set of keypoints in it. [`Estimator`] feeds such a network and maps its predictions
//! back from network input space into the coordinates of the view it was given.

use anyhow::bail;

use crate::image::{AsImageView, ImageView};
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

/// A landmark position: X and Y in pixels, Z a relative depth on the same scale as X.
///
/// Smaller Z values are closer to the camera.
pub type Position = [f32; 3];

/// The decoded output of a landmark network.
pub trait Estimate: Default {
    fn positions_mut(&mut self) -> &mut [Position];
}

/// A network that predicts landmarks on an image crop.
pub trait LandmarkModel {
    type Output: Estimate;

    fn cnn(&self) -> &Cnn;

    /// Decodes `outputs` into `estimate`, with positions in the pixel space of the network input.
    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()>;
}

/// Runs a [`LandmarkModel`] and reuses its output buffer between calls.
pub struct Estimator<M: LandmarkModel> {
    model: M,
    estimate: M::Output,
    t_infer: Timer,
    t_extract: Timer,
}

impl<M: LandmarkModel> Estimator<M> {
    /// Creates an estimator; `label` prefixes the names of its timers.
    pub fn new(label: &str, model: M) -> Self {
        Self {
            model,
            estimate: M::Output::default(),
            t_infer: Timer::new(format!("{label} infer")),
            t_extract: Timer::new(format!("{label} extract")),
        }
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract].into_iter()
    }

    /// Estimates landmarks in `image`, returning positions in `image`'s coordinates.
    ///
    /// When `image` does not have the network's aspect ratio, the network sees a larger area
    /// centered on it, which may include pixels of the parent image.
    pub fn estimate<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&M::Output> {
        self.run(image.as_view())
    }

    fn run(&mut self, image: ImageView<'_>) -> anyhow::Result<&M::Output> {
        let cnn = self.model.cnn();
        let input_res = cnn.input_resolution();
        let Some(aspect) = input_res.aspect_ratio() else {
            bail!("landmark network input {input_res} is empty");
        };

        let area = image.rect().grow_to_fit_aspect(aspect);
        let outputs = self.t_infer.time(|| cnn.estimate(&image.view(area)))?;
        log::trace!("landmark network outputs: {outputs:?}");
        self.t_extract
            .time(|| self.model.extract(&outputs, &mut self.estimate))?;

        let scale = area.width() / input_res.width() as f32;
        let origin = (area.x(), area.y());
        for pos in self.estimate.positions_mut() {
            *pos = to_view(*pos, origin, scale);
        }

        Ok(&self.estimate)
    }
}

/// Maps a position in network input space to the view whose `origin`-based area was sampled.
fn to_view(pos: Position, (x0, y0): (f32, f32), scale: f32) -> Position {
    let [x, y, z] = pos.map(|t| t * scale);
    [x + x0, y + y0, z]
}
