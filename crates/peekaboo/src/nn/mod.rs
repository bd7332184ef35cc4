//! ONNX inference through `tract`.
//!
//! [`NeuralNetwork`] wraps an optimized execution plan for a model file. [`Cnn`] puts an image
//! front end on top of it: it samples an [`ImageView`] at the network's input resolution and
//! rescales the color values into the range the network was trained with.

pub mod tensor;

use std::{ops::Index, path::Path, sync::Arc};

use anyhow::{bail, ensure, Context};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::image::{AsImageView, Color, ImageView, Resolution};
use tensor::Tensor;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Order of the dimensions of an image input tensor.
///
/// `N` is the batch size (always 1), `C` the color channel (RGB), `H` the row and `W` the column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CnnInputShape {
    /// `[1, 3, H, W]`: one plane per color channel.
    NCHW,
    /// `[1, H, W, 3]`: interleaved channels.
    NHWC,
}

impl CnnInputShape {
    /// Extracts the input resolution from a tensor shape, if it has this layout.
    fn resolution(self, shape: &[usize]) -> Option<(usize, usize)> {
        match (self, shape) {
            (Self::NCHW, &[1, 3, h, w]) | (Self::NHWC, &[1, h, w, 3]) => Some((w, h)),
            _ => None,
        }
    }
}

/// Converts 8-bit sRGB channel values into network input values.
#[derive(Debug, Clone, Copy)]
pub struct ColorMapper {
    offset: f32,
    scale: f32,
}

impl ColorMapper {
    /// Maps 0 to the start and 255 to the end of `range`, linearly.
    ///
    /// # Panics
    ///
    /// Panics if the range is empty.
    pub fn linear(range: std::ops::RangeInclusive<f32>) -> Self {
        let (start, end) = range.into_inner();
        assert!(end > start, "empty color range {start}..={end}");
        Self {
            offset: start,
            scale: (end - start) / 255.0,
        }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        color.rgb().map(|c| c as f32 * self.scale + self.offset)
    }
}

/// A network taking a single RGB image as input.
///
/// Cloning is cheap; clones share the loaded model.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    layout: CnnInputShape,
    colors: ColorMapper,
    input_res: Resolution,
}

impl Cnn {
    /// Wraps `nn`, which must take exactly one input in the given `layout`.
    pub fn new(
        nn: NeuralNetwork,
        layout: CnnInputShape,
        colors: ColorMapper,
    ) -> anyhow::Result<Self> {
        ensure!(
            nn.num_inputs() == 1,
            "image network must take exactly 1 input, this one takes {}",
            nn.num_inputs(),
        );
        let shape = nn.input_shape(0)?;
        let Some((w, h)) = layout.resolution(shape) else {
            bail!("input shape {shape:?} does not match the {layout:?} layout");
        };

        Ok(Self {
            input_res: Resolution::new(w.try_into()?, h.try_into()?),
            nn,
            layout,
            colors,
        })
    }

    /// The size images are resampled to before inference.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on `image`.
    ///
    /// The image is stretched to the input resolution, so callers should pass a view with the
    /// matching aspect ratio.
    pub fn estimate<V: AsImageView>(&self, image: &V) -> anyhow::Result<Outputs> {
        let input = self.to_tensor(image.as_view());
        self.nn.estimate(&[input])
    }

    fn to_tensor(&self, view: ImageView<'_>) -> Tensor {
        let (w, h) = (
            self.input_res.width() as usize,
            self.input_res.height() as usize,
        );
        // Nearest neighbor: every input cell takes the view pixel under its center.
        let sx = view.width() as f32 / w as f32;
        let sy = view.height() as f32 / h as f32;
        let sample = |x: usize, y: usize, c: usize| {
            let px = view.get(((x as f32 + 0.5) * sx) as u32, ((y as f32 + 0.5) * sy) as u32);
            self.colors.map(px)[c]
        };

        match self.layout {
            CnnInputShape::NCHW => {
                Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| sample(x, y, c))
            }
            CnnInputShape::NHWC => {
                Tensor::from_array_shape_fn([1, h, w, 3], |[_, y, x, c]| sample(x, y, c))
            }
        }
    }
}

/// Options for loading a [`NeuralNetwork`].
pub struct Loader {
    onnx: Vec<u8>,
    outputs: Option<Vec<usize>>,
}

impl Loader {
    /// Restricts inference to the given outputs.
    ///
    /// [`Outputs`] will then hold exactly these tensors, in the given order. Networks with
    /// auxiliary outputs run faster when those are left out.
    pub fn with_output_selection(mut self, outputs: impl Into<Vec<usize>>) -> Self {
        self.outputs = Some(outputs.into());
        self
    }

    /// Parses and optimizes the model.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &self.onnx[..])?
            .into_optimized()?;
        let available = graph.output_outlets()?.to_vec();
        let outlets = match self.outputs {
            None => available,
            Some(selection) => selection
                .into_iter()
                .map(|i| {
                    available.get(i).copied().with_context(|| {
                        format!("no output {i}, network has {}", available.len())
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
        };

        let plan = SimplePlan::new_for_outputs(graph, &outlets)?;
        Ok(NeuralNetwork(Arc::new(plan)))
    }
}

/// A loaded network, ready for inference. Clones share the same plan.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Plan>);

impl NeuralNetwork {
    /// Reads an `.onnx` model file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Loader> {
        let path = path.as_ref();
        if path.extension().map_or(true, |ext| ext != "onnx") {
            bail!("expected an `.onnx` model file, got {}", path.display());
        }

        let onnx = std::fs::read(path)
            .with_context(|| format!("failed to read model from {}", path.display()))?;
        Ok(Self::from_onnx(onnx))
    }

    /// Uses an ONNX model that is already in memory.
    pub fn from_onnx(onnx: impl Into<Vec<u8>>) -> Loader {
        Loader {
            onnx: onnx.into(),
            outputs: None,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Shape of input `index`. Fails for inputs with symbolic dimensions.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<&[usize]> {
        self.0
            .model()
            .input_fact(index)?
            .shape
            .as_concrete()
            .with_context(|| format!("shape of input {index} is not fully known"))
    }

    /// Runs one inference pass.
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &[Tensor]) -> anyhow::Result<Outputs> {
        let inputs = inputs
            .iter()
            .map(|t| Ok(TValue::from_const(Arc::new(t.to_tract()?))))
            .collect::<anyhow::Result<TVec<_>>>()?;
        let tensors = self
            .0
            .run(inputs)?
            .iter()
            .map(|t| Tensor::from_tract(t))
            .collect::<anyhow::Result<_>>()?;
        Ok(Outputs(tensors))
    }
}

/// Output tensors of an inference pass, indexed like the network's outputs (or the selection
/// passed to [`Loader::with_output_selection`]).
#[derive(Debug)]
pub struct Outputs(TVec<Tensor>);

impl Outputs {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.0.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.0[index]
    }
}

impl FromIterator<Tensor> for Outputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_ranges() {
        let signed = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(signed.map(Color::BLACK), [-1.0; 3]);
        assert_eq!(signed.map(Color::WHITE), [1.0; 3]);

        let unit = ColorMapper::linear(0.0..=1.0);
        assert_eq!(unit.map(Color::RED), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn layouts() {
        assert_eq!(CnnInputShape::NCHW.resolution(&[1, 3, 128, 96]), Some((96, 128)));
        assert_eq!(CnnInputShape::NHWC.resolution(&[1, 224, 192, 3]), Some((192, 224)));
        assert_eq!(CnnInputShape::NCHW.resolution(&[1, 224, 224, 3]), None);
        assert_eq!(CnnInputShape::NHWC.resolution(&[2, 224, 224, 3]), None);
    }

    #[test]
    fn rejects_non_onnx_path() {
        let err = NeuralNetwork::from_path("models/face.tflite").err().unwrap();
        assert!(err.to_string().contains("`.onnx`"), "{err}");
    }

    #[test]
    fn missing_model_file() {
        let err = NeuralNetwork::from_path("does/not/exist.onnx").err().unwrap();
        assert!(format!("{err:#}").contains("does/not/exist.onnx"), "{err:#}");
    }

    #[test]
    fn malformed_model() {
        let loader = NeuralNetwork::from_onnx(&b"definitely not protobuf"[..]);
        assert!(loader.load().is_err());
    }
}
