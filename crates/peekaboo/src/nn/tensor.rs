//! Dense `f32` tensors passed into and out of networks.

use std::fmt;

use tinyvec::TinyVec;

/// A row-major N-dimensional array of `f32`.
///
/// Networks here produce tensors like `[1, 896, 16]`; they are read by fixing leading indices with
/// [`Tensor::index`] until a row ([`TensorView::as_slice`]) or a single value
/// ([`TensorView::as_singular`]) is left.
#[derive(Clone)]
pub struct Tensor {
    shape: TinyVec<[usize; 4]>,
    data: Box<[f32]>,
}

/// A sub-tensor of a [`Tensor`], obtained by fixing some of its leading indices.
#[derive(Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a [usize],
    data: &'a [f32],
}

impl Tensor {
    /// Builds a tensor of `shape`, asking `f` for the value at each index.
    ///
    /// Indices are visited in memory order: the last one changes fastest.
    pub fn from_array_shape_fn<const N: usize>(
        shape: [usize; N],
        mut f: impl FnMut([usize; N]) -> f32,
    ) -> Self {
        let len: usize = shape.iter().product();
        let mut index = [0; N];
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(f(index));
            // Odometer-style increment.
            for (i, &dim) in index.iter_mut().zip(&shape).rev() {
                *i += 1;
                if *i < dim {
                    break;
                }
                *i = 0;
            }
        }

        Self {
            shape: shape.iter().copied().collect(),
            data: data.into_boxed_slice(),
        }
    }

    /// Builds a tensor of `shape` from values in memory order.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not yield exactly as many elements as `shape` holds.
    pub fn from_iter(shape: &[usize], values: impl IntoIterator<Item = f32>) -> Self {
        let data: Box<[f32]> = values.into_iter().collect();
        let expected: usize = shape.iter().product();
        assert_eq!(data.len(), expected, "wrong element count for shape {shape:?}");
        Self {
            shape: shape.iter().copied().collect(),
            data,
        }
    }

    pub(super) fn from_tract(tensor: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let values = tensor.as_slice::<f32>()?;
        Ok(Self::from_iter(tensor.shape(), values.iter().copied()))
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(&self.shape, &self.data)?)
    }

    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            data: &self.data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Fixes the first `N` indices. See [`TensorView::index`].
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'_> {
        self.view().index(indices)
    }

    /// Iterates over the sub-tensors along the first dimension.
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'_>> {
        self.view().iter()
    }
}

impl<'a> TensorView<'a> {
    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Fixes the first `N` indices, leaving a view of the remaining dimensions.
    ///
    /// For a `[2, 3, 4]` tensor, `index([1, 2])` is the `[4]` row at `[1, 2, ..]`.
    ///
    /// # Panics
    ///
    /// Panics if there are more indices than dimensions, or an index is out of range.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'a> {
        assert!(
            N <= self.rank() && indices.iter().zip(self.shape).all(|(&i, &len)| i < len),
            "index {indices:?} out of range for shape {:?}",
            self.shape,
        );

        let rest = &self.shape[N..];
        let stride: usize = rest.iter().product();
        let offset = indices
            .iter()
            .zip(self.shape)
            .fold(0, |acc, (&i, &len)| acc * len + i);
        TensorView {
            shape: rest,
            data: &self.data[offset * stride..(offset + 1) * stride],
        }
    }

    /// Iterates over the sub-tensors along the first dimension.
    ///
    /// # Panics
    ///
    /// Panics on 0-dimensional views.
    #[track_caller]
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'a>> {
        assert!(self.rank() > 0, "cannot iterate over a scalar tensor");
        let this = *self;
        (0..self.shape[0]).map(move |i| this.index([i]))
    }

    /// The values of a 1-dimensional view.
    #[track_caller]
    pub fn as_slice(&self) -> &'a [f32] {
        assert_eq!(self.rank(), 1, "shape {:?} is not a row", self.shape);
        self.data
    }

    /// The value of a 0-dimensional view.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        assert_eq!(self.rank(), 0, "shape {:?} is not a scalar", self.shape);
        self.data[0]
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.view(), f)
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor{:?}", self.shape)
    }
}
