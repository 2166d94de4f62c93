//! Dataset region selection.
//!
//! The store only needs a selection to name a set of cells in row-major
//! order; richer slicing algebras plug in through [`Selection`].

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Cells picked out of a dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedRegion {
    /// Extent of the selected block.
    pub shape: Vec<usize>,
    /// Row-major flat indices into the dataset, in block order.
    pub indices: Vec<usize>,
}

/// Carves a region out of a dataset of a given shape.
pub trait Selection {
    fn resolve(&self, shape: &[usize]) -> StoreResult<SelectedRegion>;
}

/// Row-major strides for `shape`.
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut out = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        out[i] = out[i + 1] * shape[i + 1];
    }
    out
}

/// Per-dimension half-open `[start, stop)` range with a positive step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimSlice {
    pub start: usize,
    pub stop: usize,
    #[serde(default = "one")]
    pub step: usize,
}

fn one() -> usize {
    1
}

impl DimSlice {
    pub fn new(start: usize, stop: usize, step: usize) -> Self {
        Self { start, stop, step }
    }

    fn count(&self) -> usize {
        if self.stop <= self.start {
            0
        } else {
            (self.stop - self.start).div_ceil(self.step)
        }
    }
}

/// A regular strided block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperslab {
    pub dims: Vec<DimSlice>,
}

impl Hyperslab {
    pub fn new(dims: Vec<DimSlice>) -> Self {
        Self { dims }
    }

    /// The whole of `shape`.
    pub fn all(shape: &[usize]) -> Self {
        Self::new(shape.iter().map(|&n| DimSlice::new(0, n, 1)).collect())
    }
}

impl Selection for Hyperslab {
    fn resolve(&self, shape: &[usize]) -> StoreResult<SelectedRegion> {
        if self.dims.len() != shape.len() {
            return Err(StoreError::InvalidSelection(format!(
                "selection rank {} does not match dataset rank {}",
                self.dims.len(),
                shape.len()
            )));
        }
        for (axis, (slice, &extent)) in self.dims.iter().zip(shape).enumerate() {
            if slice.step == 0 {
                return Err(StoreError::InvalidSelection(format!("step is zero on axis {axis}")));
            }
            if slice.start > slice.stop || slice.stop > extent {
                return Err(StoreError::InvalidSelection(format!(
                    "[{}:{}] out of bounds for extent {extent} on axis {axis}",
                    slice.start, slice.stop
                )));
            }
        }

        let block: Vec<usize> = self.dims.iter().map(DimSlice::count).collect();
        let total: usize = block.iter().product();
        let dataset_strides = strides(shape);
        let mut indices = Vec::with_capacity(total);
        let mut counter = vec![0usize; block.len()];
        for _ in 0..total {
            let flat = counter
                .iter()
                .zip(&self.dims)
                .zip(&dataset_strides)
                .map(|((&i, slice), &stride)| (slice.start + i * slice.step) * stride)
                .sum();
            indices.push(flat);
            // odometer increment, last axis fastest
            for axis in (0..counter.len()).rev() {
                counter[axis] += 1;
                if counter[axis] < block[axis] {
                    break;
                }
                counter[axis] = 0;
            }
        }
        Ok(SelectedRegion { shape: block, indices })
    }
}

/// An explicit list of cells, one coordinate per axis each. The region
/// is one-dimensional, in the order the points are given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointSelection {
    pub points: Vec<Vec<usize>>,
}

impl PointSelection {
    pub fn new(points: Vec<Vec<usize>>) -> Self {
        Self { points }
    }
}

impl Selection for PointSelection {
    fn resolve(&self, shape: &[usize]) -> StoreResult<SelectedRegion> {
        let dataset_strides = strides(shape);
        let indices = self
            .points
            .iter()
            .map(|point| {
                if point.len() != shape.len() {
                    return Err(StoreError::InvalidSelection(format!(
                        "point {point:?} has rank {}, dataset rank is {}",
                        point.len(),
                        shape.len()
                    )));
                }
                if let Some(axis) = point.iter().zip(shape).position(|(&i, &n)| i >= n) {
                    return Err(StoreError::InvalidSelection(format!(
                        "point {point:?} is out of bounds on axis {axis}"
                    )));
                }
                Ok(point.iter().zip(&dataset_strides).map(|(&i, &s)| i * s).sum())
            })
            .collect::<StoreResult<Vec<usize>>>()?;
        Ok(SelectedRegion { shape: vec![indices.len()], indices })
    }
}
