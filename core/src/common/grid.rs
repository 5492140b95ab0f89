use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Describes the grid a field array lives on.
///
/// `axis_labels`, `shape`, `grid_spacing`, `global_offset` and `grid_position`
/// always have one entry per array dimension. Spacing and offset are in
/// units of `grid_unit_si`, positions are in units of the spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMeta {
    pub axis_labels: Vec<String>,
    pub shape: Vec<usize>,
    pub grid_spacing: Vec<f64>,
    pub global_offset: Vec<f64>,
    pub grid_unit_si: f64,
    pub grid_position: Vec<f64>,
    /// Set for reconstructed thetaMode fields: the `r` axis then covers
    /// `-r_max..=r_max` with `shape / 2` cells on each side of the axis.
    #[serde(default)]
    pub symmetric_r: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisParameters {
    pub label: String,
    pub size: usize,
    pub range: [f64; 2],
}

impl GridMeta {
    pub fn new(
        axis_labels: Vec<String>,
        shape: Vec<usize>,
        grid_spacing: Vec<f64>,
        global_offset: Vec<f64>,
        grid_unit_si: f64,
        grid_position: Vec<f64>,
    ) -> Result<Self> {
        let n = axis_labels.len();
        let lens = [
            shape.len(),
            grid_spacing.len(),
            global_offset.len(),
            grid_position.len(),
        ];
        if lens.iter().any(|&len| len != n) {
            return Err(Error::InconsistentGrid(format!(
                "{n} axis labels, but shape/spacing/offset/position have lengths {lens:?}"
            )));
        }

        Ok(Self {
            axis_labels,
            shape,
            grid_spacing,
            global_offset,
            grid_unit_si,
            grid_position,
            symmetric_r: false,
        })
    }

    pub fn dimensionality(&self) -> usize {
        self.axis_labels.len()
    }

    pub fn axis_index(&self, label: &str) -> Result<usize> {
        self.axis_labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| Error::UnknownAxis {
                label: label.to_string(),
                available: self.axis_labels.clone(),
            })
    }

    /// Returns a copy of the metadata with the given axes removed from every
    /// per-axis sequence. Duplicate or out-of-range indices are ignored.
    pub fn without_axes(&self, axes: &[usize]) -> Self {
        fn keep<T: Clone>(v: &[T], axes: &[usize]) -> Vec<T> {
            v.iter()
                .enumerate()
                .filter(|(i, _)| !axes.contains(i))
                .map(|(_, x)| x.clone())
                .collect()
        }

        let symmetric_r = self.symmetric_r
            && self
                .axis_labels
                .iter()
                .enumerate()
                .any(|(i, l)| l == "r" && !axes.contains(&i));

        Self {
            axis_labels: keep(&self.axis_labels, axes),
            shape: keep(&self.shape, axes),
            grid_spacing: keep(&self.grid_spacing, axes),
            global_offset: keep(&self.global_offset, axes),
            grid_unit_si: self.grid_unit_si,
            grid_position: keep(&self.grid_position, axes),
            symmetric_r,
        }
    }

    /// Turns the grid of one half plane of a thetaMode field into the grid of
    /// the full plane, with the `r` axis running from `-r_max` to `r_max`.
    pub fn mirrored_r(mut self) -> Result<Self> {
        let r = self.axis_index("r")?;
        self.shape[r] *= 2;
        self.symmetric_r = true;
        Ok(self)
    }

    fn is_mirrored(&self, axis: usize) -> bool {
        self.symmetric_r && self.axis_labels[axis] == "r"
    }

    /// Distance between two grid points along `axis`, in SI units.
    pub fn step(&self, axis: usize) -> f64 {
        self.grid_spacing[axis] * self.grid_unit_si
    }

    /// Position of every grid point along `axis`, in SI units.
    pub fn axis_points(&self, axis: usize) -> Array1<f64> {
        let step = self.step(axis);
        let start = self.global_offset[axis] * self.grid_unit_si + self.grid_position[axis] * step;

        if !self.is_mirrored(axis) {
            return Array1::from_shape_fn(self.shape[axis], |i| start + i as f64 * step);
        }

        let half = self.shape[axis] / 2;
        let upper = Array1::from_shape_fn(half, |i| start + i as f64 * step);
        upper
            .iter()
            .rev()
            .map(|r| -r)
            .chain(upper.iter().copied())
            .collect()
    }

    pub fn min(&self, axis: usize) -> Option<f64> {
        self.axis_points(axis).first().copied()
    }

    pub fn max(&self, axis: usize) -> Option<f64> {
        self.axis_points(axis).last().copied()
    }

    /// Extent of the grid cells as `[left, right]` for 1D grids and
    /// `[left, right, bottom, top]` otherwise, where the first axis is drawn
    /// vertically. Empty when there's nothing to draw.
    pub fn extent(&self) -> Vec<f64> {
        let bounds = |axis: usize| -> Option<[f64; 2]> {
            let half = self.step(axis) / 2.0;
            Some([self.min(axis)? - half, self.max(axis)? + half])
        };

        let extent = match self.dimensionality() {
            0 => None,
            1 => bounds(0).map(|b| b.to_vec()),
            _ => bounds(1).zip(bounds(0)).map(|(h, v)| [h, v].concat()),
        };
        extent.unwrap_or_default()
    }

    /// Size and `[min, max]` range of the domain along `axis`, in SI units.
    pub fn axis_parameters(&self, axis: usize) -> AxisParameters {
        let step = self.step(axis);
        let offset = self.global_offset[axis] * self.grid_unit_si;
        let size = self.shape[axis];

        let range = if self.is_mirrored(axis) {
            let r_max = offset + (size / 2) as f64 * step;
            [-r_max, r_max]
        } else {
            [offset, offset + size as f64 * step]
        };

        AxisParameters {
            label: self.axis_labels[axis].clone(),
            size,
            range,
        }
    }
}
