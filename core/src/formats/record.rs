use derive_more::From;
use ndarray::{ArrayD, IxDyn};
use tracing::instrument;

use super::slice::take_indices;
use crate::error::{Error, Result};

/// Values of a record component that is backed by a real dataset.
#[derive(Debug, Clone, PartialEq, From)]
pub enum RawArray {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
}

impl RawArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            RawArray::Float(a) => a.shape(),
            RawArray::Int(a) => a.shape(),
        }
    }

    /// Selects `index` along `axis` for every `(axis, index)` pair and
    /// converts the result to `T`.
    fn take<T: Element>(&self, pairs: &[(usize, usize)]) -> Result<ArrayD<T>> {
        Ok(match self {
            RawArray::Float(a) => take_indices(a.view(), pairs)?.mapv(T::from_f64),
            RawArray::Int(a) => take_indices(a.view(), pairs)?.mapv(T::from_i64),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandleKind {
    /// A record component whose every value is the same. `shape` is the
    /// shape the component would have if it were written out.
    Constant { value: f64, shape: Vec<usize> },
    Array(RawArray),
}

/// A record component as handed out by a backend, not yet unit-scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHandle {
    pub kind: HandleKind,
    pub unit_si: f64,
}

impl RawHandle {
    pub fn constant(value: f64, shape: Vec<usize>, unit_si: f64) -> Self {
        Self {
            kind: HandleKind::Constant { value, shape },
            unit_si,
        }
    }

    pub fn array(data: impl Into<RawArray>, unit_si: f64) -> Self {
        Self {
            kind: HandleKind::Array(data.into()),
            unit_si,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match &self.kind {
            HandleKind::Constant { shape, .. } => shape,
            HandleKind::Array(a) => a.shape(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, HandleKind::Constant { .. })
    }
}

/// Element types a record can be extracted as.
pub trait Element: Copy + 'static {
    /// Only floating point outputs get scaled to SI units.
    const IS_FLOAT: bool;

    fn from_f64(v: f64) -> Self;
    fn from_i64(v: i64) -> Self;
    fn scale(self, factor: f64) -> Self;
}

macro_rules! element_impl {
    ($is_float:literal: $($t:ty),+) => {
        $(impl Element for $t {
            const IS_FLOAT: bool = $is_float;

            fn from_f64(v: f64) -> Self {
                v as $t
            }

            fn from_i64(v: i64) -> Self {
                v as $t
            }

            fn scale(self, factor: f64) -> Self {
                (self as f64 * factor) as $t
            }
        })+
    };
}

element_impl!(true: f64, f32);
element_impl!(false: i64, i32, u64, u32);

/// One or more axis positions, so single values and lists can be passed
/// interchangeably.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Positions(Vec<usize>);

impl Positions {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<usize> for Positions {
    fn from(v: usize) -> Self {
        Self(vec![v])
    }
}

impl From<Vec<usize>> for Positions {
    fn from(v: Vec<usize>) -> Self {
        Self(v)
    }
}

impl From<&[usize]> for Positions {
    fn from(v: &[usize]) -> Self {
        Self(v.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Positions {
    fn from(v: [usize; N]) -> Self {
        Self(v.to_vec())
    }
}

/// Extracts the data behind `handle` as an array of `T`.
///
/// `i_slice` and `pos_slice` are paired up positionally: for every axis in
/// `pos_slice` only the corresponding index of `i_slice` is kept, which
/// removes that axis from the result. Constant records are expanded to
/// their declared shape minus the sliced axes.
///
/// Floating point outputs are multiplied by the handle's `unit_si`.
#[instrument(level = "trace", skip_all, fields(shape = ?handle.shape()))]
pub fn extract<T: Element>(
    handle: &RawHandle,
    i_slice: impl Into<Positions>,
    pos_slice: impl Into<Positions>,
) -> Result<ArrayD<T>> {
    let i_slice = i_slice.into();
    let pos_slice = pos_slice.into();
    if i_slice.len() != pos_slice.len() {
        return Err(Error::SliceArityMismatch {
            indices: i_slice.len(),
            axes: pos_slice.len(),
        });
    }

    let mut data = match &handle.kind {
        HandleKind::Constant { value, shape } => {
            let shape = shape
                .iter()
                .enumerate()
                .filter(|(i, _)| !pos_slice.as_slice().contains(i))
                .map(|(_, &n)| n)
                .collect::<Vec<_>>();
            ArrayD::from_elem(IxDyn(&shape), T::from_f64(*value))
        }
        HandleKind::Array(raw) => {
            let pairs = pos_slice
                .as_slice()
                .iter()
                .copied()
                .zip(i_slice.as_slice().iter().copied())
                .collect::<Vec<_>>();
            raw.take(&pairs)?
        }
    };

    if T::IS_FLOAT && handle.unit_si != 1.0 {
        let unit_si = handle.unit_si;
        data.mapv_inplace(|v| v.scale(unit_si));
    }

    Ok(data)
}
