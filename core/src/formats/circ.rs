use std::{fmt, str::FromStr};

use derive_more::Constructor;
use ndarray::{s, Array2, ArrayView2, Axis, ErrorKind, Ix2, ShapeError};
use serde::{Deserialize, Serialize};

use super::record::{extract, Positions, RawHandle};
use crate::error::{Error, Result};

/// Which azimuthal modes of a thetaMode field to reconstruct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircMode {
    All,
    Single(u32),
}

impl Default for CircMode {
    fn default() -> Self {
        CircMode::Single(0)
    }
}

impl fmt::Display for CircMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircMode::All => f.write_str("all"),
            CircMode::Single(m) => write!(f, "{m}"),
        }
    }
}

impl FromStr for CircMode {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(CircMode::All),
            m => m.parse().map(CircMode::Single),
        }
    }
}

/// Mode selection and observation plane for thetaMode fields.
/// `theta` is the angle of the plane with respect to the x axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Constructor, Serialize, Deserialize)]
pub struct CircOptions {
    pub mode: CircMode,
    pub theta: f64,
}

/// Azimuthal modes stored in a record with `n_components` mode components
/// (mode 0, then a cos/sin pair per higher mode).
pub fn available_modes(n_components: usize) -> Vec<u32> {
    (0..=(n_components / 2) as u32).collect()
}

/// Multiplier of mode component `k` in the plane at `theta`, above the axis.
fn multiplier(k: usize, theta: f64) -> (u32, f64) {
    if k == 0 {
        return (0, 1.0);
    }
    let m = ((k + 1) / 2) as u32;
    let phase = m as f64 * theta;
    if k % 2 == 1 {
        (m, phase.cos())
    } else {
        (m, phase.sin())
    }
}

fn sign(m: u32) -> f64 {
    if m % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Writes `above` to the upper half of a `(2 * nr, nz)` array and `below`,
/// mirrored along r, to the lower half.
fn mirror(above: ArrayView2<f64>, below: ArrayView2<f64>) -> Array2<f64> {
    let (nr, nz) = above.dim();
    let mut out = Array2::zeros((2 * nr, nz));
    out.slice_mut(s![nr.., ..]).assign(&above);
    out.slice_mut(s![..nr, ..]).assign(&below.slice(s![..;-1, ..]));
    out
}

fn mode_component(handle: &RawHandle, k: usize) -> Result<Array2<f64>> {
    Ok(extract::<f64>(handle, k, 0usize)?.into_dimensionality::<Ix2>()?)
}

/// Recombines the azimuthal modes of a `(modes, nr, nz)` record into the
/// field in the plane at `theta`, as a `(2 * nr, nz)` array whose lower half
/// is the plane on the opposite side of the axis.
pub fn reconstruct(handle: &RawHandle, mode: CircMode, theta: f64) -> Result<Array2<f64>> {
    let (n_components, nr, nz) = match *handle.shape() {
        [n_components, nr, nz] => (n_components, nr, nz),
        _ => return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into()),
    };
    let available = available_modes(n_components);

    match mode {
        CircMode::All => {
            let all = extract::<f64>(handle, Positions::none(), Positions::none())?;
            let mut above = Array2::zeros((nr, nz));
            let mut below = Array2::zeros((nr, nz));
            for (k, component) in all.axis_iter(Axis(0)).enumerate() {
                let component = component.into_dimensionality::<Ix2>()?;
                let (m, factor) = multiplier(k, theta);
                above.scaled_add(factor, &component);
                below.scaled_add(sign(m) * factor, &component);
            }
            Ok(mirror(above.view(), below.view()))
        }
        CircMode::Single(0) => {
            let f = mode_component(handle, 0)?;
            Ok(mirror(f.view(), f.view()))
        }
        CircMode::Single(m) if available.contains(&m) && 2 * (m as usize) < n_components => {
            let k = 2 * m as usize;
            let f_cos = mode_component(handle, k - 1)?;
            let f_sin = mode_component(handle, k)?;
            let phase = m as f64 * theta;
            let f = f_cos * phase.cos() + f_sin * phase.sin();
            let below = &f * sign(m);
            Ok(mirror(f.view(), below.view()))
        }
        CircMode::Single(m) => Err(Error::UnknownMode { mode: m, available }),
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use ndarray::{array, Array3};

    use super::*;

    /// Three components (modes 0 and 1) on a 2x1 grid.
    fn handle() -> RawHandle {
        let data: Array3<f64> = array![[[1.0], [2.0]], [[10.0], [20.0]], [[100.0], [200.0]]];
        RawHandle::array(data.into_dyn(), 1.0)
    }

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9, "{a} != {b}");
        }
    }

    #[test]
    fn modes_of_record() {
        assert_eq!(available_modes(1), [0]);
        assert_eq!(available_modes(3), [0, 1]);
        assert_eq!(available_modes(5), [0, 1, 2]);
    }

    #[test]
    fn mode_zero_is_mirrored() {
        let f = reconstruct(&handle(), CircMode::Single(0), 0.3).unwrap();
        assert_eq!(f, array![[2.0], [1.0], [1.0], [2.0]]);
    }

    #[test]
    fn mode_one_flips_sign_below_axis() {
        let f = reconstruct(&handle(), CircMode::Single(1), 0.0).unwrap();
        assert_close(&f, &array![[-20.0], [-10.0], [10.0], [20.0]]);

        let f = reconstruct(&handle(), CircMode::Single(1), PI / 2.0).unwrap();
        assert_close(&f, &array![[-200.0], [-100.0], [100.0], [200.0]]);
    }

    #[test]
    fn all_modes_are_summed() {
        let f = reconstruct(&handle(), CircMode::All, 0.0).unwrap();
        assert_close(&f, &array![[2.0 - 20.0], [1.0 - 10.0], [11.0], [22.0]]);
    }

    #[test]
    fn unavailable_mode() {
        let res = reconstruct(&handle(), CircMode::Single(2), 0.0);
        assert!(matches!(res, Err(Error::UnknownMode { mode: 2, .. })));
    }

    #[test]
    fn cartesian_record_is_rejected() {
        let handle = RawHandle::array(Array2::<f64>::zeros((2, 2)).into_dyn(), 1.0);
        assert!(matches!(
            reconstruct(&handle, CircMode::All, 0.0),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn parse_mode() {
        assert_eq!("all".parse::<CircMode>().unwrap(), CircMode::All);
        assert_eq!("2".parse::<CircMode>().unwrap(), CircMode::Single(2));
        assert!("two".parse::<CircMode>().is_err());
    }
}
