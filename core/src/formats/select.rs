use std::collections::BTreeMap;

use derive_more::Constructor;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Open interval on a particle quantity. A missing bound doesn't constrain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Constructor, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub fn above(lower: f64) -> Self {
        Self::new(Some(lower), None)
    }

    pub fn below(upper: f64) -> Self {
        Self::new(None, Some(upper))
    }

    pub fn between(lower: f64, upper: f64) -> Self {
        Self::new(Some(lower), Some(upper))
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower.map_or(true, |lo| value > lo) && self.upper.map_or(true, |hi| value < hi)
    }
}

/// Maps a quantity name (`x`, `uz`, ...) to the range particles must lie in.
pub type SelectionRules = BTreeMap<String, Bounds>;

/// Builds the mask of the `n` particles passing every rule.
///
/// `quantity` fetches the per-particle values of a quantity. A single value
/// applies to all particles.
pub fn keep_mask(
    n: usize,
    rules: &SelectionRules,
    mut quantity: impl FnMut(&str) -> Result<Array1<f64>>,
) -> Result<Array1<bool>> {
    let mut mask = Array1::from_elem(n, true);

    for (name, bounds) in rules {
        let q = quantity(name)?;
        match q.len() {
            1 => {
                if !bounds.contains(q[0]) {
                    mask.fill(false);
                }
            }
            len if len == n => {
                mask.zip_mut_with(&q, |keep, &v| *keep &= bounds.contains(v));
            }
            found => {
                return Err(Error::SelectionLengthMismatch {
                    quantity: name.clone(),
                    expected: n,
                    found,
                })
            }
        }
    }

    Ok(mask)
}

/// Keeps only the particles passing every rule in each array of `data_list`.
///
/// All arrays have one value per particle, except single-valued arrays which
/// stand for every particle and are left untouched. The particle count is
/// taken from the first array holding more than one value.
pub fn select<A: Clone>(
    data_list: Vec<Array1<A>>,
    rules: &SelectionRules,
    quantity: impl FnMut(&str) -> Result<Array1<f64>>,
) -> Result<Vec<Array1<A>>> {
    let per_particle = data_list
        .iter()
        .find(|data| data.len() > 1)
        .or(data_list.first());
    let n = match per_particle {
        Some(data) => data.len(),
        None => return Ok(data_list),
    };
    if rules.is_empty() {
        return Ok(data_list);
    }

    let mask = keep_mask(n, rules, quantity)?;

    data_list
        .into_iter()
        .enumerate()
        .map(|(i, data)| {
            if data.len() <= 1 {
                return Ok(data);
            }
            if data.len() != n {
                return Err(Error::SelectionLengthMismatch {
                    quantity: format!("#{i}"),
                    expected: n,
                    found: data.len(),
                });
            }
            Ok(data
                .iter()
                .zip(mask.iter())
                .filter(|(_, &keep)| keep)
                .map(|(v, _)| v.clone())
                .collect())
        })
        .collect()
}
