use derive_more::Constructor;
use ndarray::{ArrayD, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::grid::GridMeta;
use crate::error::{Error, Result};

/// Cut through the grid perpendicular to `axis`.
///
/// `position` runs from -1 (lower edge of the box) over 0 (center) to 1
/// (upper edge).
#[derive(Debug, Clone, PartialEq, Constructor, Serialize, Deserialize)]
pub struct SliceRequest {
    pub axis: String,
    pub position: f64,
}

/// Slice requests resolved against a grid: `indices[i]` is the cell kept
/// along `axes[i]`. Axes refer to the grid before any reduction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSlices {
    pub axes: Vec<usize>,
    pub indices: Vec<usize>,
}

/// Index of the cell at `position` on an axis with `n_cells` cells.
/// Positions outside of `[-1, 1]` are clamped to the first/last cell.
pub fn cell_index(position: f64, n_cells: usize) -> usize {
    let last = n_cells.saturating_sub(1);
    // Truncates towards zero, like the legacy reader did
    let i_cell = (0.5 * (position + 1.0) * n_cells as f64) as i64;

    if i_cell < 0 || i_cell as usize > last {
        debug!(position, n_cells, i_cell, "Slice position outside of the grid, clamping");
    }

    i_cell.clamp(0, last as i64) as usize
}

/// Resolves every request against the axis labels of `grid`.
/// A repeated axis is only sliced once, by its first request.
pub fn resolve_slices(grid: &GridMeta, requests: &[SliceRequest]) -> Result<ResolvedSlices> {
    let mut resolved = ResolvedSlices::default();

    for request in requests {
        let axis = grid.axis_index(&request.axis)?;
        if resolved.axes.contains(&axis) {
            warn!(axis = %request.axis, "Axis was sliced more than once, ignoring");
            continue;
        }
        resolved.axes.push(axis);
        resolved
            .indices
            .push(cell_index(request.position, grid.shape[axis]));
    }

    Ok(resolved)
}

/// Selects `index` along `axis` for every `(axis, index)` pair, removing those
/// axes. Axes are numbered as in `view`, before anything is removed.
pub(crate) fn take_indices<'a, A>(
    view: ArrayViewD<'a, A>,
    pairs: &[(usize, usize)],
) -> Result<ArrayViewD<'a, A>> {
    let mut pairs = pairs.to_vec();
    // Highest axis first so the remaining axis numbers stay valid
    pairs.sort_by(|a, b| b.0.cmp(&a.0));
    pairs.dedup_by_key(|(axis, _)| *axis);

    let mut view = view;
    for (axis, index) in pairs {
        let len = match view.shape().get(axis) {
            Some(&len) => len,
            None => {
                return Err(Error::IndexOutOfBounds {
                    axis,
                    index,
                    len: 0,
                })
            }
        };
        if index >= len {
            return Err(Error::IndexOutOfBounds { axis, index, len });
        }
        view = view.index_axis_move(Axis(axis), index);
    }

    Ok(view)
}

/// Cuts `data` along each requested axis and drops those axes from the grid
/// metadata. Without requests the input is returned unchanged.
pub fn slice_field<A: Clone>(
    data: ArrayD<A>,
    grid: &GridMeta,
    requests: &[SliceRequest],
) -> Result<(ArrayD<A>, GridMeta)> {
    if requests.is_empty() {
        return Ok((data, grid.clone()));
    }

    if data.shape() != grid.shape.as_slice() {
        return Err(Error::InconsistentGrid(format!(
            "data has shape {:?}, grid has shape {:?}",
            data.shape(),
            grid.shape
        )));
    }

    let resolved = resolve_slices(grid, requests)?;
    let pairs = resolved
        .axes
        .iter()
        .copied()
        .zip(resolved.indices.iter().copied())
        .collect::<Vec<_>>();

    let sliced = take_indices(data.view(), &pairs)?.to_owned();
    Ok((sliced, grid.without_axes(&resolved.axes)))
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array};
    use proptest::prelude::*;

    use super::*;

    fn grid(shape: &[usize]) -> GridMeta {
        let labels = ["x", "y", "z"];
        GridMeta::new(
            labels[..shape.len()].iter().map(|l| l.to_string()).collect(),
            shape.to_vec(),
            vec![1.0; shape.len()],
            vec![0.0; shape.len()],
            1.0,
            vec![0.5; shape.len()],
        )
        .unwrap()
    }

    fn request(axis: &str, position: f64) -> SliceRequest {
        SliceRequest::new(axis.to_string(), position)
    }

    #[test]
    fn center_and_edges() {
        assert_eq!(cell_index(0.0, 10), 5);
        assert_eq!(cell_index(-1.0, 10), 0);
        assert_eq!(cell_index(0.5, 10), 7);
    }

    #[test]
    fn positions_out_of_range_are_clamped() {
        // 0.5 * (1 + 1) * 10 = 10, one past the last cell
        assert_eq!(cell_index(1.0, 10), 9);
        assert_eq!(cell_index(3.0, 10), 9);
        assert_eq!(cell_index(-3.0, 10), 0);
        assert_eq!(cell_index(0.0, 0), 0);
    }

    #[test]
    fn no_requests_is_identity() {
        let data = Array::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64).into_dyn();
        let grid = grid(&[2, 3]);

        let (sliced, new_grid) = slice_field(data.clone(), &grid, &[]).unwrap();
        assert_eq!(sliced, data);
        assert_eq!(new_grid, grid);
    }

    #[test]
    fn slices_in_one_pass_against_original_labels() {
        let data = Array::from_shape_fn((2, 3, 4), |(i, j, k)| (100 * i + 10 * j + k) as f64);
        let grid = grid(&[2, 3, 4]);

        // `z` is resolved against the original labels even though `x` is
        // listed (and removed) first.
        let (sliced, new_grid) = slice_field(
            data.into_dyn(),
            &grid,
            &[request("x", 1.0), request("z", -1.0)],
        )
        .unwrap();

        assert_eq!(sliced, array![100.0, 110.0, 120.0].into_dyn());
        assert_eq!(new_grid.axis_labels, ["y"]);
        assert_eq!(new_grid.shape, [3]);
    }

    #[test]
    fn repeated_axis_is_sliced_once() {
        let data = Array::from_shape_fn((2, 3), |(i, j)| (10 * i + j) as f64).into_dyn();
        let (sliced, new_grid) = slice_field(
            data,
            &grid(&[2, 3]),
            &[request("y", -1.0), request("y", 1.0)],
        )
        .unwrap();

        assert_eq!(sliced, array![0.0, 10.0].into_dyn());
        assert_eq!(new_grid.axis_labels, ["x"]);
    }

    #[test]
    fn unknown_axis() {
        let data = Array::zeros((2, 3)).into_dyn();
        let res = slice_field::<f64>(data, &grid(&[2, 3]), &[request("r", 0.0)]);
        assert!(matches!(res, Err(Error::UnknownAxis { .. })));
    }

    #[test]
    fn mismatched_grid() {
        let data = Array::zeros((3, 2)).into_dyn();
        let res = slice_field::<f64>(data, &grid(&[2, 3]), &[request("x", 0.0)]);
        assert!(matches!(res, Err(Error::InconsistentGrid(_))));
    }

    proptest! {
        #[test]
        fn grid_sequences_stay_parallel(
            shape in prop::collection::vec(1usize..6, 1..=3),
            requests in prop::collection::vec((0usize..3, -2.0f64..2.0), 0..4),
        ) {
            let labels = ["x", "y", "z"];
            let grid = grid(&shape);
            let data = ArrayD::<f64>::zeros(shape.clone());
            let requests = requests
                .into_iter()
                .filter(|(axis, _)| *axis < shape.len())
                .map(|(axis, pos)| request(labels[axis], pos))
                .collect::<Vec<_>>();

            let mut distinct = requests.iter().map(|r| r.axis.clone()).collect::<Vec<_>>();
            distinct.sort();
            distinct.dedup();

            let (sliced, new_grid) = slice_field(data, &grid, &requests).unwrap();

            let dim = shape.len() - distinct.len();
            prop_assert_eq!(sliced.ndim(), dim);
            prop_assert_eq!(new_grid.axis_labels.len(), dim);
            prop_assert_eq!(new_grid.shape.len(), dim);
            prop_assert_eq!(new_grid.grid_spacing.len(), dim);
            prop_assert_eq!(new_grid.global_offset.len(), dim);
            prop_assert_eq!(new_grid.grid_position.len(), dim);
            prop_assert_eq!(sliced.shape(), new_grid.shape.as_slice());
        }

        #[test]
        fn cell_index_is_always_valid(position in -10.0f64..10.0, n_cells in 1usize..1000) {
            prop_assert!(cell_index(position, n_cells) < n_cells);
        }
    }
}
