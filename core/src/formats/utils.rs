/// Adjusts a tentative histogram bin count so the bin spacing is an integer
/// multiple (or integer divisor) of the spacing of a grid covering
/// `grid_range` with `grid_size` cells.
///
/// Returns the new bin count and the histogram range, which starts at the
/// grid's lower edge and covers a whole number of bins.
pub fn fit_bins_to_grid(
    hist_size: usize,
    grid_size: usize,
    grid_range: [f64; 2],
) -> (usize, [f64; 2]) {
    let width = grid_range[1] - grid_range[0];
    if hist_size == 0 || grid_size == 0 || width <= 0.0 {
        return (hist_size, grid_range);
    }

    let mut hist_spacing = width / hist_size as f64;
    let grid_spacing = width / grid_size as f64;

    if hist_spacing >= grid_spacing {
        hist_spacing = (hist_spacing / grid_spacing).trunc() * grid_spacing;
    } else {
        hist_spacing = grid_spacing / (grid_spacing / hist_spacing).trunc();
    }

    let hist_size = (width / hist_spacing) as usize;
    let upper = grid_range[0] + hist_size as f64 * hist_spacing;
    (hist_size, [grid_range[0], upper])
}

/// Joins path segments inside a container file with `/`, collapsing the
/// doubled separators that appear when segments carry their own slashes.
pub fn join_infile_path(parts: &[&str]) -> String {
    let mut path = parts.join("/");
    while path.contains("//") {
        path = path.replace("//", "/");
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarser_histogram() {
        // Grid spacing 1, tentative bin spacing 2.5 -> 2
        let (n, range) = fit_bins_to_grid(4, 10, [0.0, 10.0]);
        assert_eq!(n, 5);
        assert_eq!(range, [0.0, 10.0]);
    }

    #[test]
    fn finer_histogram() {
        // Grid spacing 2, tentative bin spacing 0.5 already divides it
        let (n, range) = fit_bins_to_grid(8, 2, [0.0, 4.0]);
        assert_eq!(n, 8);
        assert_eq!(range, [0.0, 4.0]);

        // Tentative bin spacing 0.8 -> 2 / 2 = 1
        let (n, range) = fit_bins_to_grid(5, 2, [0.0, 4.0]);
        assert_eq!(n, 4);
        assert_eq!(range, [0.0, 4.0]);
    }

    #[test]
    fn degenerate_inputs_are_returned_unchanged() {
        assert_eq!(fit_bins_to_grid(0, 10, [0.0, 1.0]), (0, [0.0, 1.0]));
        assert_eq!(fit_bins_to_grid(10, 10, [1.0, 1.0]), (10, [1.0, 1.0]));
    }

    #[test]
    fn infile_paths() {
        assert_eq!(
            join_infile_path(&["/data/100/", "/fields/", "E"]),
            "/data/100/fields/E"
        );
        assert_eq!(
            join_infile_path(&["/data/100", "particles", "electrons"]),
            "/data/100/particles/electrons"
        );
    }
}
