use std::fmt;

use get_size::GetSize;
use serde::{Deserialize, Serialize};

/// Mesh geometry as declared by the `geometry` attribute of an openPMD mesh record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Geometry {
    Cartesian1D,
    Cartesian2D,
    Cartesian3D,
    /// Cylindrical geometry decomposed into azimuthal modes.
    ThetaMode,
}

// Unit-only enum, nothing on the heap.
impl GetSize for Geometry {}

impl Geometry {
    pub fn cartesian(dimensionality: usize) -> Option<Self> {
        match dimensionality {
            1 => Some(Geometry::Cartesian1D),
            2 => Some(Geometry::Cartesian2D),
            3 => Some(Geometry::Cartesian3D),
            _ => None,
        }
    }

    /// Maps the openPMD `geometry` attribute and the number of axis labels
    /// to a [`Geometry`]. `None` for geometries this crate can't read.
    pub fn from_openpmd(geometry: &str, n_axes: usize) -> Option<Self> {
        match geometry {
            "cartesian" => Self::cartesian(n_axes),
            "thetaMode" => Some(Geometry::ThetaMode),
            _ => None,
        }
    }

    /// Number of spatial axes of the grid the field is stored on.
    pub fn dimensionality(self) -> usize {
        match self {
            Geometry::Cartesian1D => 1,
            Geometry::Cartesian2D | Geometry::ThetaMode => 2,
            Geometry::Cartesian3D => 3,
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Geometry::Cartesian1D => "1dcartesian",
            Geometry::Cartesian2D => "2dcartesian",
            Geometry::Cartesian3D => "3dcartesian",
            Geometry::ThetaMode => "thetaMode",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openpmd_attribute() {
        assert_eq!(
            Geometry::from_openpmd("cartesian", 2),
            Some(Geometry::Cartesian2D)
        );
        assert_eq!(
            Geometry::from_openpmd("thetaMode", 2),
            Some(Geometry::ThetaMode)
        );
        assert_eq!(Geometry::from_openpmd("cartesian", 4), None);
        assert_eq!(Geometry::from_openpmd("spherical", 3), None);
    }

    #[test]
    fn display_matches_legacy_names() {
        assert_eq!(Geometry::Cartesian3D.to_string(), "3dcartesian");
        assert_eq!(Geometry::ThetaMode.to_string(), "thetaMode");
        assert_eq!(Geometry::ThetaMode.dimensionality(), 2);
    }
}
