use std::path::PathBuf;

use miette::Diagnostic;
use ndarray::ShapeError;
use thiserror::Error;

use crate::geom::Geometry;

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("{geometry} fields can't be read through the {backend} backend")]
    #[diagnostic(code(opmd_tbx::unsupported_geometry))]
    UnsupportedGeometry {
        geometry: Geometry,
        backend: &'static str,
    },

    #[error("Record at {path} is neither a constant record nor a dataset")]
    #[diagnostic(
        code(opmd_tbx::invalid_handle_kind),
        help("A constant record needs both a `value` and a `shape` attribute")
    )]
    InvalidHandleKind { path: String },

    #[error("Unknown axis {label}, available axes are {available:?}")]
    #[diagnostic(code(opmd_tbx::unknown_axis))]
    UnknownAxis {
        label: String,
        available: Vec<String>,
    },

    #[error("Got {indices} slice indices for {axes} slice axes")]
    #[diagnostic(code(opmd_tbx::slice_arity_mismatch))]
    SliceArityMismatch { indices: usize, axes: usize },

    #[error("Index {index} is out of bounds for axis {axis} of length {len}")]
    #[diagnostic(code(opmd_tbx::index_out_of_bounds))]
    IndexOutOfBounds { axis: usize, index: usize, len: usize },

    #[error("Grid metadata doesn't match the data: {0}")]
    #[diagnostic(code(opmd_tbx::inconsistent_grid))]
    InconsistentGrid(String),

    #[error("Unknown field {0}")]
    #[diagnostic(code(opmd_tbx::unknown_field))]
    UnknownField(String),

    #[error("Record {record} has no component {component}")]
    #[diagnostic(code(opmd_tbx::unknown_component))]
    UnknownComponent { record: String, component: String },

    #[error("{0} is a vector field, a component has to be given")]
    #[diagnostic(code(opmd_tbx::missing_component))]
    MissingComponent(String),

    #[error("Unknown species {0}")]
    #[diagnostic(code(opmd_tbx::unknown_species))]
    UnknownSpecies(String),

    #[error("Mode {mode} is not available, expected one of {available:?}")]
    #[diagnostic(code(opmd_tbx::unknown_mode))]
    UnknownMode { mode: u32, available: Vec<u32> },

    #[error("Selection quantity {quantity} has {found} values, expected {expected}")]
    #[diagnostic(code(opmd_tbx::selection_length_mismatch))]
    SelectionLengthMismatch {
        quantity: String,
        expected: usize,
        found: usize,
    },

    #[error("Missing attribute {name} on {path}")]
    #[diagnostic(code(opmd_tbx::missing_attribute))]
    MissingAttribute { path: String, name: &'static str },

    #[error("Attribute {name} on {path} has an unexpected type")]
    #[diagnostic(code(opmd_tbx::invalid_attribute))]
    InvalidAttribute { path: String, name: &'static str },

    #[error("Unsupported openPMD version {0}")]
    #[diagnostic(
        code(opmd_tbx::unsupported_version),
        help("Only openPMD 1.x files are supported")
    )]
    UnsupportedVersion(String),

    #[error("No node at {0}")]
    #[diagnostic(code(opmd_tbx::missing_node))]
    MissingNode(String),

    #[error("No file is currently open")]
    #[diagnostic(code(opmd_tbx::no_file_open))]
    NoFileOpen,

    #[error("{0} is still open, close it before opening another file")]
    #[diagnostic(code(opmd_tbx::file_already_open))]
    FileAlreadyOpen(PathBuf),

    #[error("Unknown backend {0}")]
    #[diagnostic(
        code(opmd_tbx::unknown_backend),
        help("Expected one of `container`, `dataset`, `h5py` or `yt`")
    )]
    UnknownBackend(String),

    #[error("Array shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("{0} is an HDF5 file")]
    #[diagnostic(
        code(opmd_tbx::unsupported_format),
        help("Build with the `hdf5` feature to read HDF5 files")
    )]
    UnsupportedFormat(PathBuf),

    #[error("HDF5 error: {0}")]
    #[diagnostic(code(opmd_tbx::hdf5))]
    Hdf5(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
