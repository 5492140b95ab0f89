// #![warn(clippy::pedantic)]
// #![warn(clippy::nursery)]
// #![warn(clippy::cargo)]
#![warn(clippy::complexity)]
#![warn(clippy::correctness)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![warn(clippy::suspicious)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
// #![warn(clippy::dbg_macro)]
// #![warn(clippy::unwrap_used)]
// #![warn(clippy::expect_used)]

//! Reads openPMD field meshes and particle species through interchangeable
//! backends and normalizes them into plain `ndarray` arrays plus grid metadata.

pub mod backend;
pub mod common;
pub mod error;
pub mod formats;
pub mod geom;

pub mod file;
pub mod sync;

pub use backend::{AnyBackend, Backend, BackendKind, FileParams, ReaderConfig};
pub use common::grid::{AxisParameters, GridMeta};
pub use error::{Error, Result};
pub use file::{AnyReader, DataReader};
pub use formats::catalog::{Catalog, QuantityDescriptor, RecordKind, SpeciesRecords};
pub use formats::circ::{CircMode, CircOptions};
pub use formats::record::{extract, HandleKind, RawArray, RawHandle};
pub use formats::select::{select, Bounds, SelectionRules};
pub use formats::slice::{slice_field, SliceRequest};
pub use formats::utils::fit_bins_to_grid;
pub use geom::Geometry;
pub use sync::SharedReader;
