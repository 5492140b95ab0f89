use std::{fmt, fmt::Debug, path::Path, str::FromStr};

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use uom::si::f64::Time;

use crate::common::grid::GridMeta;
use crate::error::{Error, Result};
use crate::file::AnyReader;
use crate::formats::catalog::{Denylist, Listing};
use crate::formats::record::RawHandle;

pub mod container;
pub mod dataset;

pub use container::ContainerBackend;
pub use dataset::{DatasetBackend, DatasetSource, Domain, MemDataset};

/// Per-file parameters that aren't tied to a field or species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileParams {
    pub time: Time,
    pub extensions: Vec<String>,
}

/// Access to one open file, in the backend's own naming scheme.
///
/// Everything returned here is raw: names aren't filtered or canonicalized
/// and handles aren't unit-scaled yet.
pub trait Backend: Sized {
    type Options: Clone + Debug + Default;

    fn open(options: &Self::Options, path: &Path) -> Result<Self>;

    /// Releases the file. Closing more than once is a no-op.
    fn close(&mut self);

    fn name(&self) -> &'static str;

    fn params(&self) -> Result<FileParams>;

    /// Every mesh record and every particle record component of the file.
    fn listing(&self) -> Result<Listing>;

    fn denylist(&self) -> &'static Denylist;

    /// The data of `field`, or of its `coord` component for vector fields.
    /// thetaMode fields are returned with their mode axis first.
    fn field_handle(&self, field: &str, coord: Option<&str>) -> Result<RawHandle>;

    /// The grid `field` is stored on, matching the shape of
    /// [`Backend::field_handle`] minus the mode axis of thetaMode fields.
    fn grid_geometry(&self, field: &str, coord: Option<&str>) -> Result<GridMeta>;

    /// The values of one record component of `species`, addressed by its
    /// canonical name, with the backend's unit conventions undone.
    fn species_quantity(&self, species: &str, component: &str) -> Result<Array1<f64>>;

    fn supports_theta_mode(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    #[serde(alias = "h5py")]
    Container,
    #[serde(alias = "yt")]
    Dataset,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Container => f.write_str("container"),
            BackendKind::Dataset => f.write_str("dataset"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "container" | "h5py" => Ok(BackendKind::Container),
            "dataset" | "yt" => Ok(BackendKind::Dataset),
            _ => Err(Error::UnknownBackend(s.to_string())),
        }
    }
}

/// Any of the built-in backends, picked at runtime.
#[derive(Debug)]
pub enum AnyBackend {
    Container(ContainerBackend),
    Dataset(DatasetBackend<MemDataset>),
}

impl Backend for AnyBackend {
    type Options = BackendKind;

    fn open(options: &Self::Options, path: &Path) -> Result<Self> {
        match options {
            BackendKind::Container => ContainerBackend::open(&(), path).map(AnyBackend::Container),
            BackendKind::Dataset => DatasetBackend::open(&(), path).map(AnyBackend::Dataset),
        }
    }

    fn close(&mut self) {
        match self {
            AnyBackend::Container(b) => b.close(),
            AnyBackend::Dataset(b) => b.close(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AnyBackend::Container(b) => b.name(),
            AnyBackend::Dataset(b) => b.name(),
        }
    }

    fn params(&self) -> Result<FileParams> {
        match self {
            AnyBackend::Container(b) => b.params(),
            AnyBackend::Dataset(b) => b.params(),
        }
    }

    fn listing(&self) -> Result<Listing> {
        match self {
            AnyBackend::Container(b) => b.listing(),
            AnyBackend::Dataset(b) => b.listing(),
        }
    }

    fn denylist(&self) -> &'static Denylist {
        match self {
            AnyBackend::Container(b) => b.denylist(),
            AnyBackend::Dataset(b) => b.denylist(),
        }
    }

    fn field_handle(&self, field: &str, coord: Option<&str>) -> Result<RawHandle> {
        match self {
            AnyBackend::Container(b) => b.field_handle(field, coord),
            AnyBackend::Dataset(b) => b.field_handle(field, coord),
        }
    }

    fn grid_geometry(&self, field: &str, coord: Option<&str>) -> Result<GridMeta> {
        match self {
            AnyBackend::Container(b) => b.grid_geometry(field, coord),
            AnyBackend::Dataset(b) => b.grid_geometry(field, coord),
        }
    }

    fn species_quantity(&self, species: &str, component: &str) -> Result<Array1<f64>> {
        match self {
            AnyBackend::Container(b) => b.species_quantity(species, component),
            AnyBackend::Dataset(b) => b.species_quantity(species, component),
        }
    }

    fn supports_theta_mode(&self) -> bool {
        match self {
            AnyBackend::Container(b) => b.supports_theta_mode(),
            AnyBackend::Dataset(b) => b.supports_theta_mode(),
        }
    }
}

/// Reader settings as they appear in a config file, e.g. `{"backend": "yt"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub backend: BackendKind,
}

impl ReaderConfig {
    pub fn reader(&self) -> AnyReader {
        AnyReader::new(self.backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        assert_eq!("h5py".parse::<BackendKind>().unwrap(), BackendKind::Container);
        assert_eq!("dataset".parse::<BackendKind>().unwrap(), BackendKind::Dataset);
        assert_eq!(BackendKind::Dataset.to_string(), "dataset");
        assert!(matches!(
            "netcdf".parse::<BackendKind>(),
            Err(Error::UnknownBackend(_))
        ));
    }

    #[test]
    fn config_accepts_legacy_names() {
        let config: ReaderConfig = serde_json::from_str(r#"{"backend": "yt"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Dataset);

        let config: ReaderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.backend, BackendKind::Container);
    }
}
