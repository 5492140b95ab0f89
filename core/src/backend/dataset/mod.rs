//! Backend reading through a dataset abstraction, which exposes every field
//! resampled on a covering grid and every particle quantity as a flat array.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use ndarray::{Array1, ArrayD};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uom::si::{f64::Time, time::second};

use super::{Backend, FileParams};
use crate::common::grid::GridMeta;
use crate::error::{Error, Result};
use crate::formats::catalog::{raw_component_name, Denylist, Listing, RawField, DATASET_DENYLIST};
use crate::formats::record::RawHandle;
use crate::geom::Geometry;

/// Field type under which the dataset lists mesh fields.
const MESH_FIELD_TYPE: &str = "mesh";
/// Particle type covering every species at once.
const ALL_PARTICLES: &str = "all";
const PARTICLE_PREFIX: &str = "particle_";
const AXIS_LABELS: [&str; 3] = ["x", "y", "z"];

/// Bounding box and resolution of the simulation domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub left_edge: Vec<f64>,
    pub width: Vec<f64>,
    pub dimensions: Vec<usize>,
}

/// What the backend needs from a loaded dataset.
pub trait DatasetSource: Sized {
    fn load(path: &Path) -> Result<Self>;

    /// Simulation time in seconds.
    fn current_time(&self) -> f64;

    fn geometry(&self) -> Geometry {
        Geometry::cartesian(self.dimensionality()).unwrap_or(Geometry::Cartesian3D)
    }

    fn dimensionality(&self) -> usize {
        self.domain().dimensions.len()
    }

    /// `(field_type, name)` of every field, with `mesh` as the type of grid
    /// fields and the species name as the type of particle quantities.
    fn derived_field_list(&self) -> Vec<(String, String)>;

    fn particle_types(&self) -> Vec<String>;

    fn domain(&self) -> &Domain;

    /// `field` sampled on a grid covering the whole domain.
    fn covering_grid(&self, field: &str) -> Option<ArrayD<f64>>;

    fn particle_data(&self, species: &str, key: &str) -> Option<Array1<f64>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshEntry {
    pub name: String,
    pub data: ArrayD<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleEntry {
    pub name: String,
    pub data: Array1<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesEntry {
    pub name: String,
    pub records: Vec<ParticleEntry>,
}

/// A dataset held in memory, loaded from a JSON snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemDataset {
    pub current_time: f64,
    /// Overrides the cartesian geometry implied by the domain.
    #[serde(default)]
    pub geometry: Option<Geometry>,
    pub domain: Domain,
    #[serde(default)]
    pub fields: Vec<MeshEntry>,
    #[serde(default)]
    pub species: Vec<SpeciesEntry>,
}

impl MemDataset {
    fn species_entry(&self, species: &str) -> Option<&SpeciesEntry> {
        self.species.iter().find(|s| s.name == species)
    }
}

impl DatasetSource for MemDataset {
    fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn geometry(&self) -> Geometry {
        self.geometry
            .or_else(|| Geometry::cartesian(self.dimensionality()))
            .unwrap_or(Geometry::Cartesian3D)
    }

    fn derived_field_list(&self) -> Vec<(String, String)> {
        let meshes = self
            .fields
            .iter()
            .map(|f| (MESH_FIELD_TYPE.to_string(), f.name.clone()));
        let particles = self.species.iter().flat_map(|s| {
            s.records
                .iter()
                .map(move |r| (s.name.clone(), format!("{PARTICLE_PREFIX}{}", r.name)))
        });
        meshes.chain(particles).collect()
    }

    fn particle_types(&self) -> Vec<String> {
        self.species
            .iter()
            .map(|s| s.name.clone())
            .filter(|s| s != ALL_PARTICLES)
            .collect()
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn covering_grid(&self, field: &str) -> Option<ArrayD<f64>> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.data.clone())
    }

    fn particle_data(&self, species: &str, key: &str) -> Option<Array1<f64>> {
        let name = key.strip_prefix(PARTICLE_PREFIX)?;
        self.species_entry(species)?
            .records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.data.clone())
    }
}

#[derive(Debug)]
pub struct DatasetBackend<D> {
    path: PathBuf,
    dataset: Option<D>,
}

impl<D: DatasetSource> DatasetBackend<D> {
    pub fn from_dataset(path: impl Into<PathBuf>, dataset: D) -> Self {
        Self {
            path: path.into(),
            dataset: Some(dataset),
        }
    }

    fn dataset(&self) -> Result<&D> {
        self.dataset.as_ref().ok_or(Error::NoFileOpen)
    }

    fn axis_labels(dataset: &D) -> Vec<String> {
        AXIS_LABELS
            .iter()
            .take(dataset.dimensionality())
            .map(|l| l.to_string())
            .collect()
    }

    fn field_key(field: &str, coord: Option<&str>) -> String {
        match coord {
            Some(coord) => format!("{field}_{coord}"),
            None => field.to_string(),
        }
    }
}

impl<D: DatasetSource> Backend for DatasetBackend<D> {
    type Options = ();

    #[instrument(skip(_options))]
    fn open(_options: &(), path: &Path) -> Result<Self> {
        let dataset = D::load(path)?;
        debug!(dimensionality = dataset.dimensionality(), "Loaded dataset");
        Ok(Self::from_dataset(path, dataset))
    }

    fn close(&mut self) {
        if self.dataset.take().is_some() {
            debug!(path = %self.path.display(), "Released dataset");
        }
    }

    fn name(&self) -> &'static str {
        "dataset"
    }

    fn params(&self) -> Result<FileParams> {
        Ok(FileParams {
            time: Time::new::<second>(self.dataset()?.current_time()),
            extensions: Vec::new(),
        })
    }

    fn listing(&self) -> Result<Listing> {
        let dataset = self.dataset()?;
        let geometry = dataset.geometry();
        let axis_labels = Self::axis_labels(dataset);
        let field_list = dataset.derived_field_list();

        let fields = field_list
            .iter()
            .filter(|(field_type, _)| field_type == MESH_FIELD_TYPE)
            .map(|(_, name)| RawField {
                key: name.clone(),
                geometry,
                axis_labels: axis_labels.clone(),
                avail_circ_modes: Vec::new(),
            })
            .collect();

        let species = dataset
            .particle_types()
            .into_iter()
            .map(|species| {
                let keys = field_list
                    .iter()
                    .filter(|(field_type, _)| *field_type == species)
                    .map(|(_, name)| name.clone())
                    .collect();
                (species, keys)
            })
            .collect();

        Ok(Listing { fields, species })
    }

    fn denylist(&self) -> &'static Denylist {
        &DATASET_DENYLIST
    }

    fn field_handle(&self, field: &str, coord: Option<&str>) -> Result<RawHandle> {
        let dataset = self.dataset()?;
        let key = Self::field_key(field, coord);
        let data = dataset
            .covering_grid(&key)
            .or_else(|| dataset.covering_grid(field))
            .ok_or(Error::UnknownField(key))?;
        Ok(RawHandle::array(data, 1.0))
    }

    fn grid_geometry(&self, _field: &str, _coord: Option<&str>) -> Result<GridMeta> {
        let dataset = self.dataset()?;
        let domain = dataset.domain();
        let dim = dataset.dimensionality();

        let grid_spacing = domain
            .width
            .iter()
            .zip(&domain.dimensions)
            .map(|(w, &n)| w / n as f64)
            .collect();

        GridMeta::new(
            Self::axis_labels(dataset),
            domain.dimensions.clone(),
            grid_spacing,
            domain.left_edge.clone(),
            1.0,
            vec![0.0; dim],
        )
    }

    fn species_quantity(&self, species: &str, component: &str) -> Result<Array1<f64>> {
        let dataset = self.dataset()?;
        if !dataset.particle_types().iter().any(|s| s == species) {
            return Err(Error::UnknownSpecies(species.to_string()));
        }

        let key = format!("{PARTICLE_PREFIX}{}", raw_component_name(component));
        dataset
            .particle_data(species, &key)
            .ok_or_else(|| Error::UnknownComponent {
                record: species.to_string(),
                component: key,
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ndarray::{array, Array};

    use super::*;
    use crate::formats::catalog::Catalog;

    pub(crate) fn sample_dataset() -> MemDataset {
        let ramp = |offset: f64| {
            Array::from_shape_fn((2, 3), |(i, j)| offset + (10 * i + j) as f64).into_dyn()
        };
        let mesh = |name: &str, offset: f64| MeshEntry {
            name: name.to_string(),
            data: ramp(offset),
        };
        let record = |name: &str, data: Array1<f64>| ParticleEntry {
            name: name.to_string(),
            data,
        };

        MemDataset {
            current_time: 3e-14,
            geometry: None,
            domain: Domain {
                left_edge: vec![-1.0, 0.0],
                width: vec![2.0, 6.0],
                dimensions: vec![2, 3],
            },
            fields: vec![
                mesh("E_x", 0.0),
                mesh("E_y", 100.0),
                mesh("Ex", 0.0),
                mesh("rho", 200.0),
                mesh("cell_volume", 1.0),
                mesh("magnetic_energy", 0.0),
            ],
            species: vec![
                SpeciesEntry {
                    name: "all".to_string(),
                    records: vec![record("weight", array![1.0])],
                },
                SpeciesEntry {
                    name: "electrons".to_string(),
                    records: vec![
                        record("position_x", array![0.5, -0.5, 0.25]),
                        record("position_y", array![1.0, 2.0, 3.0]),
                        record("positionOffset_x", array![0.0, 0.0, 0.0]),
                        record("momentum_x", array![0.1, 0.2, 0.3]),
                        record("weighting", array![1.0, 1.0, 2.0]),
                        record("weight", array![1.0, 1.0, 2.0]),
                        record("charge", array![-1.0, -1.0, -1.0]),
                    ],
                },
            ],
        }
    }

    fn backend() -> DatasetBackend<MemDataset> {
        DatasetBackend::from_dataset("sample.json", sample_dataset())
    }

    #[test]
    fn catalog() {
        let backend = backend();
        let catalog = Catalog::build(backend.listing().unwrap(), backend.denylist());

        let fields = catalog.fields().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(fields, ["E", "rho"]);
        assert_eq!(catalog.field("E").unwrap().components, ["x", "y"]);
        assert_eq!(catalog.field("rho").unwrap().axis_labels, ["x", "y"]);
        assert_eq!(catalog.geometry(), Some(Geometry::Cartesian2D));

        assert_eq!(catalog.species_names().collect::<Vec<_>>(), ["electrons"]);
        assert_eq!(
            catalog.species_components("electrons").unwrap(),
            ["charge", "x", "y", "ux", "w"]
        );
    }

    #[test]
    fn grid_from_domain() {
        let grid = backend().grid_geometry("rho", None).unwrap();
        assert_eq!(grid.axis_labels, ["x", "y"]);
        assert_eq!(grid.shape, [2, 3]);
        assert_eq!(grid.grid_spacing, [1.0, 2.0]);
        assert_eq!(grid.global_offset, [-1.0, 0.0]);
        assert_eq!(grid.grid_position, [0.0, 0.0]);
        assert_eq!(grid.axis_parameters(1).range, [0.0, 6.0]);
    }

    #[test]
    fn field_handles() {
        let backend = backend();
        let e_y = backend.field_handle("E", Some("y")).unwrap();
        assert_eq!(e_y.unit_si, 1.0);
        assert_eq!(e_y.shape(), [2, 3]);

        assert!(backend.field_handle("rho", None).is_ok());
        assert!(matches!(
            backend.field_handle("B", Some("x")),
            Err(Error::UnknownField(key)) if key == "B_x"
        ));
    }

    #[test]
    fn species_quantities() {
        let backend = backend();
        assert_eq!(
            backend.species_quantity("electrons", "x").unwrap(),
            array![0.5, -0.5, 0.25]
        );
        // No unit conversion on this backend
        assert_eq!(
            backend.species_quantity("electrons", "ux").unwrap(),
            array![0.1, 0.2, 0.3]
        );
        assert!(matches!(
            backend.species_quantity("electrons", "uz"),
            Err(Error::UnknownComponent { .. })
        ));
        assert!(matches!(
            backend.species_quantity("all", "w"),
            Err(Error::UnknownSpecies(_))
        ));
    }

    #[test]
    fn params() {
        let params = backend().params().unwrap();
        assert_eq!(params.time.get::<second>(), 3e-14);
        assert!(params.extensions.is_empty());
    }

    #[test]
    fn open_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        std::fs::write(&path, serde_json::to_string(&sample_dataset()).unwrap()).unwrap();

        let mut backend = DatasetBackend::<MemDataset>::open(&(), &path).unwrap();
        assert_eq!(backend.listing().unwrap(), self::backend().listing().unwrap());

        // Releasing is idempotent
        backend.close();
        backend.close();
        assert!(matches!(backend.params(), Err(Error::NoFileOpen)));
    }
}
