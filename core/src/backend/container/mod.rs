//! Backend reading openPMD container files directly.
//!
//! Files are loaded into an in-memory group/dataset tree (see
//! [`ContainerFile`]), either from HDF5 with the `hdf5` feature or from a
//! JSON snapshot, and then navigated following the openPMD path conventions.

use std::path::{Path, PathBuf};

use ndarray::{Array1, ErrorKind, Ix1, ShapeError, Zip};
use tracing::{debug, instrument, warn};
use uom::si::{f64::Time, time::second};

use super::{Backend, FileParams};
use crate::common::grid::GridMeta;
use crate::error::{Error, Result};
use crate::formats::catalog::{
    raw_component_name, Denylist, Listing, RawField, CONTAINER_DENYLIST,
};
use crate::formats::circ::available_modes;
use crate::formats::record::{extract, Positions, RawHandle};
use crate::formats::utils::join_infile_path;
use crate::geom::Geometry;

#[cfg(feature = "hdf5")]
mod h5;
pub mod node;


pub use node::{Attr, ContainerFile, Node, Values};

const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Reserved species group holding the patch layout, not particle records.
const PARTICLE_PATCHES: &str = "particlePatches";

/// Bit of the `openPMDextension` attribute and the extension it stands for.
const EXTENSIONS: [(i64, &str); 1] = [(1, "ED-PIC")];

#[derive(Debug)]
pub struct ContainerBackend {
    path: PathBuf,
    file: Option<ContainerFile>,
}

impl ContainerBackend {
    /// Wraps a file that is already in memory.
    pub fn from_file(path: impl Into<PathBuf>, file: ContainerFile) -> Self {
        Self {
            path: path.into(),
            file: Some(file),
        }
    }

    fn file(&self) -> Result<&ContainerFile> {
        self.file.as_ref().ok_or(Error::NoFileOpen)
    }

    /// Mesh record `field` and its path.
    fn mesh_record(&self, field: &str) -> Result<(String, &Node)> {
        let file = self.file()?;
        let meshes = file
            .meshes_path()?
            .ok_or_else(|| Error::UnknownField(field.to_string()))?;
        let path = join_infile_path(&[meshes.as_str(), field]);
        let node = file
            .root
            .lookup(&path)
            .ok_or_else(|| Error::UnknownField(field.to_string()))?;
        Ok((path, node))
    }

    /// Record component `coord` of mesh record `field`. Scalar records are
    /// their own component.
    fn mesh_component(&self, field: &str, coord: Option<&str>) -> Result<(String, &Node)> {
        let (path, record) = self.mesh_record(field)?;
        if record.is_scalar_record() {
            return Ok((path, record));
        }

        let coord = coord.ok_or_else(|| Error::MissingComponent(field.to_string()))?;
        let component = record.child(coord).ok_or_else(|| Error::UnknownComponent {
            record: field.to_string(),
            component: coord.to_string(),
        })?;
        Ok((join_infile_path(&[path.as_str(), coord]), component))
    }

    fn species_group(&self, species: &str) -> Result<(String, &Node)> {
        let file = self.file()?;
        let particles = file
            .particles_path()?
            .ok_or_else(|| Error::UnknownSpecies(species.to_string()))?;
        let path = join_infile_path(&[particles.as_str(), species]);
        let node = file
            .root
            .lookup(&path)
            .ok_or_else(|| Error::UnknownSpecies(species.to_string()))?;
        Ok((path, node))
    }

    /// Reads the record component `raw` (e.g. `charge` or `momentum_x`) of a
    /// species as it is stored, apart from the unit conversion.
    fn species_record(&self, species: &str, raw: &str) -> Result<Array1<f64>> {
        let (path, group) = self.species_group(species)?;

        let (path, node) = match particle_record(group, raw) {
            Some(record) if record.is_scalar_record() => {
                (join_infile_path(&[path.as_str(), raw]), record)
            }
            _ => raw
                .rsplit_once('_')
                .and_then(|(record, component)| {
                    let node = particle_record(group, record)?.child(component)?;
                    Some((join_infile_path(&[path.as_str(), record, component]), node))
                })
                .ok_or_else(|| Error::UnknownComponent {
                    record: species.to_string(),
                    component: raw.to_string(),
                })?,
        };

        let handle = node.to_handle(&path)?;
        let data = extract::<f64>(&handle, Positions::none(), Positions::none())?;
        Ok(data.into_dimensionality::<Ix1>()?)
    }

    fn has_species_record(&self, species: &str, record: &str) -> Result<bool> {
        let (_, group) = self.species_group(species)?;
        Ok(particle_record(group, record).is_some())
    }

    /// Position plus the offset of the cell the particle belongs to.
    fn species_position(&self, species: &str, axis: &str) -> Result<Array1<f64>> {
        let position = self.species_record(species, &format!("position_{axis}"))?;
        if !self.has_species_record(species, "positionOffset")? {
            return Ok(position);
        }
        let offset = self.species_record(species, &format!("positionOffset_{axis}"))?;
        combine(position, &offset, |p, o| p + o)
    }

    /// Momentum in units of `m * c`. Massless species keep SI momentum.
    fn species_momentum(&self, species: &str, axis: &str) -> Result<Array1<f64>> {
        let momentum = self.species_record(species, &format!("momentum_{axis}"))?;
        if !self.has_species_record(species, "mass")? {
            return Ok(momentum);
        }
        let mass = self.species_record(species, "mass")?;
        if mass.iter().any(|&m| m == 0.0) {
            debug!(species, "Massless particles, keeping momentum in SI units");
            return Ok(momentum);
        }
        combine(momentum, &mass, |p, m| p / (m * SPEED_OF_LIGHT))
    }

    /// Describes the components of one mesh record. Records with a geometry
    /// that can't be read are left out.
    fn raw_fields(&self, meshes: &str, name: &str, record: &Node) -> Result<Vec<RawField>> {
        let path = join_infile_path(&[meshes, name]);

        let mut axis_labels = record.strs_attr(&path, "axisLabels")?;
        if is_fortran_ordered(record) {
            axis_labels.reverse();
        }

        let geometry_attr = record.str_attr(&path, "geometry")?;
        let geometry = match Geometry::from_openpmd(geometry_attr, axis_labels.len()) {
            Some(geometry) => geometry,
            None => {
                warn!(
                    record = %path,
                    geometry = geometry_attr,
                    "Unsupported mesh geometry, skipping"
                );
                return Ok(Vec::new());
            }
        };

        let components = if record.is_scalar_record() {
            vec![(name.to_string(), record, path.clone())]
        } else {
            record
                .children()
                .map(|(c, node)| {
                    let comp_path = join_infile_path(&[path.as_str(), c]);
                    (format!("{name}_{c}"), node, comp_path)
                })
                .collect()
        };

        let avail_circ_modes = match (geometry, components.first()) {
            (Geometry::ThetaMode, Some((_, node, comp_path))) => {
                let shape = node.record_shape(comp_path)?;
                available_modes(shape.first().copied().unwrap_or(0))
            }
            _ => Vec::new(),
        };

        Ok(components
            .into_iter()
            .map(|(key, _, _)| RawField {
                key,
                geometry,
                axis_labels: axis_labels.clone(),
                avail_circ_modes: avail_circ_modes.clone(),
            })
            .collect())
    }
}

/// Record `name` of a species group. The particle patches are not a record.
fn particle_record<'a>(species: &'a Node, name: &str) -> Option<&'a Node> {
    if name == PARTICLE_PATCHES {
        return None;
    }
    species.child(name)
}

fn is_fortran_ordered(record: &Node) -> bool {
    matches!(record.attr("dataOrder").and_then(Attr::as_str), Some("F"))
}

/// Applies `f` elementwise. `b` may hold a single value for every element of `a`.
fn combine(
    mut a: Array1<f64>,
    b: &Array1<f64>,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Array1<f64>> {
    match b.len() {
        1 => {
            let b = b[0];
            a.mapv_inplace(|a| f(a, b));
        }
        len if len == a.len() => Zip::from(&mut a).and(b).for_each(|a, &b| *a = f(*a, b)),
        _ => return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into()),
    }
    Ok(a)
}

impl Backend for ContainerBackend {
    type Options = ();

    #[instrument(skip(_options))]
    fn open(_options: &(), path: &Path) -> Result<Self> {
        let file = ContainerFile::open(path)?;
        debug!("Loaded container file");
        Ok(Self::from_file(path, file))
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "Closed container file");
        }
    }

    fn name(&self) -> &'static str {
        "container"
    }

    fn params(&self) -> Result<FileParams> {
        let file = self.file()?;

        let version = file.root.str_attr("/", "openPMD")?;
        if !version.starts_with("1.") {
            return Err(Error::UnsupportedVersion(version.to_string()));
        }

        let base_path = file.base_path()?;
        let iteration = file.node(&base_path)?;
        let time = iteration.f64_attr(&base_path, "time")?
            * iteration.f64_attr(&base_path, "timeUnitSI")?;

        let extension_bits = file
            .root
            .attr("openPMDextension")
            .and_then(Attr::as_i64)
            .unwrap_or(0);
        let extensions = EXTENSIONS
            .iter()
            .filter(|(bit, _)| extension_bits & bit != 0)
            .map(|(_, name)| name.to_string())
            .collect();

        Ok(FileParams {
            time: Time::new::<second>(time),
            extensions,
        })
    }

    fn listing(&self) -> Result<Listing> {
        let file = self.file()?;
        let mut listing = Listing::default();

        if let Some(meshes) = file.meshes_path()? {
            if let Some(group) = file.root.lookup(&meshes) {
                for (name, record) in group.children() {
                    listing.fields.extend(self.raw_fields(&meshes, name, record)?);
                }
            }
        }

        if let Some(particles) = file.particles_path()? {
            if let Some(group) = file.root.lookup(&particles) {
                for (species, records) in group.children() {
                    let mut keys = Vec::new();
                    let records = records
                        .children()
                        .filter(|(name, _)| *name != PARTICLE_PATCHES);
                    for (name, record) in records {
                        if record.is_scalar_record() {
                            keys.push(name.to_string());
                        } else {
                            keys.extend(record.children().map(|(c, _)| format!("{name}_{c}")));
                        }
                    }
                    listing.species.push((species.to_string(), keys));
                }
            }
        }

        Ok(listing)
    }

    fn denylist(&self) -> &'static Denylist {
        &CONTAINER_DENYLIST
    }

    fn field_handle(&self, field: &str, coord: Option<&str>) -> Result<RawHandle> {
        let (path, component) = self.mesh_component(field, coord)?;
        component.to_handle(&path)
    }

    fn grid_geometry(&self, field: &str, coord: Option<&str>) -> Result<GridMeta> {
        let (record_path, record) = self.mesh_record(field)?;
        let (path, component) = self.mesh_component(field, coord)?;

        let mut axis_labels = record.strs_attr(&record_path, "axisLabels")?;
        let mut grid_spacing = record.f64s_attr(&record_path, "gridSpacing")?;
        let mut global_offset = record.f64s_attr(&record_path, "gridGlobalOffset")?;
        let grid_unit_si = record.f64_attr(&record_path, "gridUnitSI")?;
        let mut grid_position = component.f64s_attr(&path, "position")?;
        if is_fortran_ordered(record) {
            axis_labels.reverse();
            grid_spacing.reverse();
            global_offset.reverse();
            grid_position.reverse();
        }

        let mut shape = component.record_shape(&path)?;
        if record.str_attr(&record_path, "geometry")? == "thetaMode" && !shape.is_empty() {
            // Mode axis
            shape.remove(0);
        }

        GridMeta::new(
            axis_labels,
            shape,
            grid_spacing,
            global_offset,
            grid_unit_si,
            grid_position,
        )
    }

    fn species_quantity(&self, species: &str, component: &str) -> Result<Array1<f64>> {
        match component {
            "x" | "y" | "z" => self.species_position(species, component),
            "ux" | "uy" | "uz" => self.species_momentum(species, &component[1..]),
            other => self.species_record(species, raw_component_name(other)),
        }
    }

    fn supports_theta_mode(&self) -> bool {
        true
    }
}
