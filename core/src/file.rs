use std::path::{Path, PathBuf};

use ndarray::{Array1, ArrayD};
use tracing::{debug, instrument};

use crate::backend::{AnyBackend, Backend, FileParams};
use crate::common::grid::{AxisParameters, GridMeta};
use crate::error::{Error, Result};
use crate::formats::catalog::{Catalog, QuantityDescriptor, RecordKind};
use crate::formats::circ::{reconstruct, CircOptions};
use crate::formats::record::extract;
use crate::formats::select::{select, SelectionRules};
use crate::formats::slice::{resolve_slices, slice_field, SliceRequest};
use crate::geom::Geometry;

#[derive(Debug)]
struct Session<B> {
    path: PathBuf,
    backend: B,
    catalog: Catalog,
}

/// Reads normalized fields and particle quantities from one file at a time.
///
/// The catalog of a file is built when it is opened and stays valid until it
/// is closed. Dropping the reader closes the file.
#[derive(Debug)]
pub struct DataReader<B: Backend> {
    options: B::Options,
    session: Option<Session<B>>,
}

/// A reader whose backend is picked at runtime.
pub type AnyReader = DataReader<AnyBackend>;

impl<B: Backend> Default for DataReader<B> {
    fn default() -> Self {
        Self::new(B::Options::default())
    }
}

impl<B: Backend> DataReader<B> {
    pub fn new(options: B::Options) -> Self {
        Self {
            options,
            session: None,
        }
    }

    /// Starts reading from an already opened backend.
    pub fn with_backend(options: B::Options, path: impl Into<PathBuf>, backend: B) -> Result<Self> {
        let mut reader = Self::new(options);
        reader.session = Some(Session::new(path.into(), backend)?);
        Ok(reader)
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(session) = &self.session {
            return Err(Error::FileAlreadyOpen(session.path.clone()));
        }

        let path = path.as_ref();
        let backend = B::open(&self.options, path)?;
        self.session = Some(Session::new(path.to_path_buf(), backend)?);
        Ok(())
    }

    /// Closes the current file. Does nothing if no file is open.
    pub fn close_file(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.backend.close();
            debug!(path = %session.path.display(), "Closed file");
        }
    }

    fn session(&self) -> Result<&Session<B>> {
        self.session.as_ref().ok_or(Error::NoFileOpen)
    }

    pub fn catalog(&self) -> Result<&Catalog> {
        Ok(&self.session()?.catalog)
    }

    pub fn params(&self) -> Result<FileParams> {
        self.session()?.backend.params()
    }

    /// Reads `field` (its `coord` component for vector fields) in SI units,
    /// cut along every slice request.
    ///
    /// `circ` only matters for thetaMode fields, which are returned in the
    /// plane at `circ.theta` on both sides of the axis.
    #[instrument(skip(self, slices, circ))]
    pub fn read_field(
        &self,
        field: &str,
        coord: Option<&str>,
        slices: &[SliceRequest],
        circ: CircOptions,
    ) -> Result<(ArrayD<f64>, GridMeta)> {
        let session = self.session()?;
        let descriptor = session.field(field)?;
        let coord = component_of(descriptor, coord)?;

        match descriptor.geometry {
            Geometry::ThetaMode => session.read_field_circ(descriptor, coord, slices, circ),
            _ => session.read_field_cartesian(descriptor, coord, slices),
        }
    }

    /// Values of one quantity of `species`, addressed by its canonical name
    /// (`x`, `uz`, `w`, `charge`, ...).
    #[instrument(skip(self))]
    pub fn read_species_quantity(&self, species: &str, component: &str) -> Result<Array1<f64>> {
        let session = self.session()?;
        if session.catalog.species_components(species).is_none() {
            return Err(Error::UnknownSpecies(species.to_string()));
        }
        session.backend.species_quantity(species, component)
    }

    /// Reads `components` of `species`, keeping only the particles that pass
    /// every rule.
    #[instrument(skip(self, rules))]
    pub fn select_particles(
        &self,
        species: &str,
        rules: &SelectionRules,
        components: &[&str],
    ) -> Result<Vec<Array1<f64>>> {
        let data = components
            .iter()
            .map(|c| self.read_species_quantity(species, c))
            .collect::<Result<Vec<_>>>()?;

        select(data, rules, |name| self.read_species_quantity(species, name))
    }

    /// Size and range of the grid of the first field, per axis. `None` if
    /// the file has no fields.
    pub fn grid_parameters(&self) -> Result<Option<Vec<AxisParameters>>> {
        let session = self.session()?;
        let descriptor = match session.catalog.first_field() {
            Some(descriptor) => descriptor,
            None => return Ok(None),
        };

        let coord = descriptor.components.first().map(String::as_str);
        let mut grid = session.backend.grid_geometry(&descriptor.name, coord)?;
        if descriptor.geometry == Geometry::ThetaMode {
            grid = grid.mirrored_r()?;
        }

        Ok(Some(
            (0..grid.dimensionality())
                .map(|axis| grid.axis_parameters(axis))
                .collect(),
        ))
    }
}

impl<B: Backend> Drop for DataReader<B> {
    fn drop(&mut self) {
        self.close_file();
    }
}

/// The component to read from a field: none for scalar fields, the
/// requested one for vector fields.
fn component_of<'a>(
    descriptor: &QuantityDescriptor,
    coord: Option<&'a str>,
) -> Result<Option<&'a str>> {
    match descriptor.kind {
        RecordKind::Scalar => Ok(None),
        RecordKind::Vector => {
            let coord = coord.ok_or_else(|| Error::MissingComponent(descriptor.name.clone()))?;
            let known = descriptor.components.iter().any(|c| c == coord);
            // Cartesian components of cylindrical fields are derived from r and t
            let derived = descriptor.geometry == Geometry::ThetaMode && matches!(coord, "x" | "y");
            if known || derived {
                Ok(Some(coord))
            } else {
                Err(Error::UnknownComponent {
                    record: descriptor.name.clone(),
                    component: coord.to_string(),
                })
            }
        }
    }
}

impl<B: Backend> Session<B> {
    #[instrument(skip(backend), fields(kind = backend.name()))]
    fn new(path: PathBuf, backend: B) -> Result<Self> {
        let catalog = Catalog::build(backend.listing()?, backend.denylist());
        Ok(Self {
            path,
            backend,
            catalog,
        })
    }

    fn field(&self, field: &str) -> Result<&QuantityDescriptor> {
        self.catalog
            .field(field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))
    }

    fn read_field_cartesian(
        &self,
        descriptor: &QuantityDescriptor,
        coord: Option<&str>,
        slices: &[SliceRequest],
    ) -> Result<(ArrayD<f64>, GridMeta)> {
        let handle = self.backend.field_handle(&descriptor.name, coord)?;
        let grid = self.backend.grid_geometry(&descriptor.name, coord)?;
        if handle.shape() != grid.shape.as_slice() {
            return Err(Error::InconsistentGrid(format!(
                "{} has shape {:?}, its grid has shape {:?}",
                descriptor.name,
                handle.shape(),
                grid.shape
            )));
        }

        // Slicing while extracting avoids expanding constant records
        let resolved = resolve_slices(&grid, slices)?;
        let data = extract::<f64>(&handle, resolved.indices, resolved.axes.clone())?;
        Ok((data, grid.without_axes(&resolved.axes)))
    }

    fn read_field_circ(
        &self,
        descriptor: &QuantityDescriptor,
        coord: Option<&str>,
        slices: &[SliceRequest],
        circ: CircOptions,
    ) -> Result<(ArrayD<f64>, GridMeta)> {
        if !self.backend.supports_theta_mode() {
            return Err(Error::UnsupportedGeometry {
                geometry: Geometry::ThetaMode,
                backend: self.backend.name(),
            });
        }

        let name = descriptor.name.as_str();
        let read = |coord: Option<&str>| {
            let handle = self.backend.field_handle(name, coord)?;
            reconstruct(&handle, circ.mode, circ.theta)
        };
        let (cos, sin) = (circ.theta.cos(), circ.theta.sin());

        let (data, grid_coord) = match coord {
            Some("x") => (read(Some("r"))? * cos - read(Some("t"))? * sin, Some("r")),
            Some("y") => (read(Some("r"))? * sin + read(Some("t"))? * cos, Some("r")),
            coord => (read(coord)?, coord),
        };
        let grid = self.backend.grid_geometry(name, grid_coord)?.mirrored_r()?;

        slice_field(data.into_dyn(), &grid, slices)
    }
}
