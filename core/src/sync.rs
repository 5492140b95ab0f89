use std::{path::Path, sync::Arc};

use ndarray::{Array1, ArrayD};
use parking_lot::{Mutex, MutexGuard};

use crate::backend::{Backend, FileParams};
use crate::common::grid::{AxisParameters, GridMeta};
use crate::error::Result;
use crate::file::DataReader;
use crate::formats::circ::CircOptions;
use crate::formats::select::SelectionRules;
use crate::formats::slice::SliceRequest;

/// A [`DataReader`] that can be shared between threads. Calls are
/// serialized, so concurrent readers should open separate files instead.
pub struct SharedReader<B: Backend>(Arc<Mutex<DataReader<B>>>);

impl<B: Backend> Clone for SharedReader<B> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<B: Backend> From<DataReader<B>> for SharedReader<B> {
    fn from(reader: DataReader<B>) -> Self {
        Self(Arc::new(Mutex::new(reader)))
    }
}

impl<B: Backend> SharedReader<B> {
    pub fn new(options: B::Options) -> Self {
        DataReader::new(options).into()
    }

    /// Locks the reader for a batch of calls.
    pub fn lock(&self) -> MutexGuard<'_, DataReader<B>> {
        self.0.lock()
    }

    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.lock().open_file(path)
    }

    pub fn close_file(&self) {
        self.lock().close_file();
    }

    pub fn params(&self) -> Result<FileParams> {
        self.lock().params()
    }

    pub fn read_field(
        &self,
        field: &str,
        coord: Option<&str>,
        slices: &[SliceRequest],
        circ: CircOptions,
    ) -> Result<(ArrayD<f64>, GridMeta)> {
        self.lock().read_field(field, coord, slices, circ)
    }

    pub fn read_species_quantity(&self, species: &str, component: &str) -> Result<Array1<f64>> {
        self.lock().read_species_quantity(species, component)
    }

    pub fn select_particles(
        &self,
        species: &str,
        rules: &SelectionRules,
        components: &[&str],
    ) -> Result<Vec<Array1<f64>>> {
        self.lock().select_particles(species, rules, components)
    }

    pub fn grid_parameters(&self) -> Result<Option<Vec<AxisParameters>>> {
        self.lock().grid_parameters()
    }
}
