//! Reads HDF5 container files into a [`Node`] tree.

use std::{collections::BTreeMap, path::Path};

use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Container, Dataset, Group, Location};
use tracing::{debug, instrument};

use super::node::{Attr, Node, Values};
use crate::error::{Error, Result};

/// Fixed-length string attributes are truncated to this length.
const FIXED_STRING_LEN: usize = 1024;

impl From<hdf5::Error> for Error {
    fn from(err: hdf5::Error) -> Self {
        Error::Hdf5(err.to_string())
    }
}

#[instrument]
pub fn read_file(path: &Path) -> Result<Node> {
    let file = hdf5::File::open(path)?;
    read_group(&file)
}

fn read_group(group: &Group) -> Result<Node> {
    let mut node = Node::Group {
        attrs: read_attrs(group)?,
        children: BTreeMap::new(),
    };
    for child in group.groups()? {
        node = node.with_child(base_name(&child.name()), read_group(&child)?);
    }
    for dataset in group.datasets()? {
        if let Some(child) = read_dataset(&dataset)? {
            node = node.with_child(base_name(&dataset.name()), child);
        }
    }
    Ok(node)
}

fn read_dataset(dataset: &Dataset) -> Result<Option<Node>> {
    let values = match dataset.dtype()?.to_descriptor()? {
        TypeDescriptor::Float(_) => Values::Floats(dataset.read_raw()?),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            Values::Ints(dataset.read_raw()?)
        }
        other => {
            debug!(dataset = %dataset.name(), dtype = ?other, "Skipping dataset");
            return Ok(None);
        }
    };
    Ok(Some(Node::Dataset {
        attrs: read_attrs(dataset)?,
        shape: dataset.shape(),
        values,
    }))
}

fn read_attrs(location: &Location) -> Result<BTreeMap<String, Attr>> {
    let mut attrs = BTreeMap::new();
    for name in location.attr_names()? {
        match read_attr(&location.attr(&name)?)? {
            Some(attr) => {
                attrs.insert(name, attr);
            }
            None => debug!(location = %location.name(), name = %name, "Skipping attribute"),
        }
    }
    Ok(attrs)
}

fn read_attr(attr: &Container) -> Result<Option<Attr>> {
    let scalar = attr.is_scalar();
    let attr = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::Float(_) => pack(attr.read_raw::<f64>()?, scalar),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            pack(attr.read_raw::<i64>()?, scalar)
        }
        TypeDescriptor::VarLenUnicode => {
            let v = attr.read_raw::<VarLenUnicode>()?;
            pack(v.iter().map(|s| s.as_str().to_string()).collect(), scalar)
        }
        TypeDescriptor::VarLenAscii => {
            let v = attr.read_raw::<VarLenAscii>()?;
            pack(v.iter().map(|s| s.as_str().to_string()).collect(), scalar)
        }
        TypeDescriptor::FixedAscii(_) => {
            let v = attr.read_raw::<FixedAscii<FIXED_STRING_LEN>>()?;
            pack(v.iter().map(|s| s.as_str().to_string()).collect(), scalar)
        }
        TypeDescriptor::FixedUnicode(_) => {
            let v = attr.read_raw::<FixedUnicode<FIXED_STRING_LEN>>()?;
            pack(v.iter().map(|s| s.as_str().to_string()).collect(), scalar)
        }
        _ => None,
    };
    Ok(attr)
}

fn pack<T>(mut values: Vec<T>, scalar: bool) -> Option<Attr>
where
    Attr: From<T> + From<Vec<T>>,
{
    if scalar {
        values.pop().map(Attr::from)
    } else {
        Some(values.into())
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
