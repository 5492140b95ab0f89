use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use derive_more::From;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::formats::record::{RawArray, RawHandle};
use crate::formats::utils::join_infile_path;

#[derive(Debug, Clone, PartialEq, From, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attr {
    Int(i64),
    Float(f64),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strs(Vec<String>),
}

impl From<&str> for Attr {
    fn from(s: &str) -> Self {
        Attr::Str(s.to_string())
    }
}

impl From<Vec<&str>> for Attr {
    fn from(v: Vec<&str>) -> Self {
        Attr::Strs(v.into_iter().map(str::to_string).collect())
    }
}

impl Attr {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Attr::Int(v) => Some(v as f64),
            Attr::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Attr::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attr::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64s(&self) -> Option<Vec<f64>> {
        match self {
            Attr::Ints(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Attr::Floats(v) => Some(v.clone()),
            Attr::Int(_) | Attr::Float(_) => self.as_f64().map(|x| vec![x]),
            _ => None,
        }
    }

    pub fn as_usizes(&self) -> Option<Vec<usize>> {
        match self {
            Attr::Ints(v) => v.iter().map(|&x| usize::try_from(x).ok()).collect(),
            Attr::Int(x) => usize::try_from(*x).ok().map(|x| vec![x]),
            _ => None,
        }
    }

    pub fn as_strs(&self) -> Option<Vec<String>> {
        match self {
            Attr::Strs(v) => Some(v.clone()),
            Attr::Str(s) => Some(vec![s.clone()]),
            _ => None,
        }
    }
}

/// Flat, C-ordered values of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    Ints(Vec<i64>),
    Floats(#[serde(with = "json_floats")] Vec<f64>),
}

/// JSON has no NaN or infinity, those are written as strings instead.
mod json_floats {
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum JsonFloat {
        Finite(f64),
        NonFinite(String),
    }

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| {
            if v.is_finite() {
                JsonFloat::Finite(v)
            } else {
                JsonFloat::NonFinite(v.to_string())
            }
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<JsonFloat>::deserialize(deserializer)?
            .into_iter()
            .map(|v| match v {
                JsonFloat::Finite(v) => Ok(v),
                JsonFloat::NonFinite(s) => s
                    .parse()
                    .map_err(|_| D::Error::custom(format!("invalid float {s:?}"))),
            })
            .collect()
    }
}

/// A group or dataset of a container file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Group {
        #[serde(default)]
        attrs: BTreeMap<String, Attr>,
        #[serde(default)]
        children: BTreeMap<String, Node>,
    },
    Dataset {
        #[serde(default)]
        attrs: BTreeMap<String, Attr>,
        shape: Vec<usize>,
        values: Values,
    },
}

impl Node {
    pub fn group() -> Self {
        Node::Group {
            attrs: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn dataset(data: impl Into<RawArray>) -> Self {
        let (shape, values) = match data.into() {
            RawArray::Float(a) => (a.shape().to_vec(), Values::Floats(a.iter().copied().collect())),
            RawArray::Int(a) => (a.shape().to_vec(), Values::Ints(a.iter().copied().collect())),
        };
        Node::Dataset {
            attrs: BTreeMap::new(),
            shape,
            values,
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<Attr>) -> Self {
        self.attrs_mut().insert(name.to_string(), value.into());
        self
    }

    /// Adds a child node. Datasets can't have children, the call is
    /// ignored for them.
    pub fn with_child(mut self, name: &str, child: Node) -> Self {
        if let Node::Group { children, .. } = &mut self {
            children.insert(name.to_string(), child);
        }
        self
    }

    pub fn attrs(&self) -> &BTreeMap<String, Attr> {
        match self {
            Node::Group { attrs, .. } | Node::Dataset { attrs, .. } => attrs,
        }
    }

    fn attrs_mut(&mut self) -> &mut BTreeMap<String, Attr> {
        match self {
            Node::Group { attrs, .. } | Node::Dataset { attrs, .. } => attrs,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs().get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        let children = match self {
            Node::Group { children, .. } => Some(children),
            Node::Dataset { .. } => None,
        };
        children
            .into_iter()
            .flat_map(|c| c.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Group { children, .. } => children.get(name),
            Node::Dataset { .. } => None,
        }
    }

    /// Follows a `/`-separated path relative to this node.
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |node, name| node.child(name))
    }

    /// A record is scalar when it is a dataset or a constant record,
    /// otherwise its children are its components.
    pub fn is_scalar_record(&self) -> bool {
        matches!(self, Node::Dataset { .. }) || self.attr("value").is_some()
    }

    pub fn require(&self, path: &str, name: &'static str) -> Result<&Attr> {
        self.attr(name).ok_or_else(|| Error::MissingAttribute {
            path: path.to_string(),
            name,
        })
    }

    pub fn f64_attr(&self, path: &str, name: &'static str) -> Result<f64> {
        self.require(path, name)?
            .as_f64()
            .ok_or_else(|| invalid(path, name))
    }

    pub fn str_attr(&self, path: &str, name: &'static str) -> Result<&str> {
        self.require(path, name)?
            .as_str()
            .ok_or_else(|| invalid(path, name))
    }

    pub fn f64s_attr(&self, path: &str, name: &'static str) -> Result<Vec<f64>> {
        self.require(path, name)?
            .as_f64s()
            .ok_or_else(|| invalid(path, name))
    }

    pub fn strs_attr(&self, path: &str, name: &'static str) -> Result<Vec<String>> {
        self.require(path, name)?
            .as_strs()
            .ok_or_else(|| invalid(path, name))
    }

    /// Shape of the record component, whether it is written out or constant.
    pub fn record_shape(&self, path: &str) -> Result<Vec<usize>> {
        match self {
            Node::Dataset { shape, .. } => Ok(shape.clone()),
            Node::Group { .. } => self
                .require(path, "shape")?
                .as_usizes()
                .ok_or_else(|| invalid(path, "shape")),
        }
    }

    /// Wraps a record component (at `path`) as a handle.
    pub fn to_handle(&self, path: &str) -> Result<RawHandle> {
        let unit_si = self.f64_attr(path, "unitSI")?;

        match self {
            Node::Dataset { shape, values, .. } => {
                let shape = IxDyn(shape);
                let data: RawArray = match values {
                    Values::Floats(v) => ArrayD::from_shape_vec(shape, v.clone())?.into(),
                    Values::Ints(v) => ArrayD::from_shape_vec(shape, v.clone())?.into(),
                };
                Ok(RawHandle::array(data, unit_si))
            }
            Node::Group { .. } => match (self.attr("value"), self.attr("shape")) {
                (Some(value), Some(_)) => {
                    let value = value.as_f64().ok_or_else(|| invalid(path, "value"))?;
                    Ok(RawHandle::constant(value, self.record_shape(path)?, unit_si))
                }
                _ => Err(Error::InvalidHandleKind {
                    path: path.to_string(),
                }),
            },
        }
    }
}

fn is_hdf5(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("h5" | "hdf5")
    )
}

fn invalid(path: &str, name: &'static str) -> Error {
    Error::InvalidAttribute {
        path: path.to_string(),
        name,
    }
}

/// A container file held in memory as a tree of nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerFile {
    pub root: Node,
}

impl ContainerFile {
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    /// Loads a container file. `.h5` and `.hdf5` files are read as HDF5,
    /// anything else as a JSON snapshot.
    pub fn open(path: &Path) -> Result<Self> {
        if is_hdf5(path) {
            return Self::open_hdf5(path);
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    #[cfg(feature = "hdf5")]
    fn open_hdf5(path: &Path) -> Result<Self> {
        Ok(Self::new(super::h5::read_file(path)?))
    }

    #[cfg(not(feature = "hdf5"))]
    fn open_hdf5(path: &Path) -> Result<Self> {
        Err(Error::UnsupportedFormat(path.to_path_buf()))
    }

    /// Writes a JSON snapshot, whatever the extension of `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn node(&self, path: &str) -> Result<&Node> {
        self.root
            .lookup(path)
            .ok_or_else(|| Error::MissingNode(path.to_string()))
    }

    /// `/data/<iteration>` of the first iteration stored in the file.
    pub fn base_path(&self) -> Result<String> {
        let data = self.node("/data")?;
        let (iteration, _) = data
            .children()
            .next()
            .ok_or_else(|| Error::MissingNode("/data/%T".to_string()))?;
        Ok(join_infile_path(&["/data", iteration]))
    }

    fn sub_path(&self, name: &'static str) -> Result<Option<String>> {
        match self.root.attr(name) {
            None => Ok(None),
            Some(attr) => {
                let rel = attr.as_str().ok_or_else(|| invalid("/", name))?;
                Ok(Some(join_infile_path(&[self.base_path()?.as_str(), rel])))
            }
        }
    }

    /// Path of the mesh records, `None` if the file declares none.
    pub fn meshes_path(&self) -> Result<Option<String>> {
        self.sub_path("meshesPath")
    }

    /// Path of the particle species, `None` if the file declares none.
    pub fn particles_path(&self) -> Result<Option<String>> {
        self.sub_path("particlesPath")
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn attributes_from_json() {
        let node: Node = serde_json::from_str(
            r#"{
                "kind": "group",
                "attrs": {"unitSI": 1, "shape": [2, 3], "value": 0.5, "axisLabels": ["x", "z"]}
            }"#,
        )
        .unwrap();

        assert_eq!(node.f64_attr("/", "unitSI").unwrap(), 1.0);
        assert_eq!(node.record_shape("/").unwrap(), [2, 3]);
        assert_eq!(node.strs_attr("/", "axisLabels").unwrap(), ["x", "z"]);
        assert!(node.is_scalar_record());
        assert!(matches!(
            node.str_attr("/", "unitSI"),
            Err(Error::InvalidAttribute { name: "unitSI", .. })
        ));
        assert!(matches!(
            node.f64_attr("/", "timeUnitSI"),
            Err(Error::MissingAttribute { .. })
        ));
    }

    #[test]
    fn dataset_handle() {
        let node =
            Node::dataset(array![[1.0, 2.0], [3.0, 4.0]].into_dyn()).with_attr("unitSI", 2.0);
        let handle = node.to_handle("/rho").unwrap();
        assert_eq!(handle.shape(), [2, 2]);
        assert_eq!(handle.unit_si, 2.0);
        assert!(!handle.is_constant());
    }

    #[test]
    fn constant_handle() {
        let node = Node::group()
            .with_attr("value", 9.1e-31)
            .with_attr("shape", vec![100i64])
            .with_attr("unitSI", 1.0);
        let handle = node.to_handle("/mass").unwrap();
        assert!(handle.is_constant());
        assert_eq!(handle.shape(), [100]);
    }

    #[test]
    fn vector_record_is_not_a_handle() {
        let node = Node::group()
            .with_attr("unitSI", 1.0)
            .with_child("x", Node::group());
        assert!(!node.is_scalar_record());
        assert!(matches!(
            node.to_handle("/E"),
            Err(Error::InvalidHandleKind { .. })
        ));
    }

    #[test]
    fn mismatched_dataset_shape() {
        let node = Node::Dataset {
            attrs: [("unitSI".to_string(), Attr::Float(1.0))].into_iter().collect(),
            shape: vec![3, 3],
            values: Values::Floats(vec![0.0; 4]),
        };
        assert!(matches!(node.to_handle("/rho"), Err(Error::Shape(_))));
    }

    #[test]
    fn non_finite_values_survive_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard_cells.json");
        let data = array![f64::NAN, 1.5, f64::INFINITY, f64::NEG_INFINITY].into_dyn();
        let file = ContainerFile::new(
            Node::group().with_child("rho", Node::dataset(data).with_attr("unitSI", 1.0)),
        );
        file.save(&path).unwrap();

        let loaded = ContainerFile::open(&path).unwrap();
        match loaded.node("/rho").unwrap() {
            Node::Dataset {
                values: Values::Floats(v),
                ..
            } => {
                assert!(v[0].is_nan());
                assert_eq!(v[1..], [1.5, f64::INFINITY, f64::NEG_INFINITY]);
            }
            other => panic!("expected a float dataset, got {other:?}"),
        }
    }

    #[test]
    fn bad_non_finite_value() {
        let res = serde_json::from_str::<Values>(r#"[1.0, "lots"]"#);
        assert!(res.is_err());
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn hdf5_needs_feature() {
        let res = ContainerFile::open(Path::new("data00000100.h5"));
        assert!(matches!(res, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn paths() {
        let file = ContainerFile::new(
            Node::group()
                .with_attr("meshesPath", "fields/")
                .with_child("data", Node::group().with_child("500", Node::group())),
        );
        assert_eq!(file.base_path().unwrap(), "/data/500");
        assert_eq!(file.meshes_path().unwrap().as_deref(), Some("/data/500/fields/"));
        assert_eq!(file.particles_path().unwrap(), None);
        assert!(file.root.lookup("data/500").is_some());
        assert!(matches!(file.node("/data/600"), Err(Error::MissingNode(_))));
    }
}
