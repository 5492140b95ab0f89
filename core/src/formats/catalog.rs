use std::collections::HashSet;

use get_size::GetSize;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::common::indexed_vec::IndexedVec;
use crate::geom::Geometry;

/// Backend specific vocabulary of names that aren't worth listing.
#[derive(Debug)]
pub struct Denylist {
    /// Mesh keys dropped as-is.
    pub field_keys: HashSet<&'static str>,
    /// Mesh keys starting with any of these are dropped.
    pub field_prefixes: &'static [&'static str],
    /// A mesh key ending in one of these is a component of a vector field.
    pub vector_suffixes: &'static [&'static str],
    /// Particle keys dropped as-is, compared before `species_prefix` is removed.
    pub particle_keys: HashSet<&'static str>,
    pub particle_prefixes: &'static [&'static str],
    /// Stripped from every particle key that survives filtering.
    pub species_prefix: &'static str,
}

impl Denylist {
    fn drops_field(&self, key: &str) -> bool {
        self.field_keys.contains(key) || self.field_prefixes.iter().any(|p| key.starts_with(p))
    }

    fn drops_particle(&self, key: &str) -> bool {
        self.particle_keys.contains(key)
            || self.particle_prefixes.iter().any(|p| key.starts_with(p))
    }

    fn vector_component<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str)> {
        self.vector_suffixes.iter().find_map(|suffix| {
            let base = key.strip_suffix(suffix)?;
            Some((base, suffix.trim_start_matches('_')))
        })
    }
}

/// Container files list their records directly, there's little to filter.
pub static CONTAINER_DENYLIST: Lazy<Denylist> = Lazy::new(|| Denylist {
    field_keys: HashSet::new(),
    field_prefixes: &[],
    vector_suffixes: &["_x", "_y", "_z", "_r", "_t"],
    particle_keys: HashSet::new(),
    // Folded into the positions when reading
    particle_prefixes: &["positionOffset_"],
    species_prefix: "",
});

/// The dataset abstraction lists plenty of derived and duplicated fields.
pub static DATASET_DENYLIST: Lazy<Denylist> = Lazy::new(|| Denylist {
    // `Bx` and friends duplicate `B_x`
    field_keys: [
        "cell_volume",
        "dx",
        "dy",
        "dz",
        "x",
        "y",
        "z",
        "Bx",
        "By",
        "Bz",
        "Ex",
        "Ey",
        "Ez",
        "Jx",
        "Jy",
        "Jz",
    ]
    .into_iter()
    .collect(),
    field_prefixes: &[
        "current_",
        "electric_",
        "magnetic_",
        "path_element_",
        "relative_magnetic_",
        "vertex_",
    ],
    vector_suffixes: &["_x", "_y", "_z"],
    particle_keys: [
        "particle_position",
        "mesh_id",
        "particle_ones",
        "particle_weight",
        "particle_radius",
    ]
    .into_iter()
    .collect(),
    particle_prefixes: &[
        "relative_particle_",
        "particle_position_relative",
        "particle_positionCoarse_",
        "particle_positionOffset_",
        "particle_spherical_position_",
        "particle_position_spherical_",
        "particle_position_cylindrical",
        "particle_velocity",
        "particle_cylindrical",
    ],
    species_prefix: "particle_",
});

/// Standard record components and their short names, in the order the
/// short names get appended.
const CANONICAL_NAMES: [(&str, &str); 7] = [
    ("position_x", "x"),
    ("position_y", "y"),
    ("position_z", "z"),
    ("momentum_x", "ux"),
    ("momentum_y", "uy"),
    ("momentum_z", "uz"),
    ("weighting", "w"),
];

/// The record component behind a short name, e.g. `ux` -> `momentum_x`.
/// Other names are returned unchanged.
pub fn raw_component_name(canonical: &str) -> &str {
    CANONICAL_NAMES
        .iter()
        .find(|(_, short)| *short == canonical)
        .map_or(canonical, |(raw, _)| raw)
}

/// Replaces standard record components by their short names.
///
/// Everything without a short name keeps its relative order; the short
/// names are appended at the end, in the order of [`CANONICAL_NAMES`].
pub fn canonicalize(components: Vec<String>) -> Vec<String> {
    let is_standard = |c: &str| CANONICAL_NAMES.iter().any(|(raw, _)| *raw == c);

    let present = CANONICAL_NAMES
        .iter()
        .filter(|(raw, _)| components.iter().any(|c| c == raw))
        .map(|(_, short)| short.to_string())
        .collect::<Vec<_>>();

    let mut out = components
        .into_iter()
        .filter(|c| !is_standard(c))
        .collect::<Vec<_>>();
    out.extend(present);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Scalar,
    Vector,
}

impl GetSize for RecordKind {}

/// A mesh key as reported by a backend, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub key: String,
    pub geometry: Geometry,
    pub axis_labels: Vec<String>,
    pub avail_circ_modes: Vec<u32>,
}

/// Everything a backend found in one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub fields: Vec<RawField>,
    /// Species name and its raw record component keys.
    pub species: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, GetSize)]
pub struct QuantityDescriptor {
    pub name: String,
    pub kind: RecordKind,
    pub geometry: Geometry,
    pub axis_labels: Vec<String>,
    pub avail_circ_modes: Vec<u32>,
    /// Components of a vector field (`x`, `y`, `r`, ...), empty for scalars.
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, GetSize)]
pub struct SpeciesRecords {
    pub name: String,
    pub components: Vec<String>,
}

/// Fields and particle species available in one file.
#[derive(Debug, Clone, Default, PartialEq, GetSize)]
pub struct Catalog {
    fields: IndexedVec<String, QuantityDescriptor>,
    species: IndexedVec<String, SpeciesRecords>,
}

impl Catalog {
    #[instrument(skip_all)]
    pub fn build(listing: Listing, denylist: &Denylist) -> Self {
        let mut fields = IndexedVec::<String, QuantityDescriptor>::new();

        for raw in listing.fields {
            if denylist.drops_field(&raw.key) {
                continue;
            }

            let (name, kind, component) = match denylist.vector_component(&raw.key) {
                Some((base, component)) => (base.to_string(), RecordKind::Vector, Some(component)),
                None => (raw.key.clone(), RecordKind::Scalar, None),
            };

            if let Some(existing) = fields.get_mut(&name) {
                if let (RecordKind::Vector, Some(component)) = (existing.kind, component) {
                    existing.components.push(component.to_string());
                }
                continue;
            }

            let descriptor = QuantityDescriptor {
                name: name.clone(),
                kind,
                geometry: raw.geometry,
                axis_labels: raw.axis_labels,
                avail_circ_modes: raw.avail_circ_modes,
                components: component.into_iter().map(str::to_string).collect(),
            };
            fields.insert(name, descriptor);
        }

        let mut species = IndexedVec::new();
        for (name, keys) in listing.species {
            let components = keys
                .into_iter()
                .filter(|key| !denylist.drops_particle(key))
                .map(|key| match key.strip_prefix(denylist.species_prefix) {
                    Some(stripped) => stripped.to_string(),
                    None => key,
                })
                .collect();
            let records = SpeciesRecords {
                name: name.clone(),
                components: canonicalize(components),
            };
            species.insert(name, records);
        }

        let catalog = Self { fields, species };
        if catalog.fields.is_empty() {
            debug!("No mesh records found");
        }
        if catalog.species.is_empty() {
            debug!("No particle species found");
        }
        debug!(heap_size = catalog.get_heap_size(), "Built catalog");

        catalog
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.species.is_empty()
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn has_species(&self) -> bool {
        !self.species.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &QuantityDescriptor> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&QuantityDescriptor> {
        self.fields.get(&name.to_string())
    }

    pub fn first_field(&self) -> Option<&QuantityDescriptor> {
        self.fields.first().map(|(_, v)| v)
    }

    pub fn species(&self) -> impl Iterator<Item = &SpeciesRecords> {
        self.species.values()
    }

    pub fn species_names(&self) -> impl Iterator<Item = &str> {
        self.species.keys().map(String::as_str)
    }

    pub fn species_components(&self, species: &str) -> Option<&[String]> {
        self.species
            .get(&species.to_string())
            .map(|s| s.components.as_slice())
    }

    /// Geometry of the first field, which all fields of a file share.
    pub fn geometry(&self) -> Option<Geometry> {
        self.first_field().map(|f| f.geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn mesh(key: &str) -> RawField {
        RawField {
            key: key.to_string(),
            geometry: Geometry::Cartesian3D,
            axis_labels: strings(&["x", "y", "z"]),
            avail_circ_modes: vec![],
        }
    }

    #[test]
    fn canonical_names_go_to_the_end() {
        let out = canonicalize(strings(&[
            "position_x",
            "position_y",
            "momentum_z",
            "weighting",
            "custom_q",
        ]));
        assert_eq!(out, ["custom_q", "x", "y", "uz", "w"]);
    }

    #[test]
    fn canonical_tail_uses_fixed_order() {
        let out = canonicalize(strings(&["weighting", "charge", "momentum_x", "position_z"]));
        assert_eq!(out, ["charge", "z", "ux", "w"]);
    }

    #[test]
    fn raw_names() {
        assert_eq!(raw_component_name("ux"), "momentum_x");
        assert_eq!(raw_component_name("w"), "weighting");
        assert_eq!(raw_component_name("charge"), "charge");
    }

    #[test]
    fn vector_fields_are_coalesced() {
        let listing = Listing {
            fields: ["B_x", "B_y", "B_z", "rho", "Bx", "cell_volume", "magnetic_field_x"]
                .into_iter()
                .map(mesh)
                .collect(),
            species: vec![],
        };
        let catalog = Catalog::build(listing, &DATASET_DENYLIST);

        let names = catalog.fields().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["B", "rho"]);

        let b = catalog.field("B").unwrap();
        assert_eq!(b.kind, RecordKind::Vector);
        assert_eq!(b.components, ["x", "y", "z"]);
        assert_eq!(catalog.field("rho").unwrap().kind, RecordKind::Scalar);
        assert!(!catalog.has_species());
    }

    #[test]
    fn dataset_species() {
        let listing = Listing {
            fields: vec![],
            species: vec![(
                "electrons".to_string(),
                strings(&[
                    "particle_charge",
                    "particle_momentum_x",
                    "particle_position",
                    "particle_position_relative_x",
                    "particle_position_x",
                    "particle_velocity_x",
                    "particle_weighting",
                    "mesh_id",
                ]),
            )],
        };
        let catalog = Catalog::build(listing, &DATASET_DENYLIST);

        assert_eq!(
            catalog.species_components("electrons").unwrap(),
            ["charge", "x", "ux", "w"]
        );
        assert!(!catalog.has_fields());
    }

    #[test]
    fn container_species() {
        let listing = Listing {
            fields: vec![],
            species: vec![(
                "ions".to_string(),
                strings(&[
                    "charge",
                    "mass",
                    "momentum_x",
                    "position_x",
                    "positionOffset_x",
                    "weighting",
                ]),
            )],
        };
        let catalog = Catalog::build(listing, &CONTAINER_DENYLIST);

        assert_eq!(
            catalog.species_components("ions").unwrap(),
            ["charge", "mass", "x", "ux", "w"]
        );
    }

    #[test]
    fn empty_listing() {
        let catalog = Catalog::build(Listing::default(), &CONTAINER_DENYLIST);
        assert!(catalog.is_empty());
        assert_eq!(catalog.geometry(), None);
        assert_eq!(catalog.species_components("electrons"), None);
    }
}
