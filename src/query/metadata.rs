//! Schema resolution bridging human-readable names to object types, paths, and
//! their declared multiplicity.
//!
//! Query handles never hard-code schema facts: every traversal, attribute
//! lookup and cardinality decision is delegated to a [`PathResolver`]. The
//! [`InMemorySchema`] provided here is enough for tests, prototyping, and
//! callers whose schema catalogue is small enough to load from TOML.

use std::collections::VecDeque;
use std::fs;
use std::path::Path as FsPath;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::query::errors::{QueryError, Result};
use crate::query::value::ValueKind;

/// One step between two object types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Hop {
    /// Object type the hop starts from.
    pub from: String,
    /// Object type the hop arrives at.
    pub to: String,
    /// Relation label stored on the edge, if any.
    pub label: Option<String>,
    /// Whether each `from` has at most one `to` along this hop.
    pub single: bool,
}

/// Ordered hops connecting two object types.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Path {
    /// Hops in traversal order.
    pub hops: Vec<Hop>,
}

impl Path {
    /// True iff every hop is singular (the empty path is singular).
    pub fn is_singular(&self) -> bool {
        self.hops.iter().all(|hop| hop.single)
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Whether the path stays on the same object type.
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

/// Object type that owns an attribute, relative to where it was requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    /// Owning object type.
    pub object_type: String,
    /// Whether the owner is singular relative to the requesting type.
    pub object_is_singular: bool,
    /// Whether the attribute was requested in its singular form.
    pub attribute_is_singular: bool,
}

/// Labelled relation chosen by [`PathResolver::relation_by_label`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// Object type reached by the relation.
    pub target: String,
    /// Path that ends on the labelled edge.
    pub path: Path,
}

/// What a bare name refers to, resolved in a fixed priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameKind {
    /// An attribute declared on some object type.
    Attribute,
    /// An object type, written in singular or plural form.
    ObjectType {
        /// Canonical (singular) object type name.
        object_type: String,
        /// Whether the name was written in its singular form.
        singular: bool,
    },
    /// A relation label and the object types it starts from.
    Relation {
        /// Object types owning an edge with this label.
        owners: Vec<String>,
    },
    /// Nothing in the schema carries this name.
    Unknown,
}

/// Schema catalogue consumed by query handles.
pub trait PathResolver: Send + Sync {
    /// Resolves the path from `from` to `to` and whether it is singular. When
    /// `want_single` is set, singular-only paths are preferred.
    fn path_and_cardinality(&self, from: &str, to: &str, want_single: bool) -> Result<(Path, bool)>;
    /// Singular form of an object, attribute, or relation name.
    fn singular_name(&self, name: &str) -> String;
    /// Plural form of an object type.
    fn plural_name(&self, object_type: &str) -> String;
    /// Whether `name` is written in its singular form.
    fn is_singular_name(&self, name: &str) -> bool;
    /// Finds the object type owning `attribute`, relative to `from`.
    fn owning_object_type(&self, from: Option<&str>, attribute: &str) -> Result<Owner>;
    /// Attributes declared directly on `object_type`, in declaration order.
    fn attributes_of(&self, object_type: &str) -> Result<Vec<String>>;
    /// Whether `name` on `object_type` holds an opaque binary payload.
    fn is_product_attribute(&self, name: &str, object_type: &str) -> bool;
    /// Declared value kind of an attribute, if any.
    fn attribute_kind(&self, object_type: &str, name: &str) -> Option<ValueKind>;
    /// Identity attribute of `object_type`, if it declares one.
    fn identity_attribute(&self, object_type: &str) -> Option<String>;
    /// Resolves a relation label starting at `object_type`.
    fn relation_by_label(&self, object_type: &str, label: &str) -> Result<Relation>;
    /// Classifies a bare name as attribute, object type, or relation label.
    fn classify(&self, name: &str) -> NameKind;
    /// All object types, in declaration order.
    fn object_types(&self) -> Vec<String>;
    /// Every name the schema knows, used for suggestions.
    fn known_names(&self) -> Vec<String>;
}

/// Serializable description of an object type.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ObjectDef {
    /// Singular object type name.
    pub name: String,
    /// Plural name; defaults to `<name>s`.
    #[serde(default)]
    pub plural: Option<String>,
    /// Identity attribute, if the type is addressable by id.
    #[serde(default)]
    pub identity: Option<String>,
    /// Attributes declared on the type.
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
}

/// Serializable description of one attribute.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AttributeDef {
    /// Attribute name (singular form).
    pub name: String,
    /// Declared value kind.
    #[serde(default)]
    pub kind: Option<ValueKind>,
    /// Whether the attribute is a binary payload.
    #[serde(default)]
    pub product: bool,
}

/// Serializable description of a relation between two object types.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RelationDef {
    /// Source object type.
    pub from: String,
    /// Target object type.
    pub to: String,
    /// Each `from` has at most one `to`.
    pub single: bool,
    /// Each `to` has at most one `from`; `None` adds no reverse edge.
    #[serde(default)]
    pub reverse_single: Option<bool>,
    /// Relation label stored on the forward edge.
    #[serde(default)]
    pub label: Option<String>,
}

/// Full schema document, loadable from TOML.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SchemaDef {
    /// Object types.
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
    /// Relations between object types.
    #[serde(default)]
    pub relations: Vec<RelationDef>,
}

#[derive(Clone, Debug)]
struct Edge {
    from: String,
    to: String,
    single: bool,
    label: Option<String>,
}

#[derive(Clone, Debug)]
struct ObjectEntry {
    plural: String,
    identity: Option<String>,
    attributes: Vec<AttributeDef>,
}

/// In-memory path resolver used for tests or prototyping.
#[derive(Clone, Debug, Default)]
pub struct InMemorySchema {
    order: Vec<String>,
    objects: FxHashMap<String, ObjectEntry>,
    plural_objects: FxHashMap<String, String>,
    plural_forms: FxHashMap<String, String>,
    edges: Vec<Edge>,
}

impl InMemorySchema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from its serializable description.
    pub fn from_def(def: SchemaDef) -> Self {
        let mut schema = Self::new();
        for object in def.objects {
            let plural = object.plural.unwrap_or_else(|| format!("{}s", object.name));
            schema = schema.with_object_plural(&object.name, &plural);
            if let Some(identity) = object.identity {
                schema = schema.with_identity(&object.name, &identity);
            }
            for attr in object.attributes {
                schema = schema.with_attribute_def(&object.name, attr);
            }
        }
        for rel in def.relations {
            schema.push_edge(&rel.from, &rel.to, rel.single, rel.label.clone());
            if let Some(reverse) = rel.reverse_single {
                schema.push_edge(&rel.to, &rel.from, reverse, None);
            }
        }
        schema
    }

    /// Parses a TOML schema document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let def: SchemaDef = toml::from_str(source).map_err(|err| QueryError::config(None, err))?;
        Ok(Self::from_def(def))
    }

    /// Reads a TOML schema document from disk.
    pub fn load(path: impl AsRef<FsPath>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|err| QueryError::config(Some(path.into()), err))?;
        let def: SchemaDef =
            toml::from_str(&contents).map_err(|err| QueryError::config(Some(path.into()), err))?;
        Ok(Self::from_def(def))
    }

    /// Registers an object type whose plural is `<name>s`.
    pub fn with_object(self, name: &str) -> Self {
        let plural = format!("{name}s");
        self.with_object_plural(name, &plural)
    }

    /// Registers an object type with an explicit plural name.
    pub fn with_object_plural(mut self, name: &str, plural: &str) -> Self {
        if !self.objects.contains_key(name) {
            self.order.push(name.to_owned());
        }
        self.objects.insert(
            name.to_owned(),
            ObjectEntry {
                plural: plural.to_owned(),
                identity: None,
                attributes: Vec::new(),
            },
        );
        self.plural_objects.insert(plural.to_owned(), name.to_owned());
        self
    }

    /// Declares the identity attribute of an object type, registering it as
    /// an integer attribute if it is not already declared.
    pub fn with_identity(mut self, object: &str, attribute: &str) -> Self {
        let declared = self
            .objects
            .get(object)
            .map(|entry| entry.attributes.iter().any(|a| a.name == attribute))
            .unwrap_or(false);
        if !declared {
            self = self.with_attribute(object, attribute, Some(ValueKind::Integer));
        }
        if let Some(entry) = self.objects.get_mut(object) {
            entry.identity = Some(attribute.to_owned());
        }
        self
    }

    /// Declares a scalar attribute.
    pub fn with_attribute(self, object: &str, name: &str, kind: Option<ValueKind>) -> Self {
        self.with_attribute_def(
            object,
            AttributeDef {
                name: name.to_owned(),
                kind,
                product: false,
            },
        )
    }

    /// Declares a binary payload attribute.
    pub fn with_product(self, object: &str, name: &str) -> Self {
        self.with_attribute_def(
            object,
            AttributeDef {
                name: name.to_owned(),
                kind: None,
                product: true,
            },
        )
    }

    fn with_attribute_def(mut self, object: &str, attr: AttributeDef) -> Self {
        let plural = format!("{}s", attr.name);
        if let Some(entry) = self.objects.get_mut(object) {
            self.plural_forms.entry(plural).or_insert_with(|| attr.name.clone());
            entry.attributes.push(attr);
        }
        self
    }

    /// Declares a relation and its reverse. `single` is the multiplicity of
    /// `to` per `from`, `reverse_single` the multiplicity of `from` per `to`.
    pub fn with_relation(mut self, from: &str, to: &str, single: bool, reverse_single: bool) -> Self {
        self.push_edge(from, to, single, None);
        self.push_edge(to, from, reverse_single, None);
        self
    }

    /// Declares a labelled one-way relation, e.g. a self relation between
    /// two spectra of the same object.
    pub fn with_labelled_relation(mut self, from: &str, to: &str, label: &str, single: bool) -> Self {
        self.plural_forms
            .entry(format!("{label}s"))
            .or_insert_with(|| label.to_owned());
        self.push_edge(from, to, single, Some(label.to_owned()));
        self
    }

    fn push_edge(&mut self, from: &str, to: &str, single: bool, label: Option<String>) {
        self.edges.push(Edge {
            from: from.to_owned(),
            to: to.to_owned(),
            single,
            label,
        });
    }

    fn canonical_object(&self, name: &str) -> Option<(String, bool)> {
        if self.objects.contains_key(name) {
            return Some((name.to_owned(), true));
        }
        self.plural_objects
            .get(name)
            .map(|singular| (singular.clone(), false))
    }

    fn attribute_owners(&self, attribute: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                self.objects[name.as_str()]
                    .attributes
                    .iter()
                    .any(|a| a.name == attribute)
            })
            .cloned()
            .collect()
    }

    fn attribute(&self, object: &str, name: &str) -> Option<&AttributeDef> {
        self.objects
            .get(object)
            .and_then(|entry| entry.attributes.iter().find(|a| a.name == name))
    }

    fn search(&self, from: &str, to: &str, singular_only: bool) -> Option<Path> {
        if from == to {
            return Some(Path::default());
        }
        let mut previous: FxHashMap<&str, usize> = FxHashMap::default();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut queue = VecDeque::new();
        seen.insert(from);
        queue.push_back(from);
        while let Some(current) = queue.pop_front() {
            for (idx, edge) in self.edges.iter().enumerate() {
                if edge.from != current || (singular_only && !edge.single) {
                    continue;
                }
                if !seen.insert(edge.to.as_str()) {
                    continue;
                }
                previous.insert(edge.to.as_str(), idx);
                if edge.to == to {
                    return Some(self.unwind_path(&previous, from, to));
                }
                queue.push_back(edge.to.as_str());
            }
        }
        None
    }

    fn unwind_path(&self, previous: &FxHashMap<&str, usize>, from: &str, to: &str) -> Path {
        let mut hops = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let edge = &self.edges[previous[cursor]];
            hops.push(Hop {
                from: edge.from.clone(),
                to: edge.to.clone(),
                label: edge.label.clone(),
                single: edge.single,
            });
            cursor = edge.from.as_str();
        }
        hops.reverse();
        Path { hops }
    }

    fn has_path(&self, from: &str, to: &str, singular_only: bool) -> bool {
        self.search(from, to, singular_only).is_some()
    }
}

impl PathResolver for InMemorySchema {
    fn path_and_cardinality(&self, from: &str, to: &str, want_single: bool) -> Result<(Path, bool)> {
        if want_single {
            if let Some(path) = self.search(from, to, true) {
                return Ok((path, true));
            }
        }
        let path = self
            .search(from, to, false)
            .ok_or_else(|| QueryError::NoPath {
                from: from.to_owned(),
                to: to.to_owned(),
            })?;
        let single = path.is_singular();
        Ok((path, single))
    }

    fn singular_name(&self, name: &str) -> String {
        if let Some(singular) = self.plural_objects.get(name) {
            return singular.clone();
        }
        if self.objects.contains_key(name) {
            return name.to_owned();
        }
        self.plural_forms
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_owned())
    }

    fn plural_name(&self, object_type: &str) -> String {
        match self.canonical_object(object_type) {
            Some((singular, _)) => self.objects[singular.as_str()].plural.clone(),
            None => format!("{object_type}s"),
        }
    }

    fn is_singular_name(&self, name: &str) -> bool {
        self.singular_name(name) == name
    }

    fn owning_object_type(&self, from: Option<&str>, attribute: &str) -> Result<Owner> {
        let single_name = self.singular_name(attribute);
        let attribute_is_singular = single_name == attribute;
        let owners = self.attribute_owners(&single_name);
        if owners.is_empty() {
            return Err(QueryError::unknown(attribute, from));
        }
        if let Some(from) = from {
            if owners.iter().any(|o| o == from) {
                return Ok(Owner {
                    object_type: from.to_owned(),
                    object_is_singular: true,
                    attribute_is_singular,
                });
            }
        }
        let reachable = |singular_only: bool| -> Vec<String> {
            owners
                .iter()
                .filter(|owner| match from {
                    Some(from) => self.has_path(from, owner, singular_only),
                    None => true,
                })
                .cloned()
                .collect()
        };
        let mut candidates = reachable(true);
        if candidates.is_empty() {
            candidates = reachable(false);
        }
        let object_type = match candidates.len() {
            0 => {
                return Err(QueryError::NoPath {
                    from: from.unwrap_or("start").to_owned(),
                    to: single_name,
                })
            }
            1 => candidates.remove(0),
            _ => {
                return Err(QueryError::AmbiguousName {
                    name: single_name,
                    owners: candidates,
                })
            }
        };
        let Some(from) = from else {
            return Ok(Owner {
                object_type,
                object_is_singular: true,
                attribute_is_singular: false,
            });
        };
        let (_, object_is_singular) = self.path_and_cardinality(from, &object_type, false)?;
        if !object_is_singular && attribute_is_singular {
            return Err(QueryError::PluralOwner {
                attribute: single_name,
                object: from.to_owned(),
                plural: self.plural_name(&object_type),
            });
        }
        Ok(Owner {
            object_type,
            object_is_singular,
            attribute_is_singular,
        })
    }

    fn attributes_of(&self, object_type: &str) -> Result<Vec<String>> {
        let (singular, _) = self
            .canonical_object(object_type)
            .ok_or_else(|| QueryError::unknown(object_type, None))?;
        Ok(self.objects[singular.as_str()]
            .attributes
            .iter()
            .map(|a| a.name.clone())
            .collect())
    }

    fn is_product_attribute(&self, name: &str, object_type: &str) -> bool {
        let singular = self.singular_name(name);
        self.attribute(object_type, &singular)
            .map(|a| a.product)
            .unwrap_or(false)
    }

    fn attribute_kind(&self, object_type: &str, name: &str) -> Option<ValueKind> {
        self.attribute(object_type, name).and_then(|a| a.kind)
    }

    fn identity_attribute(&self, object_type: &str) -> Option<String> {
        self.objects
            .get(object_type)
            .and_then(|entry| entry.identity.clone())
    }

    fn relation_by_label(&self, object_type: &str, label: &str) -> Result<Relation> {
        let label = self.singular_name(label);
        let edge = self
            .edges
            .iter()
            .find(|e| e.from == object_type && e.label.as_deref() == Some(label.as_str()))
            .ok_or_else(|| QueryError::UnknownRelation {
                label: label.clone(),
                object: object_type.to_owned(),
            })?;
        Ok(Relation {
            target: edge.to.clone(),
            path: Path {
                hops: vec![Hop {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    label: edge.label.clone(),
                    single: edge.single,
                }],
            },
        })
    }

    fn classify(&self, name: &str) -> NameKind {
        let singular = self.singular_name(name);
        if !self.attribute_owners(&singular).is_empty() {
            return NameKind::Attribute;
        }
        if let Some((object_type, singular)) = self.canonical_object(name) {
            return NameKind::ObjectType {
                object_type,
                singular,
            };
        }
        let mut owners: Vec<String> = self
            .edges
            .iter()
            .filter(|e| e.label.as_deref() == Some(singular.as_str()))
            .map(|e| e.from.clone())
            .collect();
        if owners.is_empty() {
            return NameKind::Unknown;
        }
        owners.dedup();
        NameKind::Relation { owners }
    }

    fn object_types(&self) -> Vec<String> {
        self.order.clone()
    }

    fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in &self.order {
            let entry = &self.objects[name.as_str()];
            names.push(name.clone());
            names.push(entry.plural.clone());
            names.extend(entry.attributes.iter().map(|a| a.name.clone()));
        }
        names.extend(self.plural_forms.keys().cloned());
        names.extend(self.edges.iter().filter_map(|e| e.label.clone()));
        names.sort();
        names.dedup();
        names
    }
}
