//! Session options, loadable from TOML.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::query::errors::{QueryError, Result};

/// Options shared by every handle of a session.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QueryOptions {
    /// Attribute used for identity lookups when the schema declares none.
    pub identity_attribute: String,
    /// Second candidate for object equality and default attributes.
    pub name_attribute: String,
    /// Last candidate for object equality and default attributes.
    pub value_attribute: String,
    /// Relationship property holding the label matched by relative traversals.
    pub relation_label_key: String,
    /// Prefix of generated parameter names.
    pub parameter_prefix: String,
    /// Maximum edit distance for "did you mean" suggestions.
    pub suggestion_distance: usize,
    /// Advisory row limit recorded for the external executor.
    pub default_limit: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            identity_attribute: "id".to_owned(),
            name_attribute: "name".to_owned(),
            value_attribute: "value".to_owned(),
            relation_label_key: "relation_id".to_owned(),
            parameter_prefix: "param".to_owned(),
            suggestion_distance: 2,
            default_limit: Some(1000),
        }
    }
}

impl QueryOptions {
    /// Parses options from a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| QueryError::config(None, err))
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|err| QueryError::config(Some(path.into()), err))?;
        toml::from_str(&contents).map_err(|err| QueryError::config(Some(path.into()), err))
    }

    /// Candidate attributes for object equality, in priority order.
    pub fn comparison_candidates(&self) -> [&str; 3] {
        [
            self.identity_attribute.as_str(),
            self.name_attribute.as_str(),
            self.value_attribute.as_str(),
        ]
    }
}
