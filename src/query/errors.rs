#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::VertexId;

/// Convenience alias for query-building results.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Coarse error taxonomy every [`QueryError`] maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A singular traversal/attribute cannot be proven singular.
    Cardinality,
    /// Two handles do not share a common ancestor vertex.
    Ancestry,
    /// Unknown or ambiguous object/attribute/relation/column name.
    AttributeName,
    /// Operation applied to a handle kind that cannot support it.
    Type,
    /// Inconsistent values handed to a table-building call.
    Value,
    /// The query chain is malformed as written.
    Syntax,
    /// Operation not available for this handle kind.
    Unsupported,
    /// Options or schema could not be loaded.
    Config,
}

/// Errors raised synchronously by the call that violates the contract.
///
/// None of these are recoverable conditions: they describe a query chain
/// that has to be rewritten by the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("there is no singular `{object}` relative to `{relative_to}`, try using its plural `{plural}`")]
    NotSingular {
        object: String,
        relative_to: String,
        plural: String,
    },
    #[error("there is no path from `{from}` to `{to}`")]
    NoPath { from: String, to: String },
    #[error("cannot start a query with a single object `{object}`, use its plural `{plural}`")]
    SingularStart { object: String, plural: String },
    #[error("requested one `{attribute}` from `{object}` when `{object}` has several `{plural}`")]
    PluralOwner {
        attribute: String,
        object: String,
        plural: String,
    },
    #[error("{left} and {right} do not share a common ancestor, one must be derived from the other")]
    Disjoint { left: String, right: String },
    #[error("cannot combine handles built from different sessions")]
    DifferentSession,
    #[error("{wrt} is not an ancestor of {vertex}")]
    NotAncestor { wrt: VertexId, vertex: VertexId },
    #[error("vertex {vertex} was not issued by this graph")]
    UnknownVertex { vertex: VertexId },
    #[error("aligned queries share no common ancestor")]
    NoCommonAnchor,
    #[error("aligned queries have more than one deepest common ancestor: {candidates:?}")]
    AmbiguousAnchor { candidates: Vec<VertexId> },
    #[error("unknown name `{name}`{}", format_context(.object.as_deref(), .suggestion.as_deref()))]
    UnknownName {
        name: String,
        object: Option<String>,
        suggestion: Option<String>,
    },
    #[error("`{name}` is contained within more than one unrelated object {owners:?}, be specific")]
    AmbiguousName { name: String, owners: Vec<String> },
    #[error("`{object}` has no relation labelled `{label}`")]
    UnknownRelation { label: String, object: String },
    #[error("`{column}` is not a column of this table, columns are {columns:?}")]
    UnknownColumn { column: String, columns: Vec<String> },
    #[error("`{object}` has no attribute `id`, `name`, or `value` to compare with, choose a specific attribute")]
    NoComparableAttribute { object: String },
    #[error("`{object}` cannot be returned or identified since it defines no identity attribute, select an explicit attribute or use `*`")]
    NoDefaultAttribute { object: String },
    #[error("binary data product `{attribute}` cannot be operated upon since it is not stored in the database")]
    ProductArithmetic { attribute: String },
    #[error("cannot do arithmetic directly on object `{object}`, select one of its attributes first")]
    ObjectArithmetic { object: String },
    #[error("a filter predicate must be boolean, `{attribute}` is {found}")]
    NonBooleanMask { attribute: String, found: String },
    #[error("{operation} cannot be applied to a {found} handle")]
    WrongKind {
        operation: &'static str,
        found: &'static str,
    },
    #[error("cannot append columns {names:?} since both tables already define them, rename them with an explicit `(new_name, column)` item")]
    ColumnCollision { names: Vec<String> },
    #[error("cannot append columns of a table that does not share the same index object")]
    TableIndexMismatch,
    #[error("aligned queries must be all tables or all non-tables")]
    MixedTableItems,
    #[error("cannot mix filtering by id and building a table with attributes")]
    MixedIndexing,
    #[error("a table needs at least one column")]
    EmptyTable,
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("{operation} is not supported on a {found} handle")]
    Unsupported {
        operation: &'static str,
        found: &'static str,
    },
    #[error("failed to export query graph: {0}")]
    Export(String),
    #[error("configuration error{}: {message}", format_path(.path))]
    Config {
        path: Option<PathBuf>,
        message: String,
    },
}

fn format_context(object: Option<&str>, suggestion: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(object) = object {
        out.push_str(&format!(" on `{object}`"));
    }
    if let Some(suggestion) = suggestion {
        out.push_str(&format!(", did you mean `{suggestion}`?"));
    }
    out
}

fn format_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

impl QueryError {
    /// Builds an [`QueryError::UnknownName`] without a suggestion.
    pub fn unknown(name: impl Into<String>, object: Option<&str>) -> Self {
        QueryError::UnknownName {
            name: name.into(),
            object: object.map(str::to_owned),
            suggestion: None,
        }
    }

    /// Builds a [`QueryError::Config`] for the supplied path.
    pub fn config(path: Option<PathBuf>, message: impl fmt::Display) -> Self {
        QueryError::Config {
            path,
            message: message.to_string(),
        }
    }

    /// Attaches a suggestion to unknown-name errors; other variants pass through.
    pub fn with_suggestion(self, suggestion: Option<String>) -> Self {
        match self {
            QueryError::UnknownName { name, object, .. } => QueryError::UnknownName {
                name,
                object,
                suggestion,
            },
            other => other,
        }
    }

    /// Maps the variant onto the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::NotSingular { .. }
            | QueryError::NoPath { .. }
            | QueryError::SingularStart { .. }
            | QueryError::PluralOwner { .. } => ErrorKind::Cardinality,
            QueryError::Disjoint { .. }
            | QueryError::DifferentSession
            | QueryError::NotAncestor { .. }
            | QueryError::UnknownVertex { .. }
            | QueryError::NoCommonAnchor
            | QueryError::AmbiguousAnchor { .. } => ErrorKind::Ancestry,
            QueryError::UnknownName { .. }
            | QueryError::AmbiguousName { .. }
            | QueryError::UnknownRelation { .. }
            | QueryError::UnknownColumn { .. }
            | QueryError::NoComparableAttribute { .. } => ErrorKind::AttributeName,
            QueryError::ProductArithmetic { .. }
            | QueryError::ObjectArithmetic { .. }
            | QueryError::NonBooleanMask { .. }
            | QueryError::WrongKind { .. } => ErrorKind::Type,
            QueryError::ColumnCollision { .. }
            | QueryError::TableIndexMismatch
            | QueryError::MixedTableItems
            | QueryError::EmptyTable
            | QueryError::InvalidPattern { .. }
            | QueryError::Export(_) => ErrorKind::Value,
            QueryError::NoDefaultAttribute { .. } | QueryError::MixedIndexing => ErrorKind::Syntax,
            QueryError::Unsupported { .. } => ErrorKind::Unsupported,
            QueryError::Config { .. } => ErrorKind::Config,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NotSingular { .. } => "NotSingular",
            QueryError::NoPath { .. } => "NoPath",
            QueryError::SingularStart { .. } => "SingularStart",
            QueryError::PluralOwner { .. } => "PluralOwner",
            QueryError::Disjoint { .. } => "Disjoint",
            QueryError::DifferentSession => "DifferentSession",
            QueryError::NotAncestor { .. } => "NotAncestor",
            QueryError::UnknownVertex { .. } => "UnknownVertex",
            QueryError::NoCommonAnchor => "NoCommonAnchor",
            QueryError::AmbiguousAnchor { .. } => "AmbiguousAnchor",
            QueryError::UnknownName { .. } => "UnknownName",
            QueryError::AmbiguousName { .. } => "AmbiguousName",
            QueryError::UnknownRelation { .. } => "UnknownRelation",
            QueryError::UnknownColumn { .. } => "UnknownColumn",
            QueryError::NoComparableAttribute { .. } => "NoComparableAttribute",
            QueryError::NoDefaultAttribute { .. } => "NoDefaultAttribute",
            QueryError::ProductArithmetic { .. } => "ProductArithmetic",
            QueryError::ObjectArithmetic { .. } => "ObjectArithmetic",
            QueryError::NonBooleanMask { .. } => "NonBooleanMask",
            QueryError::WrongKind { .. } => "WrongKind",
            QueryError::ColumnCollision { .. } => "ColumnCollision",
            QueryError::TableIndexMismatch => "TableIndexMismatch",
            QueryError::MixedTableItems => "MixedTableItems",
            QueryError::MixedIndexing => "MixedIndexing",
            QueryError::EmptyTable => "EmptyTable",
            QueryError::InvalidPattern { .. } => "InvalidPattern",
            QueryError::Unsupported { .. } => "Unsupported",
            QueryError::Export(_) => "Export",
            QueryError::Config { .. } => "Config",
        }
    }
}

/// Convenience wrapper that formats query errors with their codes.
pub struct QueryErrorWithCode<'a>(pub &'a QueryError);

impl fmt::Display for QueryErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
