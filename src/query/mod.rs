#![forbid(unsafe_code)]

//! Lazy query building over a shared operation graph.
//!
//! Handles are created from a [`Session`] and chained by traversing to
//! related objects, selecting attributes, combining them with operators and
//! assembling tables. Nothing runs against a database here: every call
//! appends vertices to the session's graph and returns a new immutable
//! handle describing what was built and its cardinality.

/// Folding attributes onto an ancestor (count, sum, mean, ...).
pub mod aggregate;

/// Tables built from handles aligned on a common ancestor.
pub mod align;

/// Operators on attribute handles.
pub mod attribute;

/// Error types and result aliases for query building.
pub mod errors;

/// Append-only operation graph and the builder trait handles call into.
pub mod graph;

/// Schema facts: object types, attributes, relations and path cardinality.
pub mod metadata;

/// Column-name deduplication, pattern detection and value-kind coercion.
pub mod naming;

/// Traversals and attribute selection on object handles.
pub mod object;

/// Session configuration.
pub mod options;

/// Entry-point operations on the root handle.
pub mod root;

/// Sessions, handles and their arena.
pub mod session;

/// Table assembly, column lookup and concatenation.
pub mod table;

/// Literal values registered as graph parameters.
pub mod value;

pub use aggregate::AggregateFn;
pub use align::{AlignItem, AlignedQuery};
pub use attribute::Operand;
pub use errors::{ErrorKind, QueryError, Result};
pub use graph::{GraphBuilder, QueryGraph, Vertex, VertexOp};
pub use metadata::{InMemorySchema, NameKind, Owner, Path, PathResolver, Relation};
pub use options::QueryOptions;
pub use session::{QueryHandle, QueryKind, QueryRecord, Session};
pub use table::TableItem;
pub use value::{TableValue, Value, ValueKind};
