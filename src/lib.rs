//! Chainable, lazily evaluated graph queries with cardinality tracking.
//!
//! A [`Session`] hands out immutable [`QueryHandle`]s. Each call on a handle
//! appends deferred operations to one shared graph and records whether the
//! result is singular relative to its ancestors, so tables built from
//! several handles know which columns are collected per row.

#![warn(missing_docs)]

pub mod query;
pub mod types;

pub use query::{
    AggregateFn, AlignItem, AlignedQuery, ErrorKind, GraphBuilder, InMemorySchema, Operand, PathResolver,
    QueryError, QueryGraph, QueryHandle, QueryKind, QueryOptions, Result, Session, TableItem, TableValue, Value,
    ValueKind,
};
