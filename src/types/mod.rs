#![forbid(unsafe_code)]

//! Identifier newtypes shared by the query graph and the handle arena.

use std::fmt;

use serde::Serialize;

/// Index of one deferred operation inside a [`QueryGraph`](crate::query::graph::QueryGraph).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct VertexId(pub u32);

/// Index of one handle inside a [`Session`](crate::query::session::Session)'s handle arena.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct HandleId(pub u32);

/// Process-unique identifier of a query-building session.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SessionId(pub u64);

impl VertexId {
    /// The start vertex every graph is created with.
    pub const START: VertexId = VertexId(0);

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl HandleId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VertexId {
    fn from(value: u32) -> Self {
        VertexId(value)
    }
}

impl From<VertexId> for u32 {
    fn from(value: VertexId) -> Self {
        value.0
    }
}

impl From<u32> for HandleId {
    fn from(value: u32) -> Self {
        HandleId(value)
    }
}

impl From<HandleId> for u32 {
    fn from(value: HandleId) -> Self {
        value.0
    }
}
