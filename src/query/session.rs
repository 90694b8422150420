//! Query-building sessions and the immutable handles they hand out.
//!
//! A [`Session`] owns the shared [`GraphBuilder`] and an arena of
//! [`QueryRecord`]s. Every [`QueryHandle`] borrows its session, so the graph
//! outlives all handles built on it, and lineage is a plain index into the
//! arena.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::query::errors::{QueryError, Result};
use crate::query::graph::{GraphBuilder, QueryGraph};
use crate::query::metadata::PathResolver;
use crate::query::naming;
use crate::query::options::QueryOptions;
use crate::query::value::{Value, ValueKind};
use crate::types::{HandleId, SessionId, VertexId};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Variant-specific state of a handle.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryKind {
    /// Entry point with no object type bound yet.
    Root,
    /// Graph objects of one type.
    Object,
    /// Rows of a caller-supplied in-memory table.
    TableVariable {
        /// Columns available for selection.
        columns: Vec<String>,
    },
    /// A scalar or column value.
    Attribute {
        /// Logical attribute or operation name.
        factor_name: String,
        /// Declared value kind, when known.
        value_kind: Option<ValueKind>,
    },
    /// An opaque binary payload.
    ProductAttribute {
        /// Logical attribute name.
        factor_name: String,
    },
    /// Several attribute columns assembled into one table.
    Table {
        /// Column handles, in column order.
        columns: Vec<HandleId>,
        /// Which columns are collected into lists per row.
        collected: Vec<bool>,
    },
}

impl QueryKind {
    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            QueryKind::Root => "root",
            QueryKind::Object => "object",
            QueryKind::TableVariable { .. } => "table variable",
            QueryKind::Attribute { .. } => "attribute",
            QueryKind::ProductAttribute { .. } => "product attribute",
            QueryKind::Table { .. } => "table",
        }
    }

    /// Whether the handle ranges over objects (graph or table rows).
    pub fn is_object_like(&self) -> bool {
        matches!(self, QueryKind::Object | QueryKind::TableVariable { .. })
    }

    /// Whether the handle denotes one column of values.
    pub fn is_attribute(&self) -> bool {
        matches!(
            self,
            QueryKind::Attribute { .. } | QueryKind::ProductAttribute { .. }
        )
    }
}

/// Immutable state of one handle, stored in the session arena.
#[derive(Clone, Debug)]
pub struct QueryRecord {
    /// Arena index of this handle.
    pub id: HandleId,
    /// Graph vertex the handle denotes.
    pub node: VertexId,
    /// Handle this one was produced from.
    pub previous: Option<HandleId>,
    /// Object type the handle ranges over or reads from.
    pub object_type: Option<String>,
    /// Whether at most one result exists per ancestor unit.
    pub single: bool,
    /// Display names of the handle's columns.
    pub names: Vec<String>,
    /// Anchor vertex used when the handle is placed in a table.
    pub index_node: VertexId,
    /// Variant-specific state.
    pub kind: QueryKind,
    /// Whether the eventual result has one row overall.
    pub one_row: bool,
    /// Whether the eventual result has one column.
    pub one_column: bool,
    /// Per-column binary payload flags.
    pub is_products: Vec<bool>,
}

/// Fields of a handle about to be spawned from a previous one.
#[derive(Debug)]
pub(crate) struct Spawn {
    pub node: VertexId,
    pub kind: QueryKind,
    pub single: bool,
    pub names: Vec<String>,
    pub object_type: Option<String>,
    pub index_node: Option<VertexId>,
    pub is_products: Option<Vec<bool>>,
    pub one_row: bool,
    pub one_column: Option<bool>,
}

impl Spawn {
    pub(crate) fn new(node: VertexId, kind: QueryKind, single: bool) -> Self {
        Self {
            node,
            kind,
            single,
            names: Vec::new(),
            object_type: None,
            index_node: None,
            is_products: None,
            one_row: false,
            one_column: None,
        }
    }

    pub(crate) fn names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    pub(crate) fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub(crate) fn index_node(mut self, index_node: VertexId) -> Self {
        self.index_node = Some(index_node);
        self
    }

    pub(crate) fn is_products(mut self, is_products: Vec<bool>) -> Self {
        self.is_products = Some(is_products);
        self
    }

    pub(crate) fn one_row(mut self, one_row: bool) -> Self {
        self.one_row = one_row;
        self
    }

    pub(crate) fn one_column(mut self, one_column: bool) -> Self {
        self.one_column = Some(one_column);
        self
    }
}

/// One logical query-building session: the root data source every handle
/// descends from.
pub struct Session {
    id: SessionId,
    resolver: Arc<dyn PathResolver>,
    options: QueryOptions,
    graph: Mutex<Box<dyn GraphBuilder>>,
    handles: Mutex<Vec<Arc<QueryRecord>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("vertices", &self.graph.lock().len())
            .field("handles", &self.handles.lock().len())
            .finish()
    }
}

impl Session {
    /// Creates a session with default options.
    pub fn new(resolver: impl PathResolver + 'static) -> Self {
        Self::with_options(Arc::new(resolver), QueryOptions::default())
    }

    /// Creates a session over a shared resolver.
    pub fn with_options(resolver: Arc<dyn PathResolver>, options: QueryOptions) -> Self {
        let graph = Box::new(QueryGraph::new(&options.parameter_prefix));
        Self::with_graph(resolver, options, graph)
    }

    /// Creates a session over a caller-supplied graph builder.
    pub fn with_graph(
        resolver: Arc<dyn PathResolver>,
        options: QueryOptions,
        graph: Box<dyn GraphBuilder>,
    ) -> Self {
        let id = SessionId(NEXT_SESSION.fetch_add(1, Ordering::Relaxed));
        debug!(session = %id, "session.open");
        Self {
            id,
            resolver,
            options,
            graph: Mutex::new(graph),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Unique identifier of the session.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Options shared by every handle.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Schema resolver consulted by every handle.
    pub fn resolver(&self) -> &dyn PathResolver {
        self.resolver.as_ref()
    }

    /// Number of graph vertices appended so far.
    pub fn vertex_count(&self) -> usize {
        self.graph.lock().len()
    }

    /// Returns a fresh root handle bound to the start vertex.
    pub fn root(&self) -> QueryHandle<'_> {
        let start = self.graph(|g| g.start());
        let record = QueryRecord {
            id: HandleId(0),
            node: start,
            previous: None,
            object_type: None,
            single: false,
            names: Vec::new(),
            index_node: start,
            kind: QueryKind::Root,
            one_row: false,
            one_column: false,
            is_products: Vec::new(),
        };
        self.insert(record)
    }

    /// Looks up a handle by arena index.
    pub fn handle(&self, id: HandleId) -> Option<QueryHandle<'_>> {
        self.handles
            .lock()
            .get(id.index())
            .cloned()
            .map(|record| QueryHandle {
                session: self,
                record,
            })
    }

    /// Renders every vertex `handle` depends on as an indented tree.
    pub fn explain(&self, handle: &QueryHandle<'_>) -> Result<String> {
        self.check_same(handle)?;
        Ok(self.graph(|g| g.explain(handle.node())))
    }

    /// Serializes every vertex `handle` depends on, with its parameters.
    pub fn export_json(&self, handle: &QueryHandle<'_>) -> Result<serde_json::Value> {
        self.check_same(handle)?;
        self.graph(|g| g.export_json(handle.node()))
    }

    /// Parameters referenced by the sub-graph `handle` depends on.
    pub fn parameters_for(&self, handle: &QueryHandle<'_>) -> Result<Vec<(String, Value)>> {
        self.check_same(handle)?;
        Ok(self.graph(|g| g.parameters_for(handle.node())))
    }

    pub(crate) fn graph<R>(&self, f: impl FnOnce(&mut dyn GraphBuilder) -> R) -> R {
        let mut graph = self.graph.lock();
        f(graph.as_mut())
    }

    pub(crate) fn check_same(&self, handle: &QueryHandle<'_>) -> Result<()> {
        if std::ptr::eq(self, handle.session) {
            Ok(())
        } else {
            Err(QueryError::DifferentSession)
        }
    }

    pub(crate) fn record(&self, id: HandleId) -> Option<Arc<QueryRecord>> {
        self.handles.lock().get(id.index()).cloned()
    }

    fn insert(&self, mut record: QueryRecord) -> QueryHandle<'_> {
        let mut handles = self.handles.lock();
        record.id = HandleId(handles.len() as u32);
        let record = Arc::new(record);
        handles.push(Arc::clone(&record));
        QueryHandle {
            session: self,
            record,
        }
    }

    /// Attaches a "did you mean" suggestion to unknown-name errors.
    pub(crate) fn suggest(&self, err: QueryError) -> QueryError {
        match &err {
            QueryError::UnknownName { name, .. } => {
                let known = self.resolver.known_names();
                let suggestion = naming::suggest(name, &known, self.options.suggestion_distance);
                err.with_suggestion(suggestion)
            }
            _ => err,
        }
    }
}

/// Immutable, cheaply clonable view of one handle in a [`Session`].
#[derive(Clone)]
pub struct QueryHandle<'s> {
    session: &'s Session,
    record: Arc<QueryRecord>,
}

impl fmt::Debug for QueryHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.record.id)
            .field("kind", &self.record.kind.name())
            .field("object_type", &self.record.object_type)
            .field("node", &self.record.node)
            .field("single", &self.record.single)
            .field("names", &self.record.names)
            .finish()
    }
}

impl<'s> QueryHandle<'s> {
    /// Session the handle belongs to.
    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Arena index of the handle.
    pub fn id(&self) -> HandleId {
        self.record.id
    }

    /// Graph vertex the handle denotes.
    pub fn node(&self) -> VertexId {
        self.record.node
    }

    /// Handle this one was produced from.
    pub fn previous(&self) -> Option<QueryHandle<'s>> {
        self.record.previous.and_then(|id| self.session.handle(id))
    }

    /// Object type the handle ranges over or reads from.
    pub fn object_type(&self) -> Option<&str> {
        self.record.object_type.as_deref()
    }

    /// Whether at most one result exists per ancestor unit.
    pub fn is_single(&self) -> bool {
        self.record.single
    }

    /// Display names of the handle's columns.
    pub fn names(&self) -> &[String] {
        &self.record.names
    }

    /// Anchor vertex used when the handle is placed in a table.
    pub fn index_node(&self) -> VertexId {
        self.record.index_node
    }

    /// Variant-specific state.
    pub fn kind(&self) -> &QueryKind {
        &self.record.kind
    }

    /// Whether the eventual result has one row overall.
    pub fn one_row(&self) -> bool {
        self.record.one_row
    }

    /// Whether the eventual result has one column.
    pub fn one_column(&self) -> bool {
        self.record.one_column
    }

    /// Per-column binary payload flags.
    pub fn is_products(&self) -> &[bool] {
        &self.record.is_products
    }

    /// Whether both handles are the very same arena entry.
    pub fn same_as(&self, other: &QueryHandle<'_>) -> bool {
        std::ptr::eq(self.session, other.session) && self.record.id == other.record.id
    }

    /// Logical attribute name of attribute handles.
    pub fn factor_name(&self) -> Option<&str> {
        match &self.record.kind {
            QueryKind::Attribute { factor_name, .. } | QueryKind::ProductAttribute { factor_name } => {
                Some(factor_name.as_str())
            }
            _ => None,
        }
    }

    /// Declared value kind of attribute handles.
    pub fn value_kind(&self) -> Option<ValueKind> {
        match &self.record.kind {
            QueryKind::Attribute { value_kind, .. } => *value_kind,
            _ => None,
        }
    }

    pub(crate) fn resolver(&self) -> &'s dyn PathResolver {
        self.session.resolver.as_ref()
    }

    pub(crate) fn options(&self) -> &'s QueryOptions {
        &self.session.options
    }

    pub(crate) fn graph<R>(&self, f: impl FnOnce(&mut dyn GraphBuilder) -> R) -> R {
        self.session.graph(f)
    }

    pub(crate) fn same_session(&self, other: &QueryHandle<'_>) -> Result<()> {
        self.session.check_same(other)
    }

    pub(crate) fn wrong_kind(&self, operation: &'static str) -> QueryError {
        QueryError::WrongKind {
            operation,
            found: self.record.kind.name(),
        }
    }

    pub(crate) fn unsupported(&self, operation: &'static str) -> QueryError {
        QueryError::Unsupported {
            operation,
            found: self.record.kind.name(),
        }
    }

    pub(crate) fn current_object(&self) -> Result<&str> {
        self.object_type()
            .ok_or_else(|| self.wrong_kind("object access"))
    }

    /// Spawns a new handle whose previous is `self`.
    ///
    /// Unless given explicitly, the index vertex is this handle's vertex when
    /// it ranges over objects, and this handle's index vertex otherwise.
    pub(crate) fn spawn(&self, spawn: Spawn) -> QueryHandle<'s> {
        let index_node = spawn.index_node.unwrap_or(if self.record.kind.is_object_like() {
            self.record.node
        } else {
            self.record.index_node
        });
        let is_products = spawn
            .is_products
            .unwrap_or_else(|| vec![false; spawn.names.len()]);
        let one_column = spawn.one_column.unwrap_or_else(|| spawn.kind.is_attribute());
        let record = QueryRecord {
            id: HandleId(0),
            node: spawn.node,
            previous: Some(self.record.id),
            object_type: spawn.object_type.or_else(|| self.record.object_type.clone()),
            single: spawn.single,
            names: spawn.names,
            index_node,
            kind: spawn.kind,
            one_row: spawn.one_row,
            one_column,
            is_products,
        };
        self.session.insert(record)
    }

    /// Arena records of the handles on this handle's previous chain,
    /// starting with itself.
    pub(crate) fn lineage(&self) -> Vec<Arc<QueryRecord>> {
        let mut out = vec![Arc::clone(&self.record)];
        let mut cursor = self.record.previous;
        while let Some(id) = cursor {
            match self.session.record(id) {
                Some(record) => {
                    cursor = record.previous;
                    out.push(record);
                }
                None => break,
            }
        }
        out
    }
}

/// Logs an error surfaced to the caller before handing it back.
pub(crate) fn traced<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        debug!(operation, code = err.code(), error = %err, "query.rejected");
    }
    result
}
