//! Append-only operation graph shared by every handle of a session.
//!
//! Vertices are owned by the [`QueryGraph`] arena and addressed by
//! [`VertexId`]. Each vertex records the parent it hangs off (its lineage) and
//! the extra vertices it reads from (its dependencies). Nothing is ever
//! mutated once appended.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use tracing::trace;

use crate::query::errors::{QueryError, Result};
use crate::query::metadata::Path;
use crate::query::value::Value;
use crate::types::VertexId;

/// Deferred operation carried by one vertex.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum VertexOp {
    /// The start vertex every graph is created with.
    Start,
    /// Follows a path from the parent's objects to `object_type`.
    Traverse {
        /// Hops followed.
        path: Path,
        /// Object type reached.
        object_type: String,
        /// Whether each parent object reaches at most one object.
        single: bool,
    },
    /// Reads a property of the parent vertex.
    GetItem {
        /// Property name.
        key: String,
    },
    /// Keeps rows where `predicate` is true.
    Filter {
        /// Boolean vertex tested per row.
        predicate: VertexId,
        /// Whether the predicate is tested on the parent itself rather than
        /// folded from a descendant.
        direct: bool,
    },
    /// Applies a text template to operand vertices and parameters.
    Operation {
        /// Template with `{0}`, `{1}`, … operand placeholders.
        template: String,
        /// Short name used when rendering.
        name: String,
        /// Operand vertices, in placeholder order.
        operands: Vec<VertexId>,
    },
    /// Folds an operand back onto an ancestor vertex.
    Aggregate {
        /// Template with a `{0}` operand placeholder.
        template: String,
        /// Short name used when rendering.
        name: String,
        /// Folded vertex.
        operand: VertexId,
    },
    /// Expands a list parameter into one row per element.
    Unwind {
        /// Parameter expanded.
        param: String,
    },
    /// Assembles columns into one table grouped by the parent vertex.
    Results {
        /// Column vertices.
        columns: Vec<VertexId>,
        /// Which columns are collected into lists per row.
        collected: Vec<bool>,
        /// Columns whose null rows are dropped.
        dropna: Vec<VertexId>,
    },
}

impl VertexOp {
    fn label(&self) -> &'static str {
        match self {
            VertexOp::Start => "start",
            VertexOp::Traverse { .. } => "traverse",
            VertexOp::GetItem { .. } => "getitem",
            VertexOp::Filter { .. } => "filter",
            VertexOp::Operation { .. } => "operation",
            VertexOp::Aggregate { .. } => "aggregate",
            VertexOp::Unwind { .. } => "unwind",
            VertexOp::Results { .. } => "results",
        }
    }

    /// Whether rows of this vertex are a new unit of cardinality relative to
    /// its parent.
    fn is_boundary(&self) -> bool {
        match self {
            VertexOp::Start | VertexOp::Unwind { .. } | VertexOp::Filter { .. } => true,
            VertexOp::Traverse { single, .. } => !single,
            _ => false,
        }
    }

    fn multiplies_rows(&self) -> bool {
        match self {
            VertexOp::Unwind { .. } => true,
            VertexOp::Traverse { single, .. } => !single,
            _ => false,
        }
    }
}

/// One immutable record in the graph.
#[derive(Clone, Debug, Serialize)]
pub struct Vertex {
    /// Identifier of this vertex.
    pub id: VertexId,
    /// Operation performed.
    #[serde(flatten)]
    pub op: VertexOp,
    /// Vertex this one hangs off; `None` only for the start vertex.
    pub parent: Option<VertexId>,
    /// Distance from the start vertex along parents.
    pub depth: u32,
    /// Vertices read besides the parent.
    pub deps: SmallVec<[VertexId; 2]>,
    /// Parameters referenced by this vertex.
    pub params: SmallVec<[String; 1]>,
}

/// Primitives used by query handles to grow the graph.
pub trait GraphBuilder: Send {
    /// The start vertex.
    fn start(&self) -> VertexId;
    /// Begins a plural traversal to `object_type` from the start vertex.
    fn add_start(&mut self, object_type: &str) -> Result<VertexId>;
    /// Follows `path` from `from`, optionally hanging the traversal off an
    /// unwind vertex so it runs once per unwound element.
    fn add_traversal(
        &mut self,
        from: VertexId,
        path: &Path,
        object_type: &str,
        single: bool,
        unwind: Option<VertexId>,
    ) -> Result<VertexId>;
    /// Reads property `key` of `vertex`.
    fn add_getitem(&mut self, vertex: VertexId, key: &str) -> Result<VertexId>;
    /// Filters `vertex` by the boolean `predicate`.
    fn add_filter(&mut self, vertex: VertexId, predicate: VertexId, direct: bool) -> Result<VertexId>;
    /// Applies a one-operand template, anchored at the operand's cardinal.
    fn add_scalar_op(&mut self, vertex: VertexId, template: &str, name: &str, params: &[String])
        -> Result<VertexId>;
    /// Applies a template to several operands that must share an anchor.
    /// Returns the new vertex and its anchor.
    fn add_combining_op(
        &mut self,
        template: &str,
        name: &str,
        operands: &[VertexId],
        params: &[String],
    ) -> Result<(VertexId, VertexId)>;
    /// Folds `vertex` onto its ancestor `wrt`.
    fn add_aggregation(&mut self, vertex: VertexId, wrt: VertexId, template: &str, name: &str) -> Result<VertexId>;
    /// Builds one results vertex grouped by `anchor`. Returns the vertex and
    /// which columns are collected into lists.
    fn add_results_table(
        &mut self,
        anchor: VertexId,
        columns: &[VertexId],
        force_plural: &[bool],
        dropna: &[VertexId],
        treat_equal: bool,
    ) -> Result<(VertexId, Vec<bool>)>;
    /// Registers a literal and returns its parameter name.
    fn add_parameter(&mut self, value: Value) -> String;
    /// Unwinds list parameter `param` below `vertex`.
    fn add_unwind_parameter(&mut self, vertex: VertexId, param: &str) -> Result<VertexId>;
    /// Whether no row-multiplying vertex lies between `ancestor` and `vertex`.
    fn is_singular_branch_relative_to(&self, vertex: VertexId, ancestor: VertexId) -> bool;
    /// Whether `ancestor` lies on the parent chain of `vertex` (inclusive).
    fn is_ancestor(&self, ancestor: VertexId, vertex: VertexId) -> bool;
    /// Deepest vertex on every parent chain of `vertices`.
    fn latest_shared_ancestor(&self, vertices: &[VertexId]) -> Option<VertexId>;
    /// Nearest vertex at or above `vertex` that starts a new unit of cardinality.
    fn cardinal(&self, vertex: VertexId) -> VertexId;
    /// Every vertex `vertex` depends on, in insertion order.
    fn restricted(&self, vertex: VertexId) -> Vec<VertexId>;
    /// Parameters referenced by the restricted sub-graph of `vertex`.
    fn parameters_for(&self, vertex: VertexId) -> Vec<(String, Value)>;
    /// Indented text rendering of the restricted sub-graph.
    fn explain(&self, vertex: VertexId) -> String;
    /// JSON export of the restricted sub-graph.
    fn export_json(&self, vertex: VertexId) -> Result<serde_json::Value>;
    /// Number of vertices.
    fn len(&self) -> usize;
    /// Whether only the start vertex exists.
    fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

#[derive(Serialize)]
struct GraphExport<'a> {
    output: VertexId,
    vertices: Vec<&'a Vertex>,
    parameters: Vec<(&'a str, &'a Value)>,
}

/// Arena implementation of [`GraphBuilder`].
#[derive(Debug)]
pub struct QueryGraph {
    vertices: Vec<Vertex>,
    parameters: Vec<(String, Value)>,
    parameter_prefix: String,
}

impl Default for QueryGraph {
    fn default() -> Self {
        Self::new("param")
    }
}

impl QueryGraph {
    /// Creates a graph holding only the start vertex.
    pub fn new(parameter_prefix: &str) -> Self {
        let start = Vertex {
            id: VertexId::START,
            op: VertexOp::Start,
            parent: None,
            depth: 0,
            deps: SmallVec::new(),
            params: SmallVec::new(),
        };
        Self {
            vertices: vec![start],
            parameters: Vec::new(),
            parameter_prefix: parameter_prefix.to_owned(),
        }
    }

    /// Looks up a vertex.
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.index())
    }

    fn check(&self, id: VertexId) -> Result<&Vertex> {
        self.vertex(id).ok_or(QueryError::UnknownVertex { vertex: id })
    }

    fn depth(&self, id: VertexId) -> u32 {
        self.vertex(id).map_or(0, |v| v.depth)
    }

    fn push(
        &mut self,
        op: VertexOp,
        parent: VertexId,
        deps: SmallVec<[VertexId; 2]>,
        params: SmallVec<[String; 1]>,
    ) -> Result<VertexId> {
        let depth = self.check(parent)?.depth + 1;
        for dep in &deps {
            self.check(*dep)?;
        }
        let id = VertexId(self.vertices.len() as u32);
        trace!(vertex = %id, parent = %parent, op = op.label(), "graph.add_vertex");
        self.vertices.push(Vertex {
            id,
            op,
            parent: Some(parent),
            depth,
            deps,
            params,
        });
        Ok(id)
    }

    /// `vertex` and its parent chain up to the start vertex. Empty for ids
    /// this graph never issued.
    fn chain(&self, vertex: VertexId) -> impl Iterator<Item = &Vertex> + '_ {
        std::iter::successors(self.vertex(vertex), move |v| v.parent.and_then(|p| self.vertex(p)))
    }

    fn parents(&self, vertex: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.chain(vertex).map(|v| v.id)
    }

    fn ancestor_set(&self, vertex: VertexId) -> BTreeSet<VertexId> {
        self.parents(vertex).collect()
    }

    /// Resolves the anchor of several operands: the finest cardinal unit
    /// every operand can be broadcast onto.
    fn latest_object_node(&self, operands: &[VertexId]) -> Result<VertexId> {
        let shared = self
            .latest_shared_ancestor(operands)
            .ok_or(QueryError::NoCommonAnchor)?;
        let mut below: Vec<VertexId> = Vec::new();
        let mut above: Vec<VertexId> = Vec::new();
        for cardinal in operands.iter().map(|v| self.cardinal(*v)) {
            let bucket = if cardinal != shared && self.is_ancestor(shared, cardinal) {
                &mut below
            } else {
                &mut above
            };
            if !bucket.contains(&cardinal) {
                bucket.push(cardinal);
            }
        }
        match below.as_slice() {
            [] => Ok(above
                .into_iter()
                .max_by_key(|v| self.depth(*v))
                .unwrap_or(shared)),
            [only] => Ok(*only),
            [left, right, ..] => Err(QueryError::Disjoint {
                left: left.to_string(),
                right: right.to_string(),
            }),
        }
    }

    fn describe(&self, vertex: &Vertex) -> String {
        match &vertex.op {
            VertexOp::Start => "start".to_owned(),
            VertexOp::Traverse {
                object_type, single, ..
            } => format!(
                "traverse {object_type} ({})",
                if *single { "single" } else { "plural" }
            ),
            VertexOp::GetItem { key } => format!("getitem .{key}"),
            VertexOp::Filter { predicate, direct } => {
                format!("filter by {predicate}{}", if *direct { " (direct)" } else { "" })
            }
            VertexOp::Operation {
                name, operands, ..
            } => format!("{name} {}", join_ids(operands)),
            VertexOp::Aggregate { name, operand, .. } => format!("{name} of {operand}"),
            VertexOp::Unwind { param } => format!("unwind {param}"),
            VertexOp::Results {
                columns, collected, ..
            } => {
                let cols: Vec<String> = columns
                    .iter()
                    .zip(collected)
                    .map(|(c, collect)| if *collect { format!("collect({c})") } else { c.to_string() })
                    .collect();
                format!("results [{}]", cols.join(", "))
            }
        }
    }
}

fn join_ids(ids: &[VertexId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl GraphBuilder for QueryGraph {
    fn start(&self) -> VertexId {
        VertexId::START
    }

    fn add_start(&mut self, object_type: &str) -> Result<VertexId> {
        self.add_traversal(VertexId::START, &Path::default(), object_type, false, None)
    }

    fn add_traversal(
        &mut self,
        from: VertexId,
        path: &Path,
        object_type: &str,
        single: bool,
        unwind: Option<VertexId>,
    ) -> Result<VertexId> {
        let (parent, deps) = match unwind {
            Some(unwind) => (unwind, smallvec![from]),
            None => (from, SmallVec::new()),
        };
        let op = VertexOp::Traverse {
            path: path.clone(),
            object_type: object_type.to_owned(),
            single,
        };
        self.push(op, parent, deps, SmallVec::new())
    }

    fn add_getitem(&mut self, vertex: VertexId, key: &str) -> Result<VertexId> {
        let op = VertexOp::GetItem {
            key: key.to_owned(),
        };
        self.push(op, vertex, SmallVec::new(), SmallVec::new())
    }

    fn add_filter(&mut self, vertex: VertexId, predicate: VertexId, direct: bool) -> Result<VertexId> {
        self.check(vertex)?;
        self.check(predicate)?;
        let cardinal = self.cardinal(predicate);
        if !self.is_ancestor(cardinal, vertex) {
            return Err(QueryError::NotAncestor {
                wrt: cardinal,
                vertex,
            });
        }
        let op = VertexOp::Filter { predicate, direct };
        self.push(op, vertex, smallvec![predicate], SmallVec::new())
    }

    fn add_scalar_op(
        &mut self,
        vertex: VertexId,
        template: &str,
        name: &str,
        params: &[String],
    ) -> Result<VertexId> {
        self.check(vertex)?;
        let anchor = self.cardinal(vertex);
        let op = VertexOp::Operation {
            template: template.to_owned(),
            name: name.to_owned(),
            operands: vec![vertex],
        };
        self.push(op, anchor, smallvec![vertex], params.iter().cloned().collect())
    }

    fn add_combining_op(
        &mut self,
        template: &str,
        name: &str,
        operands: &[VertexId],
        params: &[String],
    ) -> Result<(VertexId, VertexId)> {
        for operand in operands {
            self.check(*operand)?;
        }
        let anchor = self.latest_object_node(operands)?;
        let op = VertexOp::Operation {
            template: template.to_owned(),
            name: name.to_owned(),
            operands: operands.to_vec(),
        };
        let id = self.push(
            op,
            anchor,
            operands.iter().copied().collect(),
            params.iter().cloned().collect(),
        )?;
        Ok((id, anchor))
    }

    fn add_aggregation(&mut self, vertex: VertexId, wrt: VertexId, template: &str, name: &str) -> Result<VertexId> {
        self.check(vertex)?;
        self.check(wrt)?;
        if !self.is_ancestor(wrt, vertex) {
            return Err(QueryError::NotAncestor { wrt, vertex });
        }
        let op = VertexOp::Aggregate {
            template: template.to_owned(),
            name: name.to_owned(),
            operand: vertex,
        };
        self.push(op, wrt, smallvec![vertex], SmallVec::new())
    }

    fn add_results_table(
        &mut self,
        anchor: VertexId,
        columns: &[VertexId],
        force_plural: &[bool],
        dropna: &[VertexId],
        treat_equal: bool,
    ) -> Result<(VertexId, Vec<bool>)> {
        self.check(anchor)?;
        for column in columns.iter().chain(dropna) {
            self.check(*column)?;
        }
        let mut collected = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if !self.is_ancestor(anchor, *column) {
                return Err(QueryError::NotAncestor {
                    wrt: anchor,
                    vertex: *column,
                });
            }
            let forced = force_plural.get(idx).copied().unwrap_or(false);
            collected.push(forced || !self.is_singular_branch_relative_to(*column, anchor));
        }
        if treat_equal && collected.iter().any(|c| *c) {
            collected.iter_mut().for_each(|c| *c = true);
        }
        let op = VertexOp::Results {
            columns: columns.to_vec(),
            collected: collected.clone(),
            dropna: dropna.to_vec(),
        };
        let id = self.push(op, anchor, columns.iter().copied().collect(), SmallVec::new())?;
        Ok((id, collected))
    }

    fn add_parameter(&mut self, value: Value) -> String {
        let name = format!("${}{}", self.parameter_prefix, self.parameters.len());
        trace!(param = %name, "graph.add_parameter");
        self.parameters.push((name.clone(), value));
        name
    }

    fn add_unwind_parameter(&mut self, vertex: VertexId, param: &str) -> Result<VertexId> {
        let op = VertexOp::Unwind {
            param: param.to_owned(),
        };
        self.push(op, vertex, SmallVec::new(), smallvec![param.to_owned()])
    }

    fn is_singular_branch_relative_to(&self, vertex: VertexId, ancestor: VertexId) -> bool {
        for v in self.chain(vertex) {
            if v.id == ancestor {
                return true;
            }
            if v.op.multiplies_rows() {
                return false;
            }
        }
        true
    }

    fn is_ancestor(&self, ancestor: VertexId, vertex: VertexId) -> bool {
        self.parents(vertex).any(|v| v == ancestor)
    }

    fn latest_shared_ancestor(&self, vertices: &[VertexId]) -> Option<VertexId> {
        let (first, rest) = vertices.split_first()?;
        let mut shared = self.ancestor_set(*first);
        for vertex in rest {
            let theirs = self.ancestor_set(*vertex);
            shared.retain(|v| theirs.contains(v));
        }
        shared.into_iter().max_by_key(|v| self.depth(*v))
    }

    fn cardinal(&self, vertex: VertexId) -> VertexId {
        self.chain(vertex)
            .find(|v| v.op.is_boundary())
            .map_or(VertexId::START, |v| v.id)
    }

    fn restricted(&self, vertex: VertexId) -> Vec<VertexId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![vertex];
        while let Some(v) = stack.pop() {
            let Some(record) = self.vertex(v) else {
                continue;
            };
            if !seen.insert(v) {
                continue;
            }
            stack.extend(record.parent);
            stack.extend(record.deps.iter().copied());
        }
        seen.into_iter().collect()
    }

    fn parameters_for(&self, vertex: VertexId) -> Vec<(String, Value)> {
        let used: BTreeSet<String> = self
            .restricted(vertex)
            .into_iter()
            .filter_map(|v| self.vertex(v))
            .flat_map(|v| v.params.iter().cloned())
            .collect();
        self.parameters
            .iter()
            .filter(|(name, _)| used.contains(name))
            .cloned()
            .collect()
    }

    fn explain(&self, vertex: VertexId) -> String {
        let restricted = self.restricted(vertex);
        let mut out = String::new();
        for record in restricted.iter().filter_map(|id| self.vertex(*id)) {
            let id = record.id;
            let indent = "  ".repeat(record.depth as usize);
            let _ = writeln!(out, "{indent}{id}: {}", self.describe(record));
        }
        out
    }

    fn export_json(&self, vertex: VertexId) -> Result<serde_json::Value> {
        self.check(vertex)?;
        let vertices = self
            .restricted(vertex)
            .into_iter()
            .filter_map(|v| self.vertex(v))
            .collect();
        let params = self.parameters_for(vertex);
        let parameters = self
            .parameters
            .iter()
            .filter(|(name, _)| params.iter().any(|(p, _)| p == name))
            .map(|(name, value)| (name.as_str(), value))
            .collect();
        let export = GraphExport {
            output: vertex,
            vertices,
            parameters,
        };
        serde_json::to_value(&export).map_err(|err| QueryError::Export(err.to_string()))
    }

    fn len(&self) -> usize {
        self.vertices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::metadata::Hop;

    fn hop(from: &str, to: &str, single: bool) -> Path {
        Path {
            hops: vec![Hop {
                from: from.into(),
                to: to.into(),
                label: None,
                single,
            }],
        }
    }

    #[test]
    fn cardinal_skips_singular_traversals() {
        let mut graph = QueryGraph::default();
        let runs = graph.add_start("run").unwrap();
        let exposure = graph.add_traversal(runs, &hop("run", "exposure", true), "exposure", true, None).unwrap();
        let mjd = graph.add_getitem(exposure, "mjd").unwrap();
        assert_eq!(graph.cardinal(mjd), runs);
        assert!(graph.is_singular_branch_relative_to(mjd, runs));
        assert!(!graph.is_singular_branch_relative_to(mjd, VertexId::START));
    }

    #[test]
    fn combining_sibling_branches_is_disjoint() {
        let mut graph = QueryGraph::default();
        let obs = graph.add_start("ob").unwrap();
        let runs = graph.add_traversal(obs, &hop("ob", "run", false), "run", false, None).unwrap();
        let spectra = graph.add_traversal(obs, &hop("ob", "spectrum", false), "spectrum", false, None).unwrap();
        let a = graph.add_getitem(runs, "exptime").unwrap();
        let b = graph.add_getitem(spectra, "snr").unwrap();
        let err = graph.add_combining_op("{0} + {1}", "add", &[a, b], &[]).unwrap_err();
        assert_eq!(err.code(), "Disjoint");

        let c = graph.add_getitem(obs, "obid").unwrap();
        let (_, anchor) = graph.add_combining_op("{0} + {1}", "add", &[a, c], &[]).unwrap();
        assert_eq!(anchor, runs);
    }

    #[test]
    fn results_collect_plural_columns() {
        let mut graph = QueryGraph::default();
        let obs = graph.add_start("ob").unwrap();
        let runs = graph.add_traversal(obs, &hop("ob", "run", false), "run", false, None).unwrap();
        let exptime = graph.add_getitem(runs, "exptime").unwrap();
        let obid = graph.add_getitem(obs, "obid").unwrap();
        let (_, collected) = graph
            .add_results_table(obs, &[obid, exptime], &[false, false], &[], false)
            .unwrap();
        assert_eq!(collected, vec![false, true]);
        let (_, collected) = graph
            .add_results_table(obs, &[obid, exptime], &[false, false], &[], true)
            .unwrap();
        assert_eq!(collected, vec![true, true]);
    }

    #[test]
    fn parameters_are_restricted_to_dependencies() {
        let mut graph = QueryGraph::new("p");
        let obs = graph.add_start("ob").unwrap();
        let used = graph.add_parameter(Value::Int(1));
        let unused = graph.add_parameter(Value::Int(2));
        let id = graph.add_getitem(obs, "obid").unwrap();
        let eq = graph.add_scalar_op(id, &format!("{{0}} = {used}"), "eq", &[used.clone()]).unwrap();
        let params = graph.parameters_for(eq);
        assert_eq!(params, vec![(used, Value::Int(1))]);
        assert!(!params.iter().any(|(name, _)| *name == unused));
        assert!(graph.explain(eq).contains("eq v2"));
    }

    #[test]
    fn foreign_vertices_are_rejected() {
        let mut graph = QueryGraph::default();
        let obs = graph.add_start("ob").unwrap();
        let missing = VertexId(40);
        let err = graph.add_getitem(missing, "obid").unwrap_err();
        assert_eq!(err, QueryError::UnknownVertex { vertex: missing });
        let err = graph
            .add_results_table(obs, &[missing], &[false], &[], false)
            .unwrap_err();
        assert_eq!(err.code(), "UnknownVertex");
        assert!(graph.export_json(missing).is_err());
        assert!(!graph.is_ancestor(obs, missing));
        assert_eq!(graph.cardinal(missing), VertexId::START);
        assert!(graph.restricted(missing).is_empty());
        assert_eq!(graph.len(), 2);
    }
}
