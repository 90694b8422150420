//! Folding attributes back onto an ancestor.

use std::fmt;

use tracing::debug;

use crate::query::errors::{QueryError, Result};
use crate::query::session::{traced, QueryHandle, QueryKind, Spawn};
use crate::query::value::ValueKind;

/// Aggregation functions understood by the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    /// Number of rows.
    Count,
    /// Sum of values.
    Sum,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Arithmetic mean.
    Mean,
    /// Standard deviation.
    Std,
    /// Whether any value is true.
    Any,
    /// Whether every value is true.
    All,
}

impl AggregateFn {
    /// Template applied to the folded operand.
    pub fn template(self) -> &'static str {
        match self {
            AggregateFn::Count => "count({0})",
            AggregateFn::Sum => "sum({0})",
            AggregateFn::Min => "min({0})",
            AggregateFn::Max => "max({0})",
            AggregateFn::Mean => "avg({0})",
            AggregateFn::Std => "stDev({0})",
            AggregateFn::Any => "any(x in collect({0}) where toBoolean(x))",
            AggregateFn::All => "all(x in collect({0}) where toBoolean(x))",
        }
    }

    /// Short name, also used as the result's factor name.
    pub fn name(self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Mean => "mean",
            AggregateFn::Std => "std",
            AggregateFn::Any => "any",
            AggregateFn::All => "all",
        }
    }

    fn returns(self, operand: Option<ValueKind>) -> Option<ValueKind> {
        match self {
            AggregateFn::Count => Some(ValueKind::Integer),
            AggregateFn::Mean | AggregateFn::Std => Some(ValueKind::Float),
            AggregateFn::Any | AggregateFn::All => Some(ValueKind::Boolean),
            AggregateFn::Sum | AggregateFn::Min | AggregateFn::Max => operand,
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<'s> QueryHandle<'s> {
    /// Folds this handle onto `wrt`, or onto the whole query when `wrt` is
    /// `None`. Objects can only be counted.
    pub fn aggregate(&self, func: AggregateFn, wrt: Option<&QueryHandle<'s>>) -> Result<QueryHandle<'s>> {
        traced("aggregate", self.aggregate_inner(func, wrt))
    }

    fn aggregate_inner(&self, func: AggregateFn, wrt: Option<&QueryHandle<'s>>) -> Result<QueryHandle<'s>> {
        let value_kind = match self.kind() {
            QueryKind::Attribute { value_kind, .. } => *value_kind,
            QueryKind::ProductAttribute { factor_name } => {
                return Err(QueryError::ProductArithmetic {
                    attribute: factor_name.clone(),
                })
            }
            QueryKind::Object | QueryKind::TableVariable { .. } if func == AggregateFn::Count => None,
            QueryKind::Object | QueryKind::TableVariable { .. } => {
                return Err(QueryError::ObjectArithmetic {
                    object: self.object_type().unwrap_or("table").to_owned(),
                })
            }
            QueryKind::Table { .. } => {
                let previous = self.previous().ok_or_else(|| self.wrong_kind("aggregate"))?;
                return previous.aggregate(func, wrt);
            }
            QueryKind::Root => return Err(self.wrong_kind("aggregate")),
        };
        let wrt = match wrt {
            Some(handle) => {
                self.same_session(handle)?;
                handle.clone()
            }
            None => self.query_root()?,
        };
        let node = self.node();
        let anchor = wrt.node();
        let folded = self.graph(|g| g.add_aggregation(node, anchor, func.template(), func.name()))?;
        debug!(function = %func, vertex = %folded, wrt = %anchor, "query.aggregate");
        let mut spawn = Spawn::new(
            folded,
            QueryKind::Attribute {
                factor_name: func.name().to_owned(),
                value_kind: func.returns(value_kind),
            },
            true,
        )
        .names(vec![func.name().to_owned()])
        .index_node(anchor);
        if let Some(object_type) = wrt.object_type() {
            spawn = spawn.object_type(object_type);
        }
        Ok(self.spawn(spawn))
    }

    /// The root handle this handle descends from.
    fn query_root(&self) -> Result<QueryHandle<'s>> {
        let root = self
            .lineage()
            .into_iter()
            .find(|record| matches!(record.kind, QueryKind::Root))
            .and_then(|record| self.session().handle(record.id));
        root.ok_or_else(|| self.wrong_kind("aggregate"))
    }

    /// Shorthand for [`AggregateFn::Count`].
    pub fn count(&self, wrt: Option<&QueryHandle<'s>>) -> Result<QueryHandle<'s>> {
        self.aggregate(AggregateFn::Count, wrt)
    }

    /// Shorthand for [`AggregateFn::Sum`].
    pub fn sum(&self, wrt: Option<&QueryHandle<'s>>) -> Result<QueryHandle<'s>> {
        self.aggregate(AggregateFn::Sum, wrt)
    }

    /// Shorthand for [`AggregateFn::Max`].
    pub fn max(&self, wrt: Option<&QueryHandle<'s>>) -> Result<QueryHandle<'s>> {
        self.aggregate(AggregateFn::Max, wrt)
    }

    /// Shorthand for [`AggregateFn::Min`].
    pub fn min(&self, wrt: Option<&QueryHandle<'s>>) -> Result<QueryHandle<'s>> {
        self.aggregate(AggregateFn::Min, wrt)
    }

    /// Shorthand for [`AggregateFn::Mean`].
    pub fn mean(&self, wrt: Option<&QueryHandle<'s>>) -> Result<QueryHandle<'s>> {
        self.aggregate(AggregateFn::Mean, wrt)
    }
}
