//! Tables built from independently constructed handles.
//!
//! Every member must descend from the same object handle somewhere along its
//! `previous` chain, and that handle's vertex must lie on every member's
//! graph ancestry. The deepest such handle becomes the anchor the rows of the
//! resulting table are grouped by.

use std::collections::BTreeSet;

use tracing::debug;

use crate::query::errors::{QueryError, Result};
use crate::query::session::{traced, QueryHandle, QueryKind};
use crate::query::table::TableItem;
use crate::types::VertexId;

/// One member of an [`AlignedQuery`].
#[derive(Clone, Debug)]
pub struct AlignItem<'s> {
    /// Column name, or column-name affix for table members.
    pub label: Option<String>,
    /// Member handle.
    pub query: QueryHandle<'s>,
}

impl<'s> From<QueryHandle<'s>> for AlignItem<'s> {
    fn from(query: QueryHandle<'s>) -> Self {
        Self { label: None, query }
    }
}

impl<'s> From<&QueryHandle<'s>> for AlignItem<'s> {
    fn from(query: &QueryHandle<'s>) -> Self {
        Self {
            label: None,
            query: query.clone(),
        }
    }
}

impl<'s> From<(&str, QueryHandle<'s>)> for AlignItem<'s> {
    fn from((label, query): (&str, QueryHandle<'s>)) -> Self {
        Self {
            label: Some(label.to_owned()),
            query,
        }
    }
}

/// Handles aligned on their deepest common ancestor.
#[derive(Clone, Debug)]
pub struct AlignedQuery<'s> {
    items: Vec<AlignItem<'s>>,
    anchor: QueryHandle<'s>,
}

impl<'s> AlignedQuery<'s> {
    /// Validates the members and resolves their anchor.
    pub fn new<I, T>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<AlignItem<'s>>,
    {
        let items: Vec<AlignItem<'s>> = items.into_iter().map(Into::into).collect();
        traced("align", Self::resolve(items))
    }

    fn resolve(items: Vec<AlignItem<'s>>) -> Result<Self> {
        let first = items.first().ok_or(QueryError::EmptyTable)?.query.clone();
        for item in &items[1..] {
            first.same_session(&item.query)?;
        }

        let mut shared: Option<BTreeSet<VertexId>> = None;
        for item in &items {
            let ancestors: BTreeSet<VertexId> = item.query.lineage().iter().map(|r| r.node).collect();
            shared = Some(match shared {
                Some(mut acc) => {
                    acc.retain(|v| ancestors.contains(v));
                    acc
                }
                None => ancestors,
            });
        }
        let mut shared = shared.unwrap_or_default();
        let groupable: BTreeSet<VertexId> = first
            .lineage()
            .iter()
            .filter(|r| matches!(r.kind, QueryKind::Root) || r.kind.is_object_like())
            .map(|r| r.node)
            .collect();
        shared.retain(|v| groupable.contains(v));
        let members: Vec<VertexId> = items.iter().map(|item| item.query.node()).collect();
        let candidates: Vec<VertexId> = first.graph(|g| {
            shared.retain(|c| members.iter().all(|m| g.is_ancestor(*c, *m)));
            shared
                .iter()
                .copied()
                .filter(|c| !shared.iter().any(|d| d != c && g.is_ancestor(*c, *d)))
                .collect()
        });
        let anchor_node = match candidates.as_slice() {
            [] => return Err(QueryError::NoCommonAnchor),
            [only] => *only,
            _ => return Err(QueryError::AmbiguousAnchor { candidates }),
        };
        let anchor = first
            .lineage()
            .into_iter()
            .find(|record| record.node == anchor_node)
            .and_then(|record| first.session().handle(record.id))
            .ok_or(QueryError::NoCommonAnchor)?;
        debug!(members = items.len(), anchor = %anchor_node, "query.align");
        Ok(Self { items, anchor })
    }

    /// Handle whose vertex groups the rows.
    pub fn anchor(&self) -> &QueryHandle<'s> {
        &self.anchor
    }

    /// Members in the order given.
    pub fn items(&self) -> &[AlignItem<'s>] {
        &self.items
    }

    /// Builds one table grouped by the anchor. Table members contribute all
    /// of their columns, with the label as an affix.
    pub fn precompile(&self) -> Result<QueryHandle<'s>> {
        traced("align", self.precompile_inner())
    }

    fn precompile_inner(&self) -> Result<QueryHandle<'s>> {
        let tables = self
            .items
            .iter()
            .filter(|item| matches!(item.query.kind(), QueryKind::Table { .. }))
            .count();
        if tables != 0 && tables != self.items.len() {
            return Err(QueryError::MixedTableItems);
        }

        let mut explicit = Vec::new();
        let mut attributes = Vec::new();
        for (idx, item) in self.items.iter().enumerate() {
            if tables == 0 {
                explicit.push(item.label.clone());
                attributes.push(self.anchor.resolve_column(TableItem::Query(item.query.clone()))?);
                continue;
            }
            for (name, column) in item.query.names().iter().zip(item.query.columns()?) {
                let name = match &item.label {
                    Some(label) if label.ends_with('_') => format!("{label}{name}"),
                    Some(label) => format!("{name}{label}"),
                    None => format!("{name}_{idx}"),
                };
                explicit.push(Some(name));
                attributes.push(column);
            }
        }
        self.anchor.assemble(&self.anchor, explicit, attributes, false)
    }
}
