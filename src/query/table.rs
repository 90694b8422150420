//! Assembling attribute columns into tables.

use tracing::debug;

use crate::query::errors::{QueryError, Result};
use crate::query::naming::{process_names, NameSlot};
use crate::query::session::{traced, QueryHandle, QueryKind, Spawn};
use crate::query::value::Value;

/// One entry of a table request.
#[derive(Clone, Debug)]
pub enum TableItem<'s> {
    /// An attribute or object name, resolved with [`QueryHandle::get`]; the
    /// name doubles as the column name.
    Name(String),
    /// A handle: attributes are used as is, objects collapse to their
    /// default attribute, tables contribute every column.
    Query(QueryHandle<'s>),
    /// An explicitly named item. Renaming a table prefixes its column names
    /// when the name ends with `_` and suffixes them otherwise.
    Renamed(String, Box<TableItem<'s>>),
    /// An identity value; a request made only of ids filters by id instead.
    Id(Value),
}

impl<'s> TableItem<'s> {
    /// Wraps `item` under an explicit column name.
    pub fn renamed(name: impl Into<String>, item: impl Into<TableItem<'s>>) -> Self {
        TableItem::Renamed(name.into(), Box::new(item.into()))
    }
}

impl From<&str> for TableItem<'_> {
    fn from(name: &str) -> Self {
        TableItem::Name(name.to_owned())
    }
}

impl From<String> for TableItem<'_> {
    fn from(name: String) -> Self {
        TableItem::Name(name)
    }
}

impl<'s> From<QueryHandle<'s>> for TableItem<'s> {
    fn from(handle: QueryHandle<'s>) -> Self {
        TableItem::Query(handle)
    }
}

impl<'s> From<&QueryHandle<'s>> for TableItem<'s> {
    fn from(handle: &QueryHandle<'s>) -> Self {
        TableItem::Query(handle.clone())
    }
}

impl<'s> From<(&str, QueryHandle<'s>)> for TableItem<'s> {
    fn from((name, handle): (&str, QueryHandle<'s>)) -> Self {
        TableItem::renamed(name, handle)
    }
}

impl From<i64> for TableItem<'_> {
    fn from(id: i64) -> Self {
        TableItem::Id(Value::Int(id))
    }
}

/// Table items flattened to one per column.
enum Flat<'s> {
    Column(Option<String>, TableItem<'s>),
    Id(Value),
}

fn flatten<'s>(items: Vec<TableItem<'s>>, out: &mut Vec<Flat<'s>>) -> Result<()> {
    for item in items {
        match item {
            TableItem::Id(value) => out.push(Flat::Id(value)),
            TableItem::Name(name) => out.push(Flat::Column(Some(name.clone()), TableItem::Name(name))),
            TableItem::Query(handle) if matches!(handle.kind(), QueryKind::Table { .. }) => {
                for column in handle.columns()? {
                    out.push(Flat::Column(None, TableItem::Query(column)));
                }
            }
            TableItem::Query(handle) => out.push(Flat::Column(None, TableItem::Query(handle))),
            TableItem::Renamed(name, inner) => match *inner {
                TableItem::Query(table) if matches!(table.kind(), QueryKind::Table { .. }) => {
                    for (column_name, column) in table.names().iter().zip(table.columns()?) {
                        let renamed = if name.ends_with('_') {
                            format!("{name}{column_name}")
                        } else {
                            format!("{column_name}{name}")
                        };
                        out.push(Flat::Column(Some(renamed), TableItem::Query(column)));
                    }
                }
                TableItem::Id(value) => out.push(Flat::Id(value)),
                other => out.push(Flat::Column(Some(name), other)),
            },
        }
    }
    Ok(())
}

impl<'s> QueryHandle<'s> {
    /// Builds one table from `items`, grouped by this handle's objects.
    pub fn select_many<I, T>(&self, items: I) -> Result<QueryHandle<'s>>
    where
        I: IntoIterator<Item = T>,
        T: Into<TableItem<'s>>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.build_table(items, false)
    }

    /// Builds one table from `items`. With `all_from_same`, every column is
    /// collected as soon as one of them has to be.
    pub fn build_table(&self, items: Vec<TableItem<'s>>, all_from_same: bool) -> Result<QueryHandle<'s>> {
        traced("build_table", self.build_table_inner(items, all_from_same))
    }

    fn build_table_inner(&self, items: Vec<TableItem<'s>>, all_from_same: bool) -> Result<QueryHandle<'s>> {
        if !self.kind().is_object_like() {
            return Err(self.wrong_kind("build_table"));
        }
        let mut flat = Vec::new();
        flatten(items, &mut flat)?;
        let (ids, columns): (Vec<_>, Vec<_>) = flat.into_iter().partition(|f| matches!(f, Flat::Id(_)));
        if !ids.is_empty() {
            if !columns.is_empty() {
                return Err(QueryError::MixedIndexing);
            }
            let values = ids
                .into_iter()
                .filter_map(|f| match f {
                    Flat::Id(value) => Some(value),
                    Flat::Column(..) => None,
                })
                .collect::<Vec<_>>();
            return self.by_ids(values);
        }
        if columns.is_empty() {
            return Err(QueryError::EmptyTable);
        }

        let mut explicit = Vec::with_capacity(columns.len());
        let mut attributes = Vec::with_capacity(columns.len());
        for column in columns {
            let Flat::Column(name, item) = column else {
                continue;
            };
            explicit.push(name);
            attributes.push(self.resolve_column(item)?);
        }
        self.assemble(self, explicit, attributes, all_from_same)
    }

    /// Resolves one table item to an attribute handle.
    pub(crate) fn resolve_column(&self, item: TableItem<'s>) -> Result<QueryHandle<'s>> {
        let handle = match item {
            TableItem::Name(name) => self.get(&name)?,
            TableItem::Query(handle) => {
                self.same_session(&handle)?;
                handle
            }
            TableItem::Renamed(_, inner) => return self.resolve_column(*inner),
            TableItem::Id(_) => return Err(QueryError::MixedIndexing),
        };
        match handle.kind() {
            QueryKind::Attribute { .. } | QueryKind::ProductAttribute { .. } => Ok(handle),
            QueryKind::Object => handle.default_attribute(),
            other => Err(QueryError::WrongKind {
                operation: "table column",
                found: other.name(),
            }),
        }
    }

    /// Emits a results vertex for `attributes` grouped by `base` and spawns
    /// the table from `base`.
    pub(crate) fn assemble(
        &self,
        base: &QueryHandle<'s>,
        explicit: Vec<Option<String>>,
        attributes: Vec<QueryHandle<'s>>,
        all_from_same: bool,
    ) -> Result<QueryHandle<'s>> {
        let anchor = base.node();
        let nodes: Vec<_> = attributes.iter().map(QueryHandle::node).collect();
        let force_plural: Vec<bool> = attributes.iter().map(|a| !a.is_single()).collect();
        let is_products: Vec<bool> = attributes
            .iter()
            .map(|a| a.is_products().first().copied().unwrap_or(false))
            .collect();
        let (table, collected, one_row) = self.graph(|g| {
            let (table, collected) = g.add_results_table(anchor, &nodes, &force_plural, &[], all_from_same)?;
            let one_row = g.is_singular_branch_relative_to(table, g.start());
            Ok::<_, QueryError>((table, collected, one_row))
        })?;
        let slots: Vec<NameSlot> = explicit
            .into_iter()
            .zip(&attributes)
            .map(|(name, attribute)| NameSlot {
                explicit: name,
                factor: attribute.factor_name().unwrap_or_default().to_owned(),
                object_type: attribute.object_type().map(str::to_owned),
            })
            .collect();
        let names = process_names(&slots);
        debug!(vertex = %table, anchor = %anchor, columns = names.len(), one_row, "query.build_table");
        Ok(base.spawn(
            Spawn::new(
                table,
                QueryKind::Table {
                    columns: attributes.iter().map(QueryHandle::id).collect(),
                    collected,
                },
                false,
            )
            .names(names)
            .is_products(is_products)
            .one_row(one_row),
        ))
    }

    /// Column handles of a table, in column order.
    pub fn columns(&self) -> Result<Vec<QueryHandle<'s>>> {
        let QueryKind::Table { columns, .. } = self.kind() else {
            return Err(self.wrong_kind("columns"));
        };
        columns
            .iter()
            .map(|id| {
                self.session()
                    .handle(*id)
                    .ok_or_else(|| self.wrong_kind("columns"))
            })
            .collect()
    }

    /// The column handle stored under `name`.
    pub fn column(&self, name: &str) -> Result<QueryHandle<'s>> {
        let columns = self.columns()?;
        self.names()
            .iter()
            .position(|n| n == name)
            .and_then(|idx| columns.into_iter().nth(idx))
            .ok_or_else(|| QueryError::UnknownColumn {
                column: name.to_owned(),
                columns: self.names().to_vec(),
            })
    }

    /// Appends the columns of `other`, which must be built from the same
    /// handle and share no column name with this table.
    pub fn concat(&self, other: &QueryHandle<'s>) -> Result<QueryHandle<'s>> {
        traced("concat", self.concat_inner(other))
    }

    fn concat_inner(&self, other: &QueryHandle<'s>) -> Result<QueryHandle<'s>> {
        self.same_session(other)?;
        let mine = self.columns()?;
        let theirs = other.columns()?;
        let base = match (self.previous(), other.previous()) {
            (Some(a), Some(b)) if a.same_as(&b) => a,
            _ => return Err(QueryError::TableIndexMismatch),
        };
        let mut duplicates: Vec<String> = self
            .names()
            .iter()
            .filter(|n| other.names().contains(*n))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort();
            duplicates.dedup();
            return Err(QueryError::ColumnCollision { names: duplicates });
        }
        let explicit = self
            .names()
            .iter()
            .chain(other.names())
            .cloned()
            .map(Some)
            .collect();
        let attributes = mine.into_iter().chain(theirs).collect();
        self.assemble(&base, explicit, attributes, false)
    }

    /// Resolves the handle into a table ready for compilation.
    pub fn precompile(&self) -> Result<QueryHandle<'s>> {
        let result = match self.kind() {
            QueryKind::Root => Err(self.unsupported("precompile")),
            QueryKind::Object => self.default_attribute().and_then(|a| a.precompile_attribute()),
            QueryKind::TableVariable { .. } => self.select_all(),
            QueryKind::Attribute { .. } | QueryKind::ProductAttribute { .. } => self.precompile_attribute(),
            QueryKind::Table { .. } => Ok(self.clone()),
        };
        traced("precompile", result)
    }
}
