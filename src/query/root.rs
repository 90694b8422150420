//! Operations available on the root handle: starting traversals, identity
//! lookups, and binding in-memory tables.

use tracing::debug;

use crate::query::errors::{QueryError, Result};
use crate::query::metadata::{NameKind, Path};
use crate::query::session::{traced, QueryHandle, QueryKind, Spawn};
use crate::query::value::{TableValue, Value};

impl<'s> QueryHandle<'s> {
    /// Canonical object type and whether `name` was written in singular form.
    pub(crate) fn normalise_object(&self, name: &str) -> Result<(String, bool)> {
        match self.resolver().classify(name) {
            NameKind::ObjectType {
                object_type,
                singular,
            } => Ok((object_type, singular)),
            _ => Err(self
                .session()
                .suggest(QueryError::unknown(name, self.object_type()))),
        }
    }

    fn root_traverse(&self, object_type: &str) -> Result<QueryHandle<'s>> {
        let (object_type, singular) = self.normalise_object(object_type)?;
        if singular {
            return Err(QueryError::SingularStart {
                plural: self.resolver().plural_name(&object_type),
                object: object_type,
            });
        }
        let node = self.graph(|g| g.add_start(&object_type))?;
        debug!(object_type = %object_type, vertex = %node, single = false, "query.traverse");
        let plural = self.resolver().plural_name(&object_type);
        Ok(self.spawn(
            Spawn::new(node, QueryKind::Object, false)
                .object_type(object_type)
                .names(vec![plural]),
        ))
    }

    pub(crate) fn root_get(&self, name: &str) -> Result<QueryHandle<'s>> {
        let resolver = self.resolver();
        let kind = resolver.classify(name);
        if !matches!(kind, NameKind::Unknown) && resolver.is_singular_name(name) {
            return Err(QueryError::SingularStart {
                object: name.to_owned(),
                plural: match &kind {
                    NameKind::ObjectType { object_type, .. } => resolver.plural_name(object_type),
                    _ => format!("{name}s"),
                },
            });
        }
        match kind {
            NameKind::Attribute => {
                let owner = resolver.owning_object_type(None, name)?;
                let plural = resolver.plural_name(&owner.object_type);
                self.root_traverse(&plural)?
                    .direct_attribute(&resolver.singular_name(name), true, None)
            }
            NameKind::ObjectType { .. } => self.root_traverse(name),
            NameKind::Relation { owners } => {
                let singular = resolver.singular_name(name);
                match owners.as_slice() {
                    [owner] => {
                        let plural = resolver.plural_name(owner);
                        self.root_traverse(&plural)?
                            .traverse_to_relative(&singular, singular == name)
                    }
                    _ => Err(QueryError::AmbiguousName {
                        name: singular,
                        owners,
                    }),
                }
            }
            NameKind::Unknown => Err(self.session().suggest(QueryError::unknown(name, None))),
        }
    }

    fn identity_of(&self, object_type: &str) -> String {
        self.resolver()
            .identity_attribute(object_type)
            .unwrap_or_else(|| self.options().identity_attribute.clone())
    }

    fn path_from_here(&self, object_type: &str) -> Result<(Path, bool)> {
        match self.object_type() {
            Some(from) if !matches!(self.kind(), QueryKind::Root) => {
                self.resolver().path_and_cardinality(from, object_type, false)
            }
            _ => Ok((Path::default(), false)),
        }
    }

    /// Traverses from this handle to `object_type` and keeps the one object
    /// whose identity equals `value`.
    pub(crate) fn traverse_by_object_index(&self, object_type: &str, value: Value) -> Result<QueryHandle<'s>> {
        let (path, single) = self.path_from_here(object_type)?;
        let identity = self.identity_of(object_type);
        let node = self.node();
        let from_start = matches!(self.kind(), QueryKind::Root);
        let filtered = self.graph(|g| {
            let param = g.add_parameter(value);
            let travel = if from_start {
                g.add_start(object_type)?
            } else {
                g.add_traversal(node, &path, object_type, single, None)?
            };
            let id = g.add_getitem(travel, &identity)?;
            let eq = g.add_scalar_op(id, &format!("{{0}} = {param}"), "id", &[param])?;
            g.add_filter(travel, eq, true)
        })?;
        debug!(object_type, vertex = %filtered, "query.by_id");
        let name = self.resolver().singular_name(object_type);
        Ok(self.spawn(
            Spawn::new(filtered, QueryKind::Object, true)
                .object_type(object_type)
                .names(vec![name]),
        ))
    }

    /// Like [`Self::traverse_by_object_index`] but for a set of ids, unwound
    /// so the filter runs once per supplied id.
    pub(crate) fn traverse_by_object_indexes(&self, object_type: &str, values: Vec<Value>) -> Result<QueryHandle<'s>> {
        let (path, single) = self.path_from_here(object_type)?;
        let identity = self.identity_of(object_type);
        let node = self.node();
        let count = values.len();
        let filtered = self.graph(|g| {
            let param = g.add_parameter(Value::List(values));
            let one_id = g.add_unwind_parameter(node, &param)?;
            let travel = g.add_traversal(node, &path, object_type, single, Some(one_id))?;
            let id = g.add_getitem(travel, &identity)?;
            let (eq, _) = g.add_combining_op("{0} = {1}", "ids", &[id, one_id], &[])?;
            g.add_filter(travel, eq, true)
        })?;
        debug!(object_type, ids = count, vertex = %filtered, "query.by_ids");
        let name = self.resolver().singular_name(object_type);
        Ok(self.spawn(
            Spawn::new(filtered, QueryKind::Object, true)
                .object_type(object_type)
                .names(vec![name]),
        ))
    }

    /// Binds an in-memory table and ranges over its rows.
    pub fn table_variable(&self, table: TableValue) -> Result<QueryHandle<'s>> {
        if !matches!(self.kind(), QueryKind::Root) {
            return Err(self.wrong_kind("table_variable"));
        }
        let columns = table.columns.clone();
        let rows = table.rows.len();
        let node = self.node();
        let unwound = self.graph(|g| {
            let param = g.add_parameter(Value::Table(table));
            g.add_unwind_parameter(node, &param)
        })?;
        debug!(columns = columns.len(), rows, vertex = %unwound, "query.table_variable");
        Ok(self.spawn(
            Spawn::new(unwound, QueryKind::TableVariable { columns }, false)
                .names(vec!["table".to_owned()]),
        ))
    }

    /// Starts a plural traversal from the root, or follows a path from an
    /// object handle. Singular requests fail unless the path is singular.
    pub fn traverse_to(&self, object_type: &str, want_single: bool) -> Result<QueryHandle<'s>> {
        let result = match self.kind() {
            QueryKind::Root if want_single => {
                let (object_type, _) = self.normalise_object(object_type)?;
                Err(QueryError::SingularStart {
                    plural: self.resolver().plural_name(&object_type),
                    object: object_type,
                })
            }
            QueryKind::Root => {
                let (object_type, _) = self.normalise_object(object_type)?;
                let plural = self.resolver().plural_name(&object_type);
                self.root_traverse(&plural)
            }
            QueryKind::Object => self.object_traverse(object_type, want_single),
            QueryKind::TableVariable { .. } => Err(self.unsupported("traverse_to")),
            _ => Err(self.wrong_kind("traverse_to")),
        };
        traced("traverse_to", result)
    }

    /// Resolves `name` against the schema: an attribute, an object type, or a
    /// relation label, in that order. `*` and `**` select every attribute.
    pub fn get(&self, name: &str) -> Result<QueryHandle<'s>> {
        let result = match self.kind() {
            QueryKind::Root => self.root_get(name),
            QueryKind::Object => self.object_get(name),
            QueryKind::TableVariable { .. } => self.table_variable_get(name),
            QueryKind::Table { .. } => self.column(name),
            _ => Err(self.wrong_kind("get")),
        };
        traced("get", result)
    }
}
