//! Operations on handles ranging over graph objects.

use tracing::debug;

use crate::query::errors::{QueryError, Result};
use crate::query::metadata::NameKind;
use crate::query::session::{traced, QueryHandle, QueryKind, Spawn};
use crate::query::table::TableItem;
use crate::query::value::{Value, ValueKind};
use crate::types::VertexId;

impl<'s> QueryHandle<'s> {
    pub(crate) fn object_traverse(&self, object_type: &str, want_single: bool) -> Result<QueryHandle<'s>> {
        let from = self.current_object()?.to_owned();
        let (object_type, _) = self.normalise_object(object_type)?;
        let resolver = self.resolver();
        let plural = resolver.plural_name(&object_type);
        let not_singular = || QueryError::NotSingular {
            object: object_type.clone(),
            relative_to: from.clone(),
            plural: plural.clone(),
        };
        let (path, single) = match resolver.path_and_cardinality(&from, &object_type, want_single) {
            Ok(found) => found,
            Err(QueryError::NoPath { .. }) if want_single => return Err(not_singular()),
            Err(err) => return Err(err),
        };
        if want_single && !single {
            return Err(not_singular());
        }
        let node = self.node();
        let traversed = self.graph(|g| g.add_traversal(node, &path, &object_type, single, None))?;
        debug!(object_type = %object_type, vertex = %traversed, single, "query.traverse");
        let name = if want_single {
            object_type.clone()
        } else {
            plural.clone()
        };
        Ok(self.spawn(
            Spawn::new(traversed, QueryKind::Object, single)
                .object_type(object_type)
                .names(vec![name]),
        ))
    }

    /// Reads `attribute` from this object without consulting ownership.
    pub(crate) fn direct_attribute(
        &self,
        attribute: &str,
        want_single: bool,
        index_node: Option<VertexId>,
    ) -> Result<QueryHandle<'s>> {
        let object_type = self.current_object()?.to_owned();
        let resolver = self.resolver();
        let product = resolver.is_product_attribute(attribute, &object_type);
        let attribute = resolver.singular_name(attribute);
        let node = self.node();
        let read = self.graph(|g| g.add_getitem(node, &attribute))?;
        debug!(object_type = %object_type, attribute = %attribute, vertex = %read, product, "query.select_attribute");
        let spawn = if product {
            Spawn::new(
                read,
                QueryKind::ProductAttribute {
                    factor_name: attribute.clone(),
                },
                want_single,
            )
            .is_products(vec![true])
        } else {
            let value_kind = resolver.attribute_kind(&object_type, &attribute);
            Spawn::new(
                read,
                QueryKind::Attribute {
                    factor_name: attribute.clone(),
                    value_kind,
                },
                want_single,
            )
        };
        let mut spawn = spawn.names(vec![attribute]);
        if let Some(index) = index_node {
            spawn = spawn.index_node(index);
        }
        Ok(self.spawn(spawn))
    }

    /// Selects `attribute`, traversing to the object type that owns it when
    /// this one does not.
    pub fn select_attribute(&self, attribute: &str, want_single: bool) -> Result<QueryHandle<'s>> {
        let result = match self.kind() {
            QueryKind::Object => self.owned_attribute(attribute, Some(want_single)),
            QueryKind::TableVariable { .. } => self.table_variable_get(attribute),
            _ => Err(self.wrong_kind("select_attribute")),
        };
        traced("select_attribute", result)
    }

    /// Resolves the owner of `attribute`. An explicit `want_single` must be
    /// provable from both the owner path and the attribute's written form.
    fn owned_attribute(&self, attribute: &str, want_single: Option<bool>) -> Result<QueryHandle<'s>> {
        let object_type = self.current_object()?;
        let owner = self
            .resolver()
            .owning_object_type(Some(object_type), attribute)
            .map_err(|err| self.session().suggest(err))?;
        if want_single == Some(true) && !(owner.object_is_singular && owner.attribute_is_singular) {
            let resolver = self.resolver();
            let plural = if owner.attribute_is_singular {
                resolver.plural_name(&owner.object_type)
            } else {
                attribute.to_owned()
            };
            return Err(QueryError::NotSingular {
                object: resolver.singular_name(attribute),
                relative_to: object_type.to_owned(),
                plural,
            });
        }
        let want_single = want_single.unwrap_or(owner.attribute_is_singular);
        if owner.object_type == object_type {
            return self.direct_attribute(attribute, want_single, None);
        }
        self.object_traverse(&owner.object_type, owner.object_is_singular)?
            .direct_attribute(attribute, want_single, Some(self.node()))
    }

    pub(crate) fn object_get(&self, name: &str) -> Result<QueryHandle<'s>> {
        match name {
            "*" => return self.select_all(),
            "**" => return self.select_all_reachable(),
            _ => {}
        }
        let object_type = self.current_object()?.to_owned();
        let resolver = self.resolver();
        match resolver.classify(name) {
            NameKind::Attribute => self.owned_attribute(name, None),
            NameKind::ObjectType {
                object_type: target,
                singular,
            } => {
                if target == object_type {
                    Ok(self.clone())
                } else {
                    self.object_traverse(&target, singular)
                }
            }
            NameKind::Relation { owners } => {
                let singular = resolver.singular_name(name);
                let want_single = singular == name;
                if owners.iter().any(|o| *o == object_type) {
                    return self.traverse_to_relative(&singular, want_single);
                }
                match owners.as_slice() {
                    [owner] => self.object_traverse(owner, want_single)?.object_get(name),
                    _ => Err(QueryError::AmbiguousName {
                        name: singular,
                        owners,
                    }),
                }
            }
            NameKind::Unknown => Err(self
                .session()
                .suggest(QueryError::unknown(name, Some(&object_type)))),
        }
    }

    /// Keeps the one object whose identity attribute equals `value`.
    pub fn by_id(&self, value: impl Into<Value>) -> Result<QueryHandle<'s>> {
        let result = self.delegate_to_previous("by_id").and_then(|(previous, object_type)| {
            previous.traverse_by_object_index(&object_type, value.into())
        });
        traced("by_id", result)
    }

    /// Keeps the objects whose identity is one of `values`, once per id.
    pub fn by_ids<I, V>(&self, values: I) -> Result<QueryHandle<'s>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let result = self.delegate_to_previous("by_ids").and_then(|(previous, object_type)| {
            previous.traverse_by_object_indexes(&object_type, values)
        });
        traced("by_ids", result)
    }

    fn delegate_to_previous(&self, operation: &'static str) -> Result<(QueryHandle<'s>, String)> {
        if !matches!(self.kind(), QueryKind::Object) {
            return Err(self.wrong_kind(operation));
        }
        let object_type = self.current_object()?.to_owned();
        let previous = self.previous().ok_or_else(|| self.wrong_kind(operation))?;
        Ok((previous, object_type))
    }

    /// Follows the relation labelled `label` rather than the shortest path
    /// to its target type.
    pub fn traverse_to_relative(&self, label: &str, want_single: bool) -> Result<QueryHandle<'s>> {
        if !matches!(self.kind(), QueryKind::Object) {
            return Err(self.unsupported("traverse_to_relative"));
        }
        let object_type = self.current_object()?.to_owned();
        let relation = self
            .resolver()
            .relation_by_label(&object_type, label)?;
        let single = relation.path.is_singular();
        if want_single && !single {
            return Err(QueryError::NotSingular {
                plural: self.resolver().plural_name(&relation.target),
                object: relation.target,
                relative_to: object_type,
            });
        }
        let key = self.options().relation_label_key.clone();
        let label_value = self.resolver().singular_name(label);
        let node = self.node();
        let target = relation.target.clone();
        let filtered = self.graph(|g| {
            let travelled = g.add_traversal(node, &relation.path, &target, single, None)?;
            let relation_id = g.add_getitem(travelled, &key)?;
            let param = g.add_parameter(Value::String(label_value));
            let eq = g.add_scalar_op(relation_id, &format!("{{0}} = {param}"), "rel_id", &[param])?;
            g.add_filter(travelled, eq, true)
        })?;
        debug!(object_type = %target, label, vertex = %filtered, single, "query.traverse_relative");
        Ok(self.spawn(
            Spawn::new(filtered, QueryKind::Object, single)
                .object_type(target)
                .names(vec![label.to_owned()]),
        ))
    }

    /// Keeps the objects for which the boolean `mask` is true.
    pub fn filter(&self, mask: &QueryHandle<'_>) -> Result<QueryHandle<'s>> {
        let result = self.filter_inner(mask);
        traced("filter", result)
    }

    fn filter_inner(&self, mask: &QueryHandle<'_>) -> Result<QueryHandle<'s>> {
        self.same_session(mask)?;
        check_boolean_mask(mask)?;
        match self.kind() {
            QueryKind::Object => {}
            QueryKind::Attribute { .. } => return self.attribute_filter(mask),
            QueryKind::ProductAttribute { factor_name } => {
                return Err(QueryError::ProductArithmetic {
                    attribute: factor_name.clone(),
                })
            }
            _ => return Err(self.unsupported("filter")),
        }
        let node = self.node();
        let predicate = mask.node();
        let filtered = self.graph(|g| g.add_filter(node, predicate, false))?;
        debug!(vertex = %filtered, predicate = %predicate, "query.filter");
        Ok(self.spawn(
            Spawn::new(filtered, QueryKind::Object, self.is_single()).names(self.names().to_vec()),
        ))
    }

    /// Representative attribute: the identity, the sole attribute, or the
    /// conventional value attribute.
    pub fn default_attribute(&self) -> Result<QueryHandle<'s>> {
        let result = self.default_attribute_inner();
        traced("default_attribute", result)
    }

    fn default_attribute_inner(&self) -> Result<QueryHandle<'s>> {
        match self.kind() {
            QueryKind::Object => {}
            QueryKind::Attribute { .. } | QueryKind::ProductAttribute { .. } => return Ok(self.clone()),
            _ => return Err(self.wrong_kind("default_attribute")),
        }
        let object_type = self.current_object()?;
        let resolver = self.resolver();
        let attributes = resolver.attributes_of(object_type)?;
        let chosen = if let Some(identity) = resolver.identity_attribute(object_type) {
            identity
        } else if let [only] = attributes.as_slice() {
            only.clone()
        } else if attributes.iter().any(|a| *a == self.options().value_attribute) {
            self.options().value_attribute.clone()
        } else {
            return Err(QueryError::NoDefaultAttribute {
                object: object_type.to_owned(),
            });
        };
        self.direct_attribute(&chosen, true, None)
    }

    /// Compares the object's identity, name, or value attribute with `value`.
    pub fn object_eq(&self, value: impl Into<Value>) -> Result<QueryHandle<'s>> {
        let result = self.object_eq_inner(value.into());
        traced("eq", result)
    }

    fn object_eq_inner(&self, value: Value) -> Result<QueryHandle<'s>> {
        let object_type = self.current_object()?;
        let resolver = self.resolver();
        let attributes = resolver.attributes_of(object_type)?;
        let candidate = match resolver.identity_attribute(object_type) {
            Some(identity) => identity,
            None => self
                .options()
                .comparison_candidates()
                .into_iter()
                .find(|c| attributes.iter().any(|a| a == *c))
                .map(str::to_owned)
                .ok_or_else(|| QueryError::NoComparableAttribute {
                    object: object_type.to_owned(),
                })?,
        };
        self.direct_attribute(&candidate, true, None)?.eq(value)
    }

    /// Table of every attribute declared directly on this object type.
    pub fn select_all(&self) -> Result<QueryHandle<'s>> {
        let names = match self.kind() {
            QueryKind::Object => self.resolver().attributes_of(self.current_object()?)?,
            QueryKind::TableVariable { columns } => columns.clone(),
            _ => return Err(self.wrong_kind("select_all")),
        };
        let items = names.into_iter().map(TableItem::Name).collect();
        self.build_table(items, true)
    }

    /// Table of every attribute declared on this object type and on every
    /// type reachable from it through singular paths.
    pub fn select_all_reachable(&self) -> Result<QueryHandle<'s>> {
        if !matches!(self.kind(), QueryKind::Object) {
            return self.select_all();
        }
        let object_type = self.current_object()?.to_owned();
        let resolver = self.resolver();
        let mut items: Vec<TableItem<'s>> = resolver
            .attributes_of(&object_type)?
            .into_iter()
            .map(TableItem::Name)
            .collect();
        for other in resolver.object_types() {
            if other == object_type {
                continue;
            }
            match resolver.path_and_cardinality(&object_type, &other, true) {
                Ok((_, true)) => {}
                _ => continue,
            }
            let attributes = resolver.attributes_of(&other)?;
            if attributes.is_empty() {
                continue;
            }
            let hop = self.object_traverse(&other, true)?;
            for attribute in attributes {
                let column = hop.direct_attribute(&attribute, true, Some(self.node()))?;
                items.push(TableItem::Renamed(
                    format!("{other}.{attribute}"),
                    Box::new(TableItem::Query(column)),
                ));
            }
        }
        self.build_table(items, false)
    }

    pub(crate) fn table_variable_get(&self, column: &str) -> Result<QueryHandle<'s>> {
        let QueryKind::TableVariable { columns } = self.kind() else {
            return Err(self.wrong_kind("column"));
        };
        match column {
            "*" | "**" => return self.select_all(),
            _ => {}
        }
        if !columns.iter().any(|c| c == column) {
            return Err(QueryError::UnknownColumn {
                column: column.to_owned(),
                columns: columns.clone(),
            });
        }
        let node = self.node();
        let read = self.graph(|g| g.add_getitem(node, column))?;
        Ok(self.spawn(
            Spawn::new(
                read,
                QueryKind::Attribute {
                    factor_name: column.to_owned(),
                    value_kind: None,
                },
                true,
            )
            .names(vec![column.to_owned()]),
        ))
    }
}

pub(crate) fn check_boolean_mask(mask: &QueryHandle<'_>) -> Result<()> {
    match mask.kind() {
        QueryKind::Attribute {
            value_kind: None | Some(ValueKind::Boolean),
            ..
        } => Ok(()),
        QueryKind::Attribute {
            factor_name,
            value_kind: Some(kind),
        } => Err(QueryError::NonBooleanMask {
            attribute: factor_name.clone(),
            found: kind.to_string(),
        }),
        QueryKind::ProductAttribute { factor_name } => Err(QueryError::NonBooleanMask {
            attribute: factor_name.clone(),
            found: "a binary product".to_owned(),
        }),
        other => Err(QueryError::WrongKind {
            operation: "filter",
            found: other.name(),
        }),
    }
}
