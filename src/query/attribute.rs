//! Arithmetic, comparison, and logic on attribute handles.
//!
//! Every operator appends one operation vertex. Literal operands become graph
//! parameters; handle operands must share an anchor with `self`.

use tracing::debug;

use crate::query::errors::{QueryError, Result};
use crate::query::naming::{self, StringMatch};
use crate::query::session::{traced, QueryHandle, QueryKind, Spawn};
use crate::query::value::{Value, ValueKind};
use crate::types::VertexId;

/// Right-hand side of an operator: another handle or a literal.
#[derive(Clone, Debug)]
pub enum Operand<'s> {
    /// A handle from the same session.
    Query(QueryHandle<'s>),
    /// A literal registered as a parameter.
    Value(Value),
}

impl Operand<'_> {
    fn kind(&self) -> Option<ValueKind> {
        match self {
            Operand::Query(handle) => handle.value_kind(),
            Operand::Value(value) => value.kind(),
        }
    }
}

impl<'s> From<QueryHandle<'s>> for Operand<'s> {
    fn from(handle: QueryHandle<'s>) -> Self {
        Operand::Query(handle)
    }
}

impl<'s> From<&QueryHandle<'s>> for Operand<'s> {
    fn from(handle: &QueryHandle<'s>) -> Self {
        Operand::Query(handle.clone())
    }
}

impl From<Value> for Operand<'_> {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Operand<'_> {
            fn from(value: $ty) -> Self {
                Operand::Value(Value::from(value))
            }
        })*
    };
}

literal_operand!(bool, i32, i64, f64, &str, String);

/// Expected operand kind and result kind of one operator.
#[derive(Clone, Copy, Debug)]
struct Typing {
    expected: Option<ValueKind>,
    returns: Option<ValueKind>,
}

impl Typing {
    const fn new(expected: Option<ValueKind>, returns: Option<ValueKind>) -> Self {
        Self { expected, returns }
    }
}

const NUMBER: Typing = Typing::new(None, None);
const COMPARISON: Typing = Typing::new(None, Some(ValueKind::Boolean));
const DIVISION: Typing = Typing::new(Some(ValueKind::Float), Some(ValueKind::Float));
const LOGIC: Typing = Typing::new(Some(ValueKind::Boolean), Some(ValueKind::Boolean));
const BITWISE: Typing = Typing::new(None, Some(ValueKind::Integer));

impl<'s> QueryHandle<'s> {
    fn check_operable(&self) -> Result<()> {
        match self.kind() {
            QueryKind::Attribute { .. } => Ok(()),
            QueryKind::ProductAttribute { factor_name } => Err(QueryError::ProductArithmetic {
                attribute: factor_name.clone(),
            }),
            QueryKind::Object => Err(QueryError::ObjectArithmetic {
                object: self.object_type().unwrap_or_default().to_owned(),
            }),
            other => Err(QueryError::WrongKind {
                operation: "arithmetic",
                found: other.name(),
            }),
        }
    }

    /// Emits `template` over `self` and `others`. Placeholders `{0}`, `{1}`,
    /// … refer to `self` then each operand in order; literal operands are
    /// substituted with their parameter names.
    fn perform(
        &self,
        template: &str,
        name: &str,
        others: Vec<Operand<'s>>,
        typing: Typing,
    ) -> Result<QueryHandle<'s>> {
        self.check_operable()?;
        for other in &others {
            if let Operand::Query(handle) = other {
                self.same_session(handle)?;
                handle.check_operable()?;
            }
        }
        let target = typing.expected.or_else(|| {
            others
                .iter()
                .fold(self.value_kind(), |acc, o| naming::arithmetic_kind(acc, o.kind()))
        });
        let returns = typing.returns.or(target);

        let node = self.node();
        let mut vertices: Vec<VertexId> = vec![node];
        let mut literals: Vec<Value> = Vec::new();
        let mut slots: Vec<Slot> = vec![Slot::Vertex(0, self.value_kind())];
        for other in others {
            match other {
                Operand::Query(handle) => {
                    slots.push(Slot::Vertex(vertices.len(), handle.value_kind()));
                    vertices.push(handle.node());
                }
                Operand::Value(value) => {
                    slots.push(Slot::Literal(literals.len(), value.kind()));
                    literals.push(value);
                }
            }
        }

        let (result, anchor) = self.graph(|g| {
            let params: Vec<String> = literals.into_iter().map(|v| g.add_parameter(v)).collect();
            let rendered: Vec<String> = slots
                .iter()
                .map(|slot| {
                    let (expr, kind) = match slot {
                        Slot::Vertex(idx, kind) => (format!("{{{idx}}}"), *kind),
                        Slot::Literal(idx, kind) => (params[*idx].clone(), *kind),
                    };
                    match target {
                        Some(target) => naming::coerce(&expr, kind, target),
                        None => expr,
                    }
                })
                .collect();
            let text = render(template, &rendered);
            if vertices.len() == 1 {
                let op = g.add_scalar_op(node, &text, name, &params)?;
                Ok((op, g.cardinal(node)))
            } else {
                g.add_combining_op(&text, name, &vertices, &params)
            }
        })?;
        debug!(operation = name, vertex = %result, anchor = %anchor, "query.combine");
        Ok(self.spawn(
            Spawn::new(
                result,
                QueryKind::Attribute {
                    factor_name: name.to_owned(),
                    value_kind: returns,
                },
                true,
            )
            .names(vec![name.to_owned()])
            .index_node(anchor),
        ))
    }

    fn binary(&self, symbol: &str, other: Operand<'s>, typing: Typing) -> Result<QueryHandle<'s>> {
        let template = format!("{{0}} {symbol} {{1}}");
        self.perform(&template, symbol, vec![other], typing)
    }

    fn unary(&self, function: &str, typing: Typing) -> Result<QueryHandle<'s>> {
        let template = format!("{function}({{0}})");
        self.perform(&template, function, Vec::new(), typing)
    }

    fn logic(&self, word: &str, symbol: &str, other: Operand<'s>) -> Result<QueryHandle<'s>> {
        let integers = self.value_kind() == Some(ValueKind::Integer)
            && other.kind() == Some(ValueKind::Integer);
        if integers {
            let template = format!("apoc.bitwise.op({{0}}, \"{symbol}\", {{1}})");
            self.perform(&template, symbol, vec![other], BITWISE)
        } else {
            self.binary(word, other, LOGIC)
        }
    }

    /// `self + other`.
    pub fn add(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("add", self.binary("+", other.into(), NUMBER))
    }

    /// `self - other`.
    pub fn sub(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("sub", self.binary("-", other.into(), NUMBER))
    }

    /// `self * other`.
    pub fn mul(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("mul", self.binary("*", other.into(), NUMBER))
    }

    /// `self / other`, always in floating point.
    pub fn div(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("div", self.binary("/", other.into(), DIVISION))
    }

    /// `self = other`. String literals written as `/pattern/` or containing an
    /// unquoted `*` compile to a pattern match.
    pub fn eq(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        let other = other.into();
        let result = match other {
            Operand::Value(Value::String(text)) => match naming::string_match(&text) {
                Ok(StringMatch::Pattern(pattern)) => {
                    self.binary("=~", Operand::Value(Value::String(pattern)), COMPARISON)
                }
                Ok(StringMatch::Literal(literal)) => {
                    self.binary("=", Operand::Value(Value::String(literal)), COMPARISON)
                }
                Err(err) => Err(err),
            },
            other => self.binary("=", other, COMPARISON),
        };
        traced("eq", result)
    }

    /// `self <> other`.
    pub fn ne(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("ne", self.binary("<>", other.into(), COMPARISON))
    }

    /// `self < other`.
    pub fn lt(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("lt", self.binary("<", other.into(), COMPARISON))
    }

    /// `self <= other`.
    pub fn le(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("le", self.binary("<=", other.into(), COMPARISON))
    }

    /// `self > other`.
    pub fn gt(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("gt", self.binary(">", other.into(), COMPARISON))
    }

    /// `self >= other`.
    pub fn ge(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("ge", self.binary(">=", other.into(), COMPARISON))
    }

    /// Logical (or bitwise, for two integers) and.
    pub fn and(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("and", self.logic("and", "&", other.into()))
    }

    /// Logical (or bitwise, for two integers) or.
    pub fn or(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("or", self.logic("or", "|", other.into()))
    }

    /// Logical (or bitwise, for two integers) exclusive or.
    pub fn xor(&self, other: impl Into<Operand<'s>>) -> Result<QueryHandle<'s>> {
        traced("xor", self.logic("xor", "^", other.into()))
    }

    /// Logical negation.
    pub fn not(&self) -> Result<QueryHandle<'s>> {
        traced("not", self.unary("not", LOGIC))
    }

    /// Arithmetic negation.
    pub fn neg(&self) -> Result<QueryHandle<'s>> {
        traced("neg", self.perform("-{0}", "neg", Vec::new(), NUMBER))
    }

    /// Absolute value.
    pub fn abs(&self) -> Result<QueryHandle<'s>> {
        traced("abs", self.unary("abs", NUMBER))
    }

    /// Smallest integer not below the value.
    pub fn ceil(&self) -> Result<QueryHandle<'s>> {
        traced("ceil", self.unary("ceil", NUMBER))
    }

    /// Largest integer not above the value.
    pub fn floor(&self) -> Result<QueryHandle<'s>> {
        traced("floor", self.unary("floor", NUMBER))
    }

    /// Rounds to `digits` decimal places.
    pub fn round(&self, digits: u32) -> Result<QueryHandle<'s>> {
        let template = format!("round({{0}}, {digits})");
        let name = format!("round{digits}");
        traced("round", self.perform(&template, &name, Vec::new(), NUMBER))
    }

    /// Keeps values where the boolean `mask` is true; the result is anchored
    /// at its own vertex.
    pub(crate) fn attribute_filter(&self, mask: &QueryHandle<'_>) -> Result<QueryHandle<'s>> {
        let QueryKind::Attribute {
            factor_name,
            value_kind,
        } = self.kind().clone()
        else {
            return Err(self.wrong_kind("filter"));
        };
        let operands = [self.node(), mask.node()];
        let (filtered, anchor) = self.graph(|g| {
            g.add_combining_op(
                "CASE WHEN toBoolean(toInteger({1})) THEN {0} ELSE null END",
                "op-filter",
                &operands,
                &[],
            )
        })?;
        debug!(vertex = %filtered, anchor = %anchor, "query.filter");
        Ok(self.spawn(
            Spawn::new(
                filtered,
                QueryKind::Attribute {
                    factor_name,
                    value_kind,
                },
                true,
            )
            .names(self.names().to_vec())
            .index_node(filtered),
        ))
    }

    /// One-column table of this attribute, grouped by its index vertex.
    pub(crate) fn precompile_attribute(&self) -> Result<QueryHandle<'s>> {
        let index = self.index_node();
        let node = self.node();
        let dropna = if index == node { vec![node] } else { Vec::new() };
        let force_plural = [!self.is_single()];
        let (table, collected, one_row) = self.graph(|g| {
            let (table, collected) = g.add_results_table(index, &[node], &force_plural, &dropna, false)?;
            let one_row = index == g.start() || g.is_singular_branch_relative_to(table, g.start());
            Ok::<_, QueryError>((table, collected, one_row))
        })?;
        debug!(vertex = %table, index = %index, one_row, "query.precompile");
        Ok(self.spawn(
            Spawn::new(
                table,
                QueryKind::Table {
                    columns: vec![self.id()],
                    collected,
                },
                self.is_single(),
            )
            .names(self.names().to_vec())
            .is_products(self.is_products().to_vec())
            .index_node(index)
            .one_row(one_row)
            .one_column(true),
        ))
    }
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Vertex(usize, Option<ValueKind>),
    Literal(usize, Option<ValueKind>),
}

/// Substitutes `{n}` placeholders with `parts[n]`; unknown placeholders are
/// kept as written.
fn render(template: &str, parts: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => match after[..close].parse::<usize>() {
                Ok(idx) if idx < parts.len() => {
                    out.push_str(&parts[idx]);
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
