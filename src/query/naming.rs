//! Column naming and small syntax helpers shared by the handle kinds.

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::query::errors::{QueryError, Result};
use crate::query::value::ValueKind;

/// One column awaiting a display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameSlot {
    /// Name supplied by the caller, never rewritten.
    pub explicit: Option<String>,
    /// Logical name of the attribute the column reads.
    pub factor: String,
    /// Object type owning the attribute, used as the first fallback.
    pub object_type: Option<String>,
}

impl NameSlot {
    /// Slot with no caller-supplied name.
    pub fn implicit(factor: impl Into<String>, object_type: Option<&str>) -> Self {
        Self {
            explicit: None,
            factor: factor.into(),
            object_type: object_type.map(str::to_owned),
        }
    }

    /// Slot carrying a caller-supplied name.
    pub fn named(name: impl Into<String>, factor: impl Into<String>) -> Self {
        Self {
            explicit: Some(name.into()),
            factor: factor.into(),
            object_type: None,
        }
    }
}

fn counts<'a>(names: impl Iterator<Item = &'a String>) -> FxHashMap<&'a str, usize> {
    let mut counts = FxHashMap::default();
    for name in names {
        *counts.entry(name.as_str()).or_insert(0) += 1;
    }
    counts
}

fn all_distinct(names: &[String]) -> bool {
    let mut seen = FxHashSet::default();
    names.iter().all(|n| seen.insert(n.as_str()))
}

/// Resolves a pairwise-distinct display name for every slot.
///
/// Absent names are filled with the factor name. While collisions remain,
/// implicit colliding names fall back to their object type and then to
/// `<factor><n>` where `n` counts earlier occurrences of the same factor.
/// Caller-supplied names are preserved; a repeated caller-supplied name keeps
/// its first occurrence and suffixes the rest.
pub fn process_names(slots: &[NameSlot]) -> Vec<String> {
    let mut names: Vec<String> = slots
        .iter()
        .map(|s| s.explicit.clone().unwrap_or_else(|| s.factor.clone()))
        .collect();
    if all_distinct(&names) {
        return names;
    }

    let colliding: Vec<bool> = {
        let counts = counts(names.iter());
        names.iter().map(|n| counts[n.as_str()] > 1).collect()
    };
    for (idx, slot) in slots.iter().enumerate() {
        if slot.explicit.is_none() && colliding[idx] {
            if let Some(object_type) = &slot.object_type {
                names[idx] = object_type.clone();
            }
        }
    }
    if all_distinct(&names) {
        return names;
    }

    let counts: FxHashMap<String, usize> = counts(names.iter())
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();
    let mut taken: FxHashSet<String> = names
        .iter()
        .filter(|n| counts[n.as_str()] == 1)
        .cloned()
        .collect();
    taken.extend(slots.iter().filter_map(|s| s.explicit.clone()));
    let mut occurrences: FxHashMap<String, usize> = FxHashMap::default();
    let mut kept_explicit: FxHashSet<String> = FxHashSet::default();

    for (idx, slot) in slots.iter().enumerate() {
        if counts[names[idx].as_str()] == 1 {
            continue;
        }
        if let Some(explicit) = &slot.explicit {
            if kept_explicit.insert(explicit.clone()) {
                continue;
            }
        }
        let base = match &slot.explicit {
            Some(explicit) => explicit.clone(),
            None => slot.factor.clone(),
        };
        let counter = occurrences.entry(base.clone()).or_insert(0);
        let mut candidate = format!("{base}{counter}");
        while taken.contains(&candidate) {
            *counter += 1;
            candidate = format!("{base}{counter}");
        }
        *counter += 1;
        taken.insert(candidate.clone());
        names[idx] = candidate;
    }
    names
}

/// How a string literal compares against an attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StringMatch {
    /// Plain equality against the (unquoted) literal.
    Literal(String),
    /// Regular-expression match against the pattern.
    Pattern(String),
}

/// Classifies a string literal used in an equality test. `/…/` delimits a
/// pattern; an unquoted `*` is a glob; quotes force a literal.
pub fn string_match(value: &str) -> Result<StringMatch> {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        return Ok(StringMatch::Literal(value[1..value.len() - 1].to_owned()));
    }
    let pattern = if value.len() >= 2 && value.starts_with('/') && value.ends_with('/') {
        value[1..value.len() - 1].to_owned()
    } else if value.contains('*') {
        regex::escape(value).replace(r"\*", ".*")
    } else {
        return Ok(StringMatch::Literal(value.to_owned()));
    };
    Regex::new(&pattern).map_err(|err| QueryError::InvalidPattern {
        pattern: value.to_owned(),
        message: err.to_string(),
    })?;
    Ok(StringMatch::Pattern(pattern))
}

/// Template converting a `from` value into `to`, if the pair needs one.
/// Pairs absent from the table are left to the database.
pub fn coercion(from: ValueKind, to: ValueKind) -> Option<&'static str> {
    use ValueKind::*;
    match (from, to) {
        (Boolean, Integer) | (Boolean, Number) => Some("toInteger({})"),
        (Integer, Float) => Some("toFloat({})"),
        (Integer, Boolean) => Some("toBoolean({})"),
        (Float, Boolean) | (Number, Boolean) => Some("toBoolean(toInteger({}))"),
        _ => None,
    }
}

/// Wraps `expr` in the coercion from `from` to `to`, if any.
pub fn coerce(expr: &str, from: Option<ValueKind>, to: ValueKind) -> String {
    match from.and_then(|from| coercion(from, to)) {
        Some(template) => template.replacen("{}", expr, 1),
        None => expr.to_owned(),
    }
}

/// Target kind two operands are coerced to before arithmetic, with the kind
/// of the result.
pub fn arithmetic_kind(left: Option<ValueKind>, right: Option<ValueKind>) -> Option<ValueKind> {
    use ValueKind::*;
    match (left, right) {
        (Some(Float), _) | (_, Some(Float)) => Some(Float),
        (Some(Integer | Boolean), Some(Integer | Boolean)) => Some(Integer),
        (Some(Number), _) | (_, Some(Number)) => Some(Number),
        (Some(String), Some(String)) => Some(String),
        (Some(kind), None) | (None, Some(kind)) => Some(match kind {
            Boolean => Integer,
            other => other,
        }),
        _ => None,
    }
}

/// Levenshtein distance capped at `max + 1`.
pub fn bounded_distance(a: &str, b: &str, max: usize) -> usize {
    let b: Vec<char> = b.chars().collect();
    let a_len = a.chars().count();
    if a_len.abs_diff(b.len()) > max {
        return max + 1;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for j in 1..=b.len() {
            let cost = usize::from(ca != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            row_min = row_min.min(curr[j]);
        }
        if row_min > max {
            return max + 1;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()].min(max + 1)
}

/// Closest candidate within `max` edits, ties broken by candidate order.
pub fn suggest<'a, I>(name: &str, candidates: I, max: usize) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    candidates
        .into_iter()
        .filter(|c| c.as_str() != name)
        .map(|c| (bounded_distance(name, c, max), c))
        .filter(|(d, _)| *d <= max)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.clone())
}
