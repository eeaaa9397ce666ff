//! Backend-neutral predicate tree.
//!
//! Every backend evaluates the same [`Criterion`] built from a [`Query`]:
//! the local backend with [`Criterion::matches`], the relational backend by
//! translating it into a SQL condition. Building the tree in one place is
//! what keeps filter and search semantics identical across backends.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::is_managed_field;
use crate::error::DomainError;
use crate::identifier::Identifier;
use crate::query::{Query, SortOrder};
use crate::Record;

/// How free-text search interacts with the field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Search replaces the filter when present
    #[default]
    Override,
    /// Search and filter must both hold
    Combine,
}

impl FromStr for SearchMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "override" => Ok(SearchMode::Override),
            "combine" => Ok(SearchMode::Combine),
            other => Err(DomainError::validation(format!("unknown search mode '{}'", other))),
        }
    }
}

/// Fields a search runs over.
#[derive(Debug, Clone, Copy)]
pub enum SearchScope<'a> {
    /// Allowlisted fields of a registered schema
    Fields(&'a [String]),
    /// Every non-managed field present on the record
    AllFields,
}

/// A predicate over one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Matches every record
    Always,
    /// Field equals value (numbers compare numerically)
    Equals { field: String, value: Value },
    /// Field text contains needle, case-insensitively
    Contains { field: String, needle: String },
    /// Field equals one of the values
    In { field: String, values: Vec<Value> },
    /// Field coerced to an identifier equals `id`
    IdEquals { field: String, id: Identifier },
    /// Any non-managed field contains needle, case-insensitively
    AnyFieldContains { needle: String },
    /// All criteria hold
    All(Vec<Criterion>),
    /// At least one criterion holds
    Any(Vec<Criterion>),
}

impl Criterion {
    /// Build the constraint for a single filter entry, or `None` when the
    /// value is inert (`null` or empty string).
    pub fn for_filter_entry(field: &str, value: &Value) -> Option<Criterion> {
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(Criterion::Contains {
                field: field.to_string(),
                needle: s.clone(),
            }),
            Value::Array(values) => Some(Criterion::In {
                field: field.to_string(),
                values: values.clone(),
            }),
            other => Some(Criterion::Equals {
                field: field.to_string(),
                value: other.clone(),
            }),
        }
    }

    /// AND of every active filter entry
    pub fn from_filter(filter: &crate::Filter) -> Criterion {
        Criterion::all(
            filter
                .iter()
                .filter_map(|(field, value)| Criterion::for_filter_entry(field, value))
                .collect(),
        )
    }

    /// OR over the search scope, or `None` for an absent/empty search
    pub fn from_search(search: Option<&str>, scope: SearchScope<'_>) -> Option<Criterion> {
        let needle = search.filter(|s| !s.is_empty())?;
        Some(match scope {
            SearchScope::Fields(fields) => Criterion::Any(
                fields
                    .iter()
                    .filter(|f| !is_managed_field(f))
                    .map(|field| Criterion::Contains {
                        field: field.clone(),
                        needle: needle.to_string(),
                    })
                    .collect(),
            ),
            SearchScope::AllFields => Criterion::AnyFieldContains {
                needle: needle.to_string(),
            },
        })
    }

    /// Full criterion for a list query.
    ///
    /// `reference` is the `get_many_reference` constraint and is always kept.
    pub fn for_query(
        query: &Query,
        scope: SearchScope<'_>,
        mode: SearchMode,
        reference: Option<(&str, &Identifier)>,
    ) -> Criterion {
        let filter = Criterion::from_filter(&query.filter);
        let search = Criterion::from_search(query.search.as_deref(), scope);

        let mut parts = Vec::new();
        match (search, mode) {
            (Some(search), SearchMode::Override) => parts.push(search),
            (Some(search), SearchMode::Combine) => {
                parts.push(filter);
                parts.push(search);
            }
            (None, _) => parts.push(filter),
        }
        if let Some((field, id)) = reference {
            parts.push(Criterion::IdEquals {
                field: field.to_string(),
                id: id.clone(),
            });
        }
        Criterion::all(parts)
    }

    /// AND that collapses trivial cases
    pub fn all(criteria: Vec<Criterion>) -> Criterion {
        let mut criteria: Vec<Criterion> = criteria
            .into_iter()
            .filter(|c| *c != Criterion::Always)
            .collect();
        match criteria.len() {
            0 => Criterion::Always,
            1 => criteria.remove(0),
            _ => Criterion::All(criteria),
        }
    }

    /// Evaluate against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Criterion::Always => true,
            Criterion::Equals { field, value } => record
                .get(field)
                .is_some_and(|actual| values_equal(actual, value)),
            Criterion::Contains { field, needle } => record
                .get(field)
                .is_some_and(|actual| text_contains(actual, needle)),
            Criterion::In { field, values } => record
                .get(field)
                .is_some_and(|actual| values.iter().any(|v| values_equal(actual, v))),
            Criterion::IdEquals { field, id } => {
                record.get(field).is_some_and(|actual| id.matches(actual))
            }
            Criterion::AnyFieldContains { needle } => record
                .iter()
                .filter(|(field, _)| !is_managed_field(field))
                .any(|(_, actual)| text_contains(actual, needle)),
            Criterion::All(criteria) => criteria.iter().all(|c| c.matches(record)),
            Criterion::Any(criteria) => criteria.iter().any(|c| c.matches(record)),
        }
    }
}

/// Text form of a scalar; `None` for null, arrays and objects.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Case-insensitive substring containment
pub fn text_contains(value: &Value, needle: &str) -> bool {
    scalar_text(value).is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase()))
}

/// Equality with numeric comparison for numbers
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order used for sorting: missing/null < bool < number < string
/// < array < object.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Comparator for a sort field and direction
pub fn compare_records(a: &Record, b: &Record, field: &str, order: SortOrder) -> Ordering {
    let ordering = compare_values(a.get(field), b.get(field));
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}
