//! Translation of contract queries into SeaQuery clauses.
//!
//! The where-clause is rendered from the shared [`Criterion`] tree so the SQL
//! matches the local backend's in-memory evaluation:
//! - contains → `LOWER(col) LIKE '%needle%' ESCAPE '\'`
//! - membership → `col IN (...)`
//! - everything else → `col = value`

use sea_orm::sea_query::{Alias, Condition, Expr, Func, Keyword, LikeExpr, Order, SimpleExpr};
use serde_json::Value;

use domain::{
    Criterion, Identifier, Record, Sort, SortOrder, CREATED_AT_FIELD, ID_FIELD,
};

/// Column assignments for INSERT and UPDATE statements
pub type Assignments = Vec<(String, SimpleExpr)>;

fn col(field: &str) -> Expr {
    Expr::col(Alias::new(field))
}

/// Always-false predicate (an empty OR)
fn never() -> SimpleExpr {
    Expr::cust("1 = 0")
}

/// Escape LIKE wildcards so the needle matches literally
pub fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Bind a JSON value. Arrays and objects are stored as JSON text.
pub fn value_expr(value: &Value) -> SimpleExpr {
    match value {
        Value::Null => SimpleExpr::Keyword(Keyword::Null),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.into(),
            (None, Some(u)) => u.into(),
            _ => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.as_str().into(),
        Value::Array(_) | Value::Object(_) => value.to_string().into(),
    }
}

fn predicate(criterion: &Criterion) -> SimpleExpr {
    match criterion {
        Criterion::Equals { field, value } => col(field).eq(value_expr(value)),
        Criterion::Contains { field, needle } => {
            let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
            Expr::expr(Func::lower(col(field))).like(LikeExpr::new(pattern).escape('\\'))
        }
        Criterion::In { field, values } => col(field).is_in(values.iter().map(value_expr)),
        Criterion::IdEquals { field, id } => col(field).eq(id.as_str()),
        // Relational searches always run over a schema allowlist
        Criterion::AnyFieldContains { .. } => never(),
        Criterion::Always | Criterion::All(_) | Criterion::Any(_) => {
            Expr::cust("1 = 1")
        }
    }
}

/// Build the WHERE condition for a criterion
pub fn where_clause(criterion: &Criterion) -> Condition {
    match criterion {
        Criterion::Always => Condition::all(),
        Criterion::All(parts) => parts
            .iter()
            .fold(Condition::all(), |cond, part| cond.add(where_clause(part))),
        Criterion::Any(parts) if parts.is_empty() => Condition::all().add(never()),
        Criterion::Any(parts) => parts
            .iter()
            .fold(Condition::any(), |cond, part| cond.add(where_clause(part))),
        leaf => Condition::all().add(predicate(leaf)),
    }
}

/// `id = ?`
pub fn id_equals(id: &Identifier) -> SimpleExpr {
    col(ID_FIELD).eq(id.as_str())
}

/// `id IN (...)`
pub fn id_in(ids: &[Identifier]) -> SimpleExpr {
    col(ID_FIELD).is_in(ids.iter().map(|id| id.as_str()))
}

/// ORDER BY for an optional sort, with `createdAt, id` tiebreakers so equal
/// keys keep insertion order.
pub fn order_by(sort: Option<&Sort>) -> Vec<(String, Order)> {
    let mut orders = Vec::with_capacity(3);
    if let Some(sort) = sort {
        let order = match sort.order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        orders.push((sort.field.clone(), order));
    }
    for tiebreaker in [CREATED_AT_FIELD, ID_FIELD] {
        if !orders.iter().any(|(field, _)| field == tiebreaker) {
            orders.push((tiebreaker.to_string(), Order::Asc));
        }
    }
    orders
}

/// Bind every field of a payload
pub fn assignments(data: &Record) -> Assignments {
    data.iter()
        .map(|(field, value)| (field.clone(), value_expr(value)))
        .collect()
}
