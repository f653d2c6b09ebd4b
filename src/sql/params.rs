//! Bind values for the `Any` driver.

use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

/// A value that can be bound through `sqlx::Any` on both SQLite and PostgreSQL.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Int(i64),
    Text(String),
}

/// Bind every parameter in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &'q [BindValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    for p in params {
        query = match p {
            BindValue::Null => query.bind(Option::<String>::None),
            BindValue::Int(n) => query.bind(*n),
            BindValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}
