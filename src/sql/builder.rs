//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for one table in a given dialect.

use super::dialect::{like_pattern, quoted, SqlDialect};
use super::params::BindValue;

/// Table shape the builder works from: name, key column, and ordered column list.
#[derive(Clone, Copy, Debug)]
pub struct TableRef<'a> {
    pub name: &'a str,
    pub key: &'a str,
    pub columns: &'a [&'a str],
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    ContainsCi { column: String, value: String },
    Eq { column: String, value: BindValue },
    /// `column IN (..)`. Must not be empty.
    In { column: String, values: Vec<BindValue> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Record a parameter and return its placeholder.
    fn push_param(&mut self, dialect: SqlDialect, v: BindValue) -> String {
        self.params.push(v);
        dialect.placeholder(self.params.len())
    }
}

fn column_list(table: &TableRef<'_>) -> String {
    table.columns.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", ")
}

fn where_clause(dialect: SqlDialect, q: &mut QueryBuf, predicates: &[Predicate]) -> String {
    if predicates.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = predicates
        .iter()
        .map(|p| match p {
            Predicate::ContainsCi { column, value } => {
                let ph = q.push_param(dialect, BindValue::Text(like_pattern(value)));
                dialect.contains_ci(&quoted(column), &ph)
            }
            Predicate::Eq { column, value } => {
                let ph = q.push_param(dialect, value.clone());
                format!("{} = {}", quoted(column), ph)
            }
            Predicate::In { column, values } => {
                let phs: Vec<String> = values.iter().map(|v| q.push_param(dialect, v.clone())).collect();
                format!("{} IN ({})", quoted(column), phs.join(", "))
            }
        })
        .collect();
    format!(" WHERE {}", parts.join(" AND "))
}

/// SELECT by key. Single parameter: the id.
pub fn select_by_id(dialect: SqlDialect, table: &TableRef<'_>, id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(dialect, BindValue::Text(id.to_string()));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        column_list(table),
        quoted(table.name),
        quoted(table.key),
        ph
    );
    q
}

/// SELECT WHERE key IN (...). Caller chunks `ids`.
pub fn select_by_ids(dialect: SqlDialect, table: &TableRef<'_>, ids: &[String]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| q.push_param(dialect, BindValue::Text(id.clone())))
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        column_list(table),
        quoted(table.name),
        quoted(table.key),
        placeholders.join(", ")
    );
    q
}

/// SELECT list with predicates (AND), ordering (column, descending) and paging.
/// The key is always the final sort column so pages are stable.
pub fn select_list(
    dialect: SqlDialect,
    table: &TableRef<'_>,
    predicates: &[Predicate],
    order: &[(String, bool)],
    limit: Option<u32>,
    offset: Option<u32>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(dialect, &mut q, predicates);
    let mut order_parts: Vec<String> = order
        .iter()
        .map(|(c, desc)| format!("{} {}", quoted(c), if *desc { "DESC" } else { "ASC" }))
        .collect();
    if !order.iter().any(|(c, _)| c == table.key) {
        order_parts.push(format!("{} ASC", quoted(table.key)));
    }
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        column_list(table),
        quoted(table.name),
        where_sql,
        order_parts.join(", ")
    );
    if let Some(l) = limit {
        q.sql.push_str(&format!(" LIMIT {}", l));
    }
    if let Some(o) = offset.filter(|o| *o > 0) {
        if limit.is_none() {
            // SQLite requires LIMIT before OFFSET.
            q.sql.push_str(" LIMIT -1");
        }
        q.sql.push_str(&format!(" OFFSET {}", o));
    }
    q
}

/// INSERT with explicit values for every column, in `table.columns` order.
pub fn insert(dialect: SqlDialect, table: &TableRef<'_>, values: Vec<BindValue>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let placeholders: Vec<String> = values.into_iter().map(|v| q.push_param(dialect, v)).collect();
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted(table.name),
        column_list(table),
        placeholders.join(", ")
    );
    q
}

/// UPDATE every non-key column by key. `values` are in `table.columns` order, key included.
pub fn update(dialect: SqlDialect, table: &TableRef<'_>, values: Vec<BindValue>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut key_value = BindValue::Null;
    let mut sets = Vec::new();
    for (col, v) in table.columns.iter().zip(values) {
        if *col == table.key {
            key_value = v;
            continue;
        }
        let ph = q.push_param(dialect, v);
        sets.push(format!("{} = {}", quoted(col), ph));
    }
    let key_ph = q.push_param(dialect, key_value);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quoted(table.name),
        sets.join(", "),
        quoted(table.key),
        key_ph
    );
    q
}

pub fn delete(dialect: SqlDialect, table: &TableRef<'_>, id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(dialect, BindValue::Text(id.to_string()));
    q.sql = format!("DELETE FROM {} WHERE {} = {}", quoted(table.name), quoted(table.key), ph);
    q
}

/// Aggregate functions available to grouped selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// One output column of a grouped select, named by `alias`.
#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// Grouping column.
    Column { column: String, alias: String },
    Aggregate {
        function: Aggregate,
        column: Option<String>,
        alias: String,
    },
}

impl Projection {
    pub fn alias(&self) -> &str {
        match self {
            Projection::Column { alias, .. } | Projection::Aggregate { alias, .. } => alias,
        }
    }

    fn expr(&self, dialect: SqlDialect) -> String {
        match self {
            Projection::Column { column, .. } => quoted(column),
            Projection::Aggregate { function, column, .. } => {
                let arg = column.as_deref().map(quoted).unwrap_or_else(|| "*".to_string());
                match function {
                    Aggregate::Count => format!("COUNT({})", arg),
                    Aggregate::Sum => format!("CAST(SUM({}) AS BIGINT)", arg),
                    Aggregate::Avg => format!("CAST(AVG({}) AS {})", arg, dialect.float_type()),
                    Aggregate::Min => format!("MIN({})", arg),
                    Aggregate::Max => format!("MAX({})", arg),
                }
            }
        }
    }
}

/// SELECT .. GROUP BY every `Column` projection. `order` refers to aliases; without it rows
/// are ordered by the grouping columns.
pub fn select_grouped(
    dialect: SqlDialect,
    table: &str,
    projections: &[Projection],
    predicates: &[Predicate],
    order: &[(String, bool)],
    limit: u32,
    offset: u32,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let select: Vec<String> = projections
        .iter()
        .map(|p| format!("{} AS {}", p.expr(dialect), quoted(p.alias())))
        .collect();
    let where_sql = where_clause(dialect, &mut q, predicates);
    let groups: Vec<String> = projections
        .iter()
        .filter_map(|p| match p {
            Projection::Column { column, .. } => Some(quoted(column)),
            Projection::Aggregate { .. } => None,
        })
        .collect();
    q.sql = format!("SELECT {} FROM {}{}", select.join(", "), quoted(table), where_sql);
    if !groups.is_empty() {
        q.sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
    }
    let order_parts: Vec<String> = if order.is_empty() {
        groups.iter().map(|g| format!("{} ASC", g)).collect()
    } else {
        order
            .iter()
            .map(|(a, desc)| format!("{} {}", quoted(a), if *desc { "DESC" } else { "ASC" }))
            .collect()
    };
    if !order_parts.is_empty() {
        q.sql.push_str(&format!(" ORDER BY {}", order_parts.join(", ")));
    }
    q.sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
    q
}
