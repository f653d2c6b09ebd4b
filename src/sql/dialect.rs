//! SQL dialects. The dialect changes generated query text, never the query shape.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SqlDialect {
    /// Embedded SQLite, used for the in-memory database.
    #[serde(rename = "sqlite")]
    Embedded,
    /// External PostgreSQL-class server.
    #[serde(rename = "postgres")]
    Postgres,
}

impl SqlDialect {
    /// Dialect name as reported in metadata and logs.
    pub fn dialect_type(&self) -> &'static str {
        match self {
            SqlDialect::Embedded => "sqlite",
            SqlDialect::Postgres => "postgres",
        }
    }

    /// Detect the dialect from a connection URL (after any `jdbc:` prefix is stripped).
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.strip_prefix("jdbc:").unwrap_or(url);
        if url.starts_with("sqlite:") {
            Some(SqlDialect::Embedded)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(SqlDialect::Postgres)
        } else {
            None
        }
    }

    /// Bind placeholder for the 1-based parameter `n`.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            SqlDialect::Embedded => format!("?{}", n),
            SqlDialect::Postgres => format!("${}", n),
        }
    }

    /// Case-insensitive substring predicate; the bound value is a `%..%` pattern escaped with `\`.
    pub fn contains_ci(&self, column: &str, placeholder: &str) -> String {
        match self {
            SqlDialect::Embedded => format!("LOWER({}) LIKE LOWER({}) ESCAPE '\\'", column, placeholder),
            SqlDialect::Postgres => format!("{} ILIKE {} ESCAPE '\\'", column, placeholder),
        }
    }

    /// Floating point type used to cast averages so every driver decodes them as f64.
    pub fn float_type(&self) -> &'static str {
        match self {
            SqlDialect::Embedded => "REAL",
            SqlDialect::Postgres => "DOUBLE PRECISION",
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dialect_type())
    }
}

/// Quote an identifier. Identifiers only ever come from the entity model or validated config.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Escape `%`, `_` and `\` and wrap in `%` for a LIKE/ILIKE substring match.
pub fn like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
