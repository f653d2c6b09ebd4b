//! Analytic model config: table definitions read from the dynamic config directory.

mod loader;
mod types;
mod validator;

pub use loader::{config_path, load_files, load_model, parse, TABLES_DIR};
pub use types::*;
pub use validator::{validate, validate_table};

use crate::entity::{FieldKind, PROFILE_FIELDS, PROFILE_TABLE};
use std::collections::HashMap;

/// Physical tables an analytic table may aggregate, with their column kinds.
#[derive(Clone, Debug, Default)]
pub struct PhysicalCatalog {
    tables: HashMap<String, HashMap<String, FieldKind>>,
}

impl PhysicalCatalog {
    /// The `profile` table.
    pub fn profiles() -> Self {
        let mut columns: HashMap<String, FieldKind> = PROFILE_FIELDS
            .iter()
            .map(|f| (f.column.to_string(), f.kind))
            .collect();
        columns.insert("id".into(), FieldKind::Text);
        let mut tables = HashMap::new();
        tables.insert(PROFILE_TABLE.to_string(), columns);
        PhysicalCatalog { tables }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn column(&self, table: &str, column: &str) -> Option<FieldKind> {
        self.tables.get(table)?.get(column).copied()
    }
}

/// Every validated analytic table, in file then declaration order.
#[derive(Clone, Debug, Default)]
pub struct AnalyticModel {
    tables: Vec<AnalyticTable>,
}

impl AnalyticModel {
    pub fn new(tables: Vec<AnalyticTable>) -> Self {
        AnalyticModel { tables }
    }

    pub fn tables(&self) -> &[AnalyticTable] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&AnalyticTable> {
        self.tables.iter().find(|t| t.name == name)
    }
}
