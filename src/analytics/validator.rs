//! Analytic config validation: identifier shape, physical references, uniqueness.

use super::{AnalyticTable, MeasureFunction, PhysicalCatalog, TableConfigFile};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

const IDENTIFIER: &str = r"^[A-Za-z][A-Za-z0-9_]*$";

fn check_identifier(re: &Regex, kind: &str, value: &str) -> Result<(), ConfigError> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("invalid {} name '{}'", kind, value)))
    }
}

/// Validate a set of config files together; table names must be unique across all of them.
pub fn validate<'a, I>(files: I, catalog: &PhysicalCatalog) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a TableConfigFile>,
{
    let mut names = HashSet::new();
    for file in files {
        for table in &file.tables {
            validate_table(table, catalog)?;
            if !names.insert(table.name.as_str()) {
                return Err(ConfigError::Validation(format!("duplicate table '{}'", table.name)));
            }
        }
    }
    Ok(())
}

pub fn validate_table(table: &AnalyticTable, catalog: &PhysicalCatalog) -> Result<(), ConfigError> {
    let re = Regex::new(IDENTIFIER).map_err(|e| ConfigError::Validation(e.to_string()))?;
    check_identifier(&re, "table", &table.name)?;
    if !catalog.has_table(&table.table) {
        return Err(ConfigError::Validation(format!(
            "table '{}' refers to unknown physical table '{}'",
            table.name, table.table
        )));
    }
    let column_exists = |column: &str| -> Result<(), ConfigError> {
        if catalog.column(&table.table, column).is_some() {
            Ok(())
        } else {
            Err(ConfigError::Validation(format!(
                "table '{}': column '{}' does not exist in '{}'",
                table.name, column, table.table
            )))
        }
    };

    let mut fields = HashSet::new();
    for d in &table.dimensions {
        check_identifier(&re, "dimension", &d.name)?;
        column_exists(&d.column)?;
        if !fields.insert(d.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "table '{}': duplicate field '{}'",
                table.name, d.name
            )));
        }
    }
    for m in &table.measures {
        check_identifier(&re, "measure", &m.name)?;
        match (m.function, &m.column) {
            (MeasureFunction::Count, None) => {}
            (MeasureFunction::Count, Some(c)) => column_exists(c)?,
            (_, Some(c)) => column_exists(c)?,
            (f, None) => {
                return Err(ConfigError::Validation(format!(
                    "table '{}': measure '{}' ({:?}) needs a column",
                    table.name, m.name, f
                )))
            }
        }
        if !fields.insert(m.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "table '{}': duplicate field '{}'",
                table.name, m.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{Dimension, Measure};

    fn table() -> AnalyticTable {
        AnalyticTable {
            name: "profileStats".into(),
            table: "profile".into(),
            description: None,
            dimensions: vec![Dimension { name: "experience".into(), column: "experience".into() }],
            measures: vec![Measure { name: "headcount".into(), function: MeasureFunction::Count, column: None }],
        }
    }

    #[test]
    fn accepts_valid_table() {
        validate_table(&table(), &PhysicalCatalog::profiles()).unwrap();
    }

    #[test]
    fn rejects_bad_identifier_and_unknown_column() {
        let catalog = PhysicalCatalog::profiles();
        let mut t = table();
        t.name = "1stats".into();
        assert!(validate_table(&t, &catalog).is_err());

        let mut t = table();
        t.dimensions[0].column = "salary".into();
        let err = validate_table(&t, &catalog).unwrap_err().to_string();
        assert!(err.contains("salary"), "{}", err);
    }

    #[test]
    fn sum_needs_a_column() {
        let mut t = table();
        t.measures.push(Measure { name: "total".into(), function: MeasureFunction::Sum, column: None });
        assert!(validate_table(&t, &PhysicalCatalog::profiles()).is_err());
    }

    #[test]
    fn names_are_unique_within_and_across_files() {
        let catalog = PhysicalCatalog::profiles();
        let mut t = table();
        t.measures[0].name = "experience".into();
        assert!(validate_table(&t, &catalog).is_err());

        let a = TableConfigFile { tables: vec![table()] };
        let b = TableConfigFile { tables: vec![table()] };
        assert!(validate([&a, &b], &catalog).is_err());
        assert!(validate([&a], &catalog).is_ok());
    }
}
