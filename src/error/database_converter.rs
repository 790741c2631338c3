use std::sync::LazyLock;

use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};
use regex::Regex;

use crate::error::AppError;

static KEY_VALUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Key \(([^)]+)\)=\(([^)]*)\)").expect("key/value pattern compiles")
});

static COLUMN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"column "([^"]+)""#).expect("column pattern compiles"));

/// Converts Diesel errors into structured [`AppError`] variants, pulling
/// entity, field and value out of PostgreSQL constraint messages.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info.as_ref(), operation)
            }
            DieselError::NotFound => AppError::not_found("resource", "id", "unknown"),
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: &(dyn DatabaseErrorInformation + Send + Sync),
        operation: &str,
    ) -> AppError {
        let message = info.message();
        let details = info.details().unwrap_or_default();
        let constraint = info.constraint_name();

        let structured = match kind {
            DatabaseErrorKind::UniqueViolation => {
                let entity = info
                    .table_name()
                    .map(str::to_string)
                    .or_else(|| constraint.and_then(entity_from_constraint));
                let key_value = key_value(details).or_else(|| key_value(message));
                match (entity, key_value) {
                    (Some(entity), Some((field, value))) => Some(AppError::Duplicate {
                        entity,
                        field,
                        value,
                    }),
                    _ => None,
                }
            }
            DatabaseErrorKind::NotNullViolation => info
                .column_name()
                .map(str::to_string)
                .or_else(|| column(message))
                .map(|field| AppError::validation(field, "Field is required")),
            DatabaseErrorKind::CheckViolation => constraint.map(|name| {
                AppError::validation(
                    field_from_constraint(name).unwrap_or_else(|| name.to_string()),
                    format!("Check constraint {} failed", name),
                )
            }),
            _ => None,
        };

        structured.unwrap_or_else(|| AppError::Database {
            operation: operation.to_string(),
            source: anyhow::Error::msg(format!("{:?}: {}", kind, message)),
        })
    }
}

/// `Key (template_key)=(welcome) already exists.` -> `("template_key", "welcome")`
fn key_value(text: &str) -> Option<(String, String)> {
    KEY_VALUE_PATTERN
        .captures(text)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

fn column(message: &str) -> Option<String> {
    COLUMN_PATTERN.captures(message).map(|caps| caps[1].to_string())
}

const CONSTRAINT_SUFFIXES: &[&str] = &["_key", "_check", "_fkey", "_pkey", "_idx"];

fn strip_constraint_suffix(name: &str) -> Option<&str> {
    CONSTRAINT_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
}

/// Table part of a conventional `<table>_<column>_<suffix>` name. Table
/// names here are plural and contain one underscore at most, so the split
/// favours a two-part table name when one exists.
fn entity_from_constraint(name: &str) -> Option<String> {
    let stem = strip_constraint_suffix(name)?;
    for table in ["delivery_jobs", "authority_templates"] {
        if stem.starts_with(table) {
            return Some(table.to_string());
        }
    }
    stem.split_once('_').map(|(table, _)| table.to_string())
}

fn field_from_constraint(name: &str) -> Option<String> {
    let stem = strip_constraint_suffix(name)?;
    let entity = entity_from_constraint(name)?;
    stem.strip_prefix(&entity)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}
