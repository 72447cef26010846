//! SQL text for the target table. Identifiers come from validated profiles and
//! are still quoted; values are always bound.

use super::TableSpec;
use crate::contract::FieldKind;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "TEXT",
        FieldKind::Number => "REAL",
        FieldKind::Date => "DATETIME",
    }
}

pub fn create_table(spec: &TableSpec) -> String {
    let mut defs = vec!["\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    defs.extend(
        spec.columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), column_type(c.kind))),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&spec.name),
        defs.join(", ")
    )
}

/// `None` when the table has no natural key.
pub fn create_key_index(spec: &TableSpec) -> Option<String> {
    if spec.natural_key.is_empty() {
        return None;
    }
    Some(format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(&format!("ux_{}_natural_key", spec.name)),
        quote_ident(&spec.name),
        ident_list(&spec.natural_key)
    ))
}

pub fn delete_all(table: &str) -> String {
    format!("DELETE FROM {}", quote_ident(table))
}

pub fn count(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table))
}

pub fn insert(spec: &TableSpec) -> String {
    let names: Vec<&str> = spec.columns.iter().map(|c| c.name.as_str()).collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&spec.name),
        ident_list(&names),
        placeholders
    )
}

/// Insert, or overwrite every non-key column of the row sharing the natural key.
pub fn upsert(spec: &TableSpec) -> String {
    let updates: Vec<String> = spec
        .columns
        .iter()
        .filter(|c| !spec.natural_key.contains(&c.name))
        .map(|c| {
            let col = quote_ident(&c.name);
            format!("{col} = excluded.{col}")
        })
        .collect();

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "{} ON CONFLICT ({}) {}",
        insert(spec),
        ident_list(&spec.natural_key),
        action
    )
}

fn ident_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}
