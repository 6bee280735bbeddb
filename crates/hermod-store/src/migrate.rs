//! Best-effort, non-destructive schema self-migration (spec §4.1:
//! "for every CREATE TABLE statement in the catalog it parses the
//! column list, inspects the live table, and issues `ADD COLUMN` for
//! any missing columns").
//!
//! There is no direct teacher analog (`durable`'s Postgres backend
//! ships its migrations as plain `.sql` files run by `sqlx::migrate!`);
//! this pass is grounded on the spec's own description and kept
//! intentionally dumb: regex-parsed column names, `ADD COLUMN`-only,
//! "already exists" swallowed by string matching.

use regex::Regex;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::error::StoreError;

/// One entry in the statement catalog: a table name plus the
/// `CREATE TABLE IF NOT EXISTS` statement that defines its canonical
/// shape.
pub struct TableDef {
    pub name: &'static str,
    pub create: &'static str,
}

fn already_exists(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already exists")
}

fn parse_columns(create_stmt: &str) -> Vec<(String, String)> {
    let body_start = create_stmt.find('(').map(|i| i + 1);
    let body_end = create_stmt.rfind(')');
    let (Some(start), Some(end)) = (body_start, body_end) else {
        return vec![];
    };
    let body = &create_stmt[start..end];

    let column_re = Regex::new(r"^\s*([a-zA-Z_][a-zA-Z0-9_]*)\s+([A-Za-z0-9_\(\) ]+)").unwrap();
    let constraint_keywords = ["PRIMARY", "UNIQUE", "FOREIGN", "CHECK", "CONSTRAINT"];

    body.split(',')
        .filter_map(|raw| {
            let trimmed = raw.trim();
            let upper_first_word = trimmed.split_whitespace().next()?.to_uppercase();
            if constraint_keywords.contains(&upper_first_word.as_str()) {
                return None;
            }
            let caps = column_re.captures(trimmed)?;
            Some((caps[1].to_string(), caps[2].trim().to_string()))
        })
        .collect()
}

/// Runs the full self-migration pass: create each table if absent, then
/// add any columns present in the catalog definition but missing from
/// the live table. Never drops or alters an existing column.
pub async fn self_migrate(pool: &PgPool, catalog: &[TableDef]) -> Result<(), StoreError> {
    for table in catalog {
        if let Err(err) = sqlx::query(table.create).execute(pool).await {
            if !already_exists(&err.to_string()) {
                return Err(StoreError::Migration(format!(
                    "creating table {}: {err}",
                    table.name
                )));
            }
        }

        let live_columns: Vec<String> = sqlx::query(
            "SELECT column_name FROM information_schema.columns WHERE table_name = $1",
        )
        .bind(table.name)
        .fetch_all(pool)
        .await
        .map_err(StoreError::database)?
        .into_iter()
        .map(|row| row.get::<String, _>("column_name"))
        .collect();

        for (column, coltype) in parse_columns(table.create) {
            if live_columns.iter().any(|c| c.eq_ignore_ascii_case(&column)) {
                continue;
            }
            let alter = format!("ALTER TABLE {} ADD COLUMN {} {}", table.name, column, coltype);
            match sqlx::query(&alter).execute(pool).await {
                Ok(_) => debug!(table = table.name, column, "added missing column"),
                Err(err) if already_exists(&err.to_string()) => {}
                Err(err) => warn!(table = table.name, column, %err, "failed to add column"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_column_list() {
        let stmt = "CREATE TABLE IF NOT EXISTS t (id UUID PRIMARY KEY, name TEXT NOT NULL, active BOOLEAN)";
        let cols = parse_columns(stmt);
        let names: Vec<_> = cols.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"id"));
        assert!(names.contains(&"name"));
        assert!(names.contains(&"active"));
    }

    #[test]
    fn skips_table_level_constraints() {
        let stmt = "CREATE TABLE IF NOT EXISTS t (id UUID, name TEXT, UNIQUE (name), CONSTRAINT fk FOREIGN KEY (id) REFERENCES other(id))";
        let cols = parse_columns(stmt);
        let names: Vec<_> = cols.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn recognizes_already_exists_variants() {
        assert!(already_exists("relation \"t\" already exists"));
        assert!(already_exists("column \"x\" of relation \"t\" already exists"));
        assert!(!already_exists("syntax error at or near \"FOO\""));
    }
}
