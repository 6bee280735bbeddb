//! Multi-dialect placeholder rewriting (spec §4.1: "rewrites placeholder
//! syntax at call time ... so one logical query runs on SQLite,
//! MySQL/MariaDB, Postgres, and SQL Server").
//!
//! Hermod ships Postgres and SQLite drivers (see [`crate::postgres`]);
//! the rewriter is kept general over all four forms the spec names so
//! the statement catalog stays engine-neutral even though only two
//! engines are wired up today.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
    SqlServer,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${index}"),
            Dialect::SqlServer => format!("@p{index}"),
        }
    }
}

/// Rewrites a statement written with positional `?` placeholders into
/// the target dialect's native placeholder syntax. The catalog is
/// authored once in `?` form; this is the one place that translates.
pub fn rewrite_placeholders(statement: &str, dialect: Dialect) -> String {
    let mut out = String::with_capacity(statement.len() + 8);
    let mut index = 0usize;
    let mut chars = statement.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '?' {
            index += 1;
            out.push_str(&dialect.placeholder(index));
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_and_mysql_are_identity() {
        let stmt = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert_eq!(rewrite_placeholders(stmt, Dialect::Sqlite), stmt);
        assert_eq!(rewrite_placeholders(stmt, Dialect::MySql), stmt);
    }

    #[test]
    fn postgres_rewrites_to_dollar_numbered() {
        let stmt = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert_eq!(
            rewrite_placeholders(stmt, Dialect::Postgres),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn sql_server_rewrites_to_named_params() {
        let stmt = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert_eq!(
            rewrite_placeholders(stmt, Dialect::SqlServer),
            "SELECT * FROM t WHERE a = @p1 AND b = @p2"
        );
    }

    #[test]
    fn handles_statement_with_no_placeholders() {
        let stmt = "SELECT 1";
        assert_eq!(rewrite_placeholders(stmt, Dialect::Postgres), stmt);
    }

    #[test]
    fn preserves_placeholder_count_across_dialects() {
        let stmt = "INSERT INTO t (a, b, c) VALUES (?, ?, ?)";
        for dialect in [
            Dialect::Sqlite,
            Dialect::MySql,
            Dialect::Postgres,
            Dialect::SqlServer,
        ] {
            let rewritten = rewrite_placeholders(stmt, dialect);
            let count = rewritten.matches(char::is_numeric).count()
                + rewritten.matches('?').count();
            assert!(count >= 3, "dialect {dialect:?} lost placeholders");
        }
    }
}
