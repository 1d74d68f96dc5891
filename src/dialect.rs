// SQL dialect seam: identifier quoting, placeholders, row limits, RETURNING support
use std::fmt::Debug;

/// Behaviours that differ across SQL databases.
pub trait Dialect: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Placeholder for the `index`-th (1-based) bound parameter
    fn bind_var(&self, index: usize) -> String;

    /// Quote an identifier so reserved words survive as column names
    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Suffix appended to INSERT to read back the generated key, if supported
    fn returning_suffix(&self, _table: &str, _column: &str) -> Option<String> {
        None
    }

    /// Row cap expressed as a WHERE predicate, ANDed after the other conditions
    fn limit_where(&self, _limit: Option<i64>, _offset: Option<i64>) -> Option<String> {
        None
    }

    /// Trailing clause for limit and offset; empty when neither applies
    fn limit_and_offset(&self, limit: Option<i64>, offset: Option<i64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn bind_var(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn returning_suffix(&self, _table: &str, column: &str) -> Option<String> {
        Some(format!("RETURNING {}", column))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn bind_var(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// `:n` placeholders; a bare limit becomes a `ROWNUM` predicate, offsets use `OFFSET .. FETCH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Oracle;

impl Dialect for Oracle {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn bind_var(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn limit_where(&self, limit: Option<i64>, offset: Option<i64>) -> Option<String> {
        match (limit, offset) {
            (Some(l), None) => Some(format!("ROWNUM <= {}", l)),
            _ => None,
        }
    }

    fn limit_and_offset(&self, limit: Option<i64>, offset: Option<i64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", o, l),
            (None, Some(o)) => format!("OFFSET {} ROWS", o),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_numbers_placeholders() {
        assert_eq!(Postgres.bind_var(3), "$3");
        assert_eq!(Postgres.quote("order"), "\"order\"");
        assert_eq!(Postgres.returning_suffix("users", "\"id\"").as_deref(), Some("RETURNING \"id\""));
    }

    #[test]
    fn sqlite_has_no_returning() {
        assert_eq!(Sqlite.bind_var(7), "?");
        assert!(Sqlite.returning_suffix("users", "id").is_none());
    }

    #[test]
    fn oracle_limits_with_rownum_or_fetch() {
        assert_eq!(Oracle.bind_var(2), ":2");
        assert_eq!(Oracle.limit_where(Some(5), None).as_deref(), Some("ROWNUM <= 5"));
        assert_eq!(Oracle.limit_and_offset(Some(5), None), "");
        assert!(Oracle.limit_where(Some(5), Some(10)).is_none());
        assert_eq!(Oracle.limit_and_offset(Some(5), Some(10)), "OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY");
        assert_eq!(Postgres.limit_and_offset(Some(5), Some(10)), "LIMIT 5 OFFSET 10");
        assert!(Postgres.limit_where(Some(5), None).is_none());
    }
}
