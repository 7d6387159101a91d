//! Row-limit injection for SELECT statements
//!
//! The cap is a policy clamp: an existing smaller limit is kept, a larger
//! one is tightened, and a parameterized limit is defeated by wrapping the
//! whole query so the cap binds regardless of the runtime value.

use lazy_regex::{lazy_regex, Lazy, Regex};

use crate::sql::tokenizer::{first_keyword, strip_comments_and_strings};
use crate::types::SourceType;

static LIMIT_CLAUSE: Lazy<Regex> = lazy_regex!(r"(?i)\bLIMIT\s+(\S+)");
static TOP_CLAUSE: Lazy<Regex> = lazy_regex!(r"(?i)^\s*SELECT\s+TOP\s+\(?([^\s()]+)\)?");
static SELECT_HEAD: Lazy<Regex> = lazy_regex!(r"(?i)^\s*SELECT\b");

/// Apply `max_rows` to a single statement. Non-SELECT statements pass
/// through untouched.
pub fn apply_max_rows(sql: &str, max_rows: usize, dialect: SourceType) -> String {
    if first_keyword(sql, Some(dialect)).as_deref() != Some("select") {
        return sql.to_string();
    }

    match dialect {
        SourceType::Sqlserver => apply_top(sql, max_rows, dialect),
        _ => apply_limit(sql, max_rows, dialect),
    }
}

fn apply_limit(sql: &str, max_rows: usize, dialect: SourceType) -> String {
    let stripped = strip_comments_and_strings(sql, Some(dialect));

    // The last LIMIT in the neutralized text is the outermost one
    let Some(caps) = LIMIT_CLAUSE.captures_iter(&stripped).last() else {
        return append_clause(sql, &format!("LIMIT {}", max_rows));
    };
    let value_match = match caps.get(1) {
        Some(m) => m,
        None => return sql.to_string(),
    };
    let value = value_match.as_str().trim_end_matches(';');

    if let Ok(existing) = value.parse::<usize>() {
        let effective = existing.min(max_rows);
        return splice(
            sql,
            &stripped,
            value_match.start(),
            value_match.start() + value.len(),
            &effective.to_string(),
        );
    }

    // Placeholder (`$k`, `?`, `@pk`) or an expression we cannot evaluate:
    // wrap so the cap binds regardless of the runtime value
    wrap_subquery(sql, &format!("LIMIT {}", max_rows), None)
}

fn apply_top(sql: &str, max_rows: usize, dialect: SourceType) -> String {
    let stripped = strip_comments_and_strings(sql, Some(dialect));

    if let Some(caps) = TOP_CLAUSE.captures(&stripped) {
        let value_match = match caps.get(1) {
            Some(m) => m,
            None => return sql.to_string(),
        };
        let value = value_match.as_str();
        if let Ok(existing) = value.parse::<usize>() {
            let effective = existing.min(max_rows);
            return splice(
                sql,
                &stripped,
                value_match.start(),
                value_match.end(),
                &effective.to_string(),
            );
        }
        // Parameterized or otherwise non-literal TOP: clamp by wrapping
        return wrap_subquery(sql, "", Some(max_rows));
    }

    // No TOP: inject one right after the leading SELECT
    if let Some(m) = SELECT_HEAD.find(&stripped) {
        return splice(sql, &stripped, m.end(), m.end(), &format!(" TOP {}", max_rows));
    }
    sql.to_string()
}

/// Append `clause` to the statement, keeping a trailing semicolon where
/// the caller wrote one.
fn append_clause(sql: &str, clause: &str) -> String {
    let trimmed = sql.trim_end();
    if let Some(body) = trimmed.strip_suffix(';') {
        format!("{} {};", body.trim_end(), clause)
    } else {
        format!("{} {}", trimmed, clause)
    }
}

/// Wrap the original query so the injected limit is outermost.
fn wrap_subquery(sql: &str, limit_clause: &str, top: Option<usize>) -> String {
    let trimmed = sql.trim_end();
    let (body, semi) = match trimmed.strip_suffix(';') {
        Some(b) => (b.trim_end(), ";"),
        None => (trimmed, ""),
    };
    match top {
        Some(n) => format!("SELECT TOP {} * FROM ({}) AS subq{}", n, body, semi),
        None => format!("SELECT * FROM ({}) AS subq {}{}", body, limit_clause, semi),
    }
}

/// Replace `[start, end)` (byte offsets into the position-preserving
/// stripped text) with `replacement` in the original statement.
fn splice(sql: &str, stripped: &str, start: usize, end: usize, replacement: &str) -> String {
    let char_start = stripped[..start].chars().count();
    let char_end = char_start + stripped[start..end].chars().count();
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + replacement.len());
    out.extend(chars[..char_start].iter());
    out.push_str(replacement);
    out.extend(chars[char_end..].iter());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: SourceType = SourceType::Postgres;

    #[test]
    fn test_adds_limit() {
        assert_eq!(
            apply_max_rows("SELECT * FROM users", 100, PG),
            "SELECT * FROM users LIMIT 100"
        );
    }

    #[test]
    fn test_preserves_semicolon() {
        assert_eq!(
            apply_max_rows("SELECT * FROM users;", 100, PG),
            "SELECT * FROM users LIMIT 100;"
        );
    }

    #[test]
    fn test_tightens_larger_limit() {
        assert_eq!(
            apply_max_rows("SELECT * FROM users LIMIT 200", 100, PG),
            "SELECT * FROM users LIMIT 100"
        );
    }

    #[test]
    fn test_keeps_smaller_limit() {
        assert_eq!(
            apply_max_rows("SELECT * FROM users LIMIT 50", 100, PG),
            "SELECT * FROM users LIMIT 50"
        );
    }

    #[test]
    fn test_wraps_parameterized_limit() {
        let sql = "SELECT emp_no FROM e WHERE name ILIKE '%' || $1 || '%' LIMIT $2";
        assert_eq!(
            apply_max_rows(sql, 1000, PG),
            "SELECT * FROM (SELECT emp_no FROM e WHERE name ILIKE '%' || $1 || '%' LIMIT $2) AS subq LIMIT 1000"
        );
    }

    #[test]
    fn test_wraps_question_mark_limit() {
        let out = apply_max_rows("SELECT * FROM t LIMIT ?", 10, SourceType::Sqlite);
        assert_eq!(out, "SELECT * FROM (SELECT * FROM t LIMIT ?) AS subq LIMIT 10");
    }

    #[test]
    fn test_ignores_non_select() {
        let sql = "INSERT INTO t VALUES (1)";
        assert_eq!(apply_max_rows(sql, 100, PG), sql);
        let sql = "UPDATE t SET a = 1";
        assert_eq!(apply_max_rows(sql, 100, PG), sql);
    }

    #[test]
    fn test_limit_in_string_not_confused() {
        assert_eq!(
            apply_max_rows("SELECT 'no LIMIT 5 here' FROM t", 10, PG),
            "SELECT 'no LIMIT 5 here' FROM t LIMIT 10"
        );
    }

    #[test]
    fn test_outermost_limit_targeted() {
        // The subquery's literal stays, the outer clause is tightened
        let sql = "SELECT * FROM (SELECT * FROM t LIMIT 5) q LIMIT 500";
        assert_eq!(
            apply_max_rows(sql, 100, PG),
            "SELECT * FROM (SELECT * FROM t LIMIT 5) q LIMIT 100"
        );
    }

    #[test]
    fn test_idempotent() {
        for sql in [
            "SELECT * FROM t",
            "SELECT * FROM t LIMIT 500",
            "SELECT * FROM t LIMIT 5",
            "SELECT * FROM t WHERE a = $1 LIMIT $2",
        ] {
            let once = apply_max_rows(sql, 100, PG);
            let twice = apply_max_rows(&once, 100, PG);
            assert_eq!(once, twice, "not idempotent for {:?}", sql);
        }
    }

    #[test]
    fn test_sqlserver_inserts_top() {
        assert_eq!(
            apply_max_rows("SELECT name FROM t", 100, SourceType::Sqlserver),
            "SELECT TOP 100 name FROM t"
        );
    }

    #[test]
    fn test_sqlserver_tightens_top() {
        assert_eq!(
            apply_max_rows("SELECT TOP 500 name FROM t", 100, SourceType::Sqlserver),
            "SELECT TOP 100 name FROM t"
        );
        assert_eq!(
            apply_max_rows("SELECT TOP 50 name FROM t", 100, SourceType::Sqlserver),
            "SELECT TOP 50 name FROM t"
        );
    }

    #[test]
    fn test_sqlserver_wraps_parameterized_top() {
        assert_eq!(
            apply_max_rows("SELECT TOP @p1 name FROM t", 100, SourceType::Sqlserver),
            "SELECT TOP 100 * FROM (SELECT TOP @p1 name FROM t) AS subq"
        );
    }
}
