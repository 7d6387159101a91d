//! Read-only statement classification
//!
//! A statement is read-only iff its first keyword (after comments and
//! strings are neutralized) is in the dialect's allow-list. Multi-statement
//! input is read-only iff every split statement is.

use crate::sql::tokenizer::{first_keyword, split_statements};
use crate::types::SourceType;

/// First keywords accepted in readonly mode for a dialect.
pub fn allowed_keywords(dialect: SourceType) -> &'static [&'static str] {
    match dialect {
        SourceType::Postgres => &["select", "with", "explain", "analyze", "show"],
        SourceType::Mysql | SourceType::Mariadb => &[
            "select", "with", "explain", "analyze", "show", "describe", "desc",
        ],
        SourceType::Sqlite => &["select", "with", "explain", "analyze", "pragma"],
        SourceType::Sqlserver => &["select", "with", "explain", "showplan"],
        // Oracle and DaMeng share the conservative ANSI list
        _ => &["select", "with", "explain"],
    }
}

/// Judge a single statement. Empty and comment-only statements pass.
pub fn is_read_only(sql: &str, dialect: SourceType) -> bool {
    match first_keyword(sql, Some(dialect)) {
        Some(keyword) => allowed_keywords(dialect).contains(&keyword.as_str()),
        None => true,
    }
}

/// Judge possibly multi-statement input: every split statement must pass.
pub fn is_read_only_multi(sql: &str, dialect: SourceType) -> bool {
    split_statements(sql, Some(dialect))
        .iter()
        .all(|stmt| is_read_only(stmt, dialect))
}
