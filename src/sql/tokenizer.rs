//! Dialect-aware SQL scanner for comment stripping and statement splitting
//!
//! A single pass over the input classifies every span as plain SQL, a
//! comment, or a quoted block. Downstream passes (classification,
//! splitting, placeholder discovery) operate on the span map instead of
//! re-parsing, so quoted semicolons and comment-lookalike text inside
//! strings never confuse them.

use crate::types::SourceType;

/// Span classification produced by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare SQL text
    Plain,
    /// `--` line comment or `/* */` block comment, delimiters included
    Comment,
    /// String literal or quoted identifier, delimiters included
    QuotedBlock,
}

/// A half-open span `[start, end)` of character indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Lexical constructs recognized for a dialect.
#[derive(Debug, Clone, Copy)]
struct DialectRules {
    backtick_quotes: bool,
    bracket_quotes: bool,
    dollar_quotes: bool,
    nested_block_comments: bool,
    backslash_escapes: bool,
}

fn rules_for(dialect: Option<SourceType>) -> DialectRules {
    match dialect {
        Some(SourceType::Postgres) => DialectRules {
            backtick_quotes: false,
            bracket_quotes: false,
            dollar_quotes: true,
            nested_block_comments: true,
            backslash_escapes: false,
        },
        Some(SourceType::Mysql) | Some(SourceType::Mariadb) => DialectRules {
            backtick_quotes: true,
            bracket_quotes: false,
            dollar_quotes: false,
            nested_block_comments: false,
            backslash_escapes: true,
        },
        Some(SourceType::Sqlserver) => DialectRules {
            backtick_quotes: false,
            bracket_quotes: true,
            dollar_quotes: false,
            nested_block_comments: false,
            backslash_escapes: false,
        },
        Some(SourceType::Sqlite) => DialectRules {
            backtick_quotes: true,
            bracket_quotes: true,
            dollar_quotes: false,
            nested_block_comments: false,
            backslash_escapes: false,
        },
        // ANSI baseline: both comment styles, single/double quotes only
        _ => DialectRules {
            backtick_quotes: false,
            bracket_quotes: false,
            dollar_quotes: false,
            nested_block_comments: false,
            backslash_escapes: false,
        },
    }
}

/// Scan `sql` into a complete span list. Unterminated comments and quoted
/// blocks are tolerated and consume the rest of the input.
pub fn tokenize(sql: &str, dialect: Option<SourceType>) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let rules = rules_for(dialect);
    let mut tokens = Vec::new();
    let mut plain_start = 0usize;
    let mut i = 0usize;

    macro_rules! flush_plain {
        ($upto:expr) => {
            if plain_start < $upto {
                tokens.push(Token {
                    kind: TokenKind::Plain,
                    start: plain_start,
                    end: $upto,
                });
            }
        };
    }

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        // Line comment
        if c == '-' && next == Some('-') {
            flush_plain!(i);
            let start = i;
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Comment,
                start,
                end: i,
            });
            plain_start = i;
            continue;
        }

        // Block comment, nested only in PostgreSQL
        if c == '/' && next == Some('*') {
            flush_plain!(i);
            let start = i;
            let mut depth = 1usize;
            i += 2;
            while i < chars.len() && depth > 0 {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    depth -= 1;
                    i += 2;
                } else if rules.nested_block_comments
                    && chars[i] == '/'
                    && chars.get(i + 1) == Some(&'*')
                {
                    depth += 1;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Comment,
                start,
                end: i,
            });
            plain_start = i;
            continue;
        }

        // Single or double quoted literal, doubled-quote escape
        if c == '\'' || c == '"' {
            flush_plain!(i);
            let start = i;
            i = scan_quoted(&chars, i, c, rules.backslash_escapes);
            tokens.push(Token {
                kind: TokenKind::QuotedBlock,
                start,
                end: i,
            });
            plain_start = i;
            continue;
        }

        // Backtick identifier
        if c == '`' && rules.backtick_quotes {
            flush_plain!(i);
            let start = i;
            i = scan_quoted(&chars, i, '`', false);
            tokens.push(Token {
                kind: TokenKind::QuotedBlock,
                start,
                end: i,
            });
            plain_start = i;
            continue;
        }

        // Bracket identifier, `]]` escape
        if c == '[' && rules.bracket_quotes {
            flush_plain!(i);
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == ']' {
                    if chars.get(i + 1) == Some(&']') {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::QuotedBlock,
                start,
                end: i,
            });
            plain_start = i;
            continue;
        }

        // Dollar-quoted block; `$` followed by a digit is a placeholder
        if c == '$' && rules.dollar_quotes {
            if let Some(tag_len) = dollar_tag_len(&chars, i) {
                flush_plain!(i);
                let start = i;
                let tag: Vec<char> = chars[i..i + tag_len].to_vec();
                i += tag_len;
                loop {
                    if i >= chars.len() {
                        break;
                    }
                    if chars[i] == '$' && chars[i..].starts_with(&tag[..]) {
                        i += tag_len;
                        break;
                    }
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::QuotedBlock,
                    start,
                    end: i,
                });
                plain_start = i;
                continue;
            }
        }

        i += 1;
    }

    flush_plain!(chars.len());
    tokens
}

/// Scan a quoted region starting at the opening delimiter; returns the
/// index one past the closing delimiter (or end of input if unclosed).
fn scan_quoted(chars: &[char], open: usize, delim: char, backslash: bool) -> usize {
    let mut i = open + 1;
    while i < chars.len() {
        let c = chars[i];
        if backslash && c == '\\' {
            i += 2;
            continue;
        }
        if c == delim {
            // Doubled delimiter is an escape
            if chars.get(i + 1) == Some(&delim) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Length of a dollar-quote opening tag at `pos`, or None if `$` does not
/// open a block here. Grammar: `$` + optional `[A-Za-z_]\w*` + `$`.
fn dollar_tag_len(chars: &[char], pos: usize) -> Option<usize> {
    let mut i = pos + 1;
    match chars.get(i) {
        // `$$` — anonymous tag
        Some('$') => return Some(2),
        // `$1` — parameter placeholder, not a block opener
        Some(c) if c.is_ascii_digit() => return None,
        Some(c) if c.is_ascii_alphabetic() || *c == '_' => {}
        _ => return None,
    }
    i += 1;
    while let Some(c) = chars.get(i) {
        if c.is_ascii_alphanumeric() || *c == '_' {
            i += 1;
        } else if *c == '$' {
            return Some(i - pos + 1);
        } else {
            return None;
        }
    }
    None
}

/// Replace comments and quoted blocks with spaces, preserving every
/// character position so downstream offsets into the original remain
/// valid.
pub fn strip_comments_and_strings(sql: &str, dialect: Option<SourceType>) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = chars.clone();
    for token in tokenize(sql, dialect) {
        if token.kind != TokenKind::Plain {
            for slot in out.iter_mut().take(token.end).skip(token.start) {
                *slot = ' ';
            }
        }
    }
    out.into_iter().collect()
}

/// Split multi-statement input at top-level semicolons, skipping any `;`
/// inside comments or quoted blocks. Whitespace-only segments are dropped.
pub fn split_statements(sql: &str, dialect: Option<SourceType>) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let tokens = tokenize(sql, dialect);
    let mut statements = Vec::new();
    let mut seg_start = 0usize;

    for token in &tokens {
        if token.kind != TokenKind::Plain {
            continue;
        }
        for i in token.start..token.end {
            if chars[i] == ';' {
                push_segment(&chars[seg_start..i], &mut statements);
                seg_start = i + 1;
            }
        }
    }
    push_segment(&chars[seg_start..], &mut statements);
    statements
}

fn push_segment(chars: &[char], out: &mut Vec<String>) {
    let segment: String = chars.iter().collect();
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// First alphabetic token of the statement after comments and strings are
/// neutralized, lowercased. None for empty or comment-only input.
pub fn first_keyword(sql: &str, dialect: Option<SourceType>) -> Option<String> {
    let stripped = strip_comments_and_strings(sql, dialect);
    let word: String = stripped
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(sql: &str) -> Vec<String> {
        split_statements(sql, Some(SourceType::Postgres))
    }

    #[test]
    fn test_strip_preserves_length() {
        let cases = [
            ("SELECT 1 -- trailing", Some(SourceType::Postgres)),
            ("SELECT 'a;b' /* c */ FROM t", Some(SourceType::Mysql)),
            ("SELECT $tag$ x $tag$", Some(SourceType::Postgres)),
            ("SELECT [a]]b] FROM t", Some(SourceType::Sqlserver)),
            ("SELECT '日本語' -- コメント", Some(SourceType::Sqlite)),
            ("'unterminated", None),
        ];
        for (sql, dialect) in cases {
            let stripped = strip_comments_and_strings(sql, dialect);
            assert_eq!(
                stripped.chars().count(),
                sql.chars().count(),
                "length changed for {:?}",
                sql
            );
        }
    }

    #[test]
    fn test_split_respects_string_literals() {
        let stmts = pg("SELECT 1; INSERT INTO t VALUES ('a;b;c'); SELECT 2;");
        assert_eq!(stmts.len(), 3);
        assert!(stmts[1].contains("'a;b;c'"));
    }

    #[test]
    fn test_split_skips_comment_semicolons() {
        let stmts = pg("SELECT 1 -- not a split; here\n; SELECT 2 /* ; */");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_dollar_quote_split() {
        let stmts = pg("DO $body$ BEGIN RAISE NOTICE 'a;b'; END $body$; SELECT 1");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("RAISE NOTICE 'a;b';"));
        assert_eq!(stmts[1], "SELECT 1");
    }

    #[test]
    fn test_dollar_digit_is_placeholder() {
        // `$1` must not open a block; the semicolon stays a splitter
        let stmts = pg("SELECT $1; SELECT $2");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_anonymous_dollar_quote() {
        let stripped =
            strip_comments_and_strings("SELECT $$ -- not a comment $$ FROM t", Some(SourceType::Postgres));
        assert!(!stripped.contains("not a comment"));
        assert!(stripped.contains("FROM t"));
    }

    #[test]
    fn test_dollar_quotes_only_postgres() {
        // In MySQL `$tag$` is plain text, so the inner `;` splits
        let stmts = split_statements("SELECT $tag$ a;b $tag$", Some(SourceType::Mysql));
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_nested_block_comments_postgres_only() {
        let sql = "/* outer /* inner */ still */ SELECT 1";
        let stripped_pg = strip_comments_and_strings(sql, Some(SourceType::Postgres));
        assert!(!stripped_pg.contains("still"));
        assert!(stripped_pg.contains("SELECT 1"));

        // ANSI: first */ closes, "still */" survives as plain text
        let stripped_ansi = strip_comments_and_strings(sql, None);
        assert!(stripped_ansi.contains("still"));
    }

    #[test]
    fn test_backtick_identifiers() {
        let stripped = strip_comments_and_strings(
            "SELECT `col--name` FROM t -- real",
            Some(SourceType::Mysql),
        );
        assert!(!stripped.contains("col--name"));
        assert!(!stripped.contains("real"));
        assert!(stripped.contains("FROM t"));
    }

    #[test]
    fn test_bracket_escape() {
        let tokens = tokenize("[ab]]cd] x", Some(SourceType::Sqlserver));
        assert_eq!(tokens[0].kind, TokenKind::QuotedBlock);
        assert_eq!(tokens[0].end, 8);
    }

    #[test]
    fn test_mysql_backslash_escape() {
        let stmts = split_statements(r"SELECT 'a\'b;c'; SELECT 2", Some(SourceType::Mysql));
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains(r"a\'b;c"));
    }

    #[test]
    fn test_doubled_quote_escape() {
        let stmts = pg("SELECT 'can''t; stop'; SELECT 2");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_unclosed_constructs_tolerated() {
        assert_eq!(pg("SELECT '; unterminated").len(), 1);
        assert_eq!(pg("SELECT 1 /* open").len(), 1);
        assert_eq!(pg("DO $x$ never closed").len(), 1);
    }

    #[test]
    fn test_first_keyword() {
        let d = Some(SourceType::Postgres);
        assert_eq!(first_keyword("  SELECT 1", d).as_deref(), Some("select"));
        assert_eq!(
            first_keyword("-- c\nINSERT INTO t", d).as_deref(),
            Some("insert")
        );
        assert_eq!(first_keyword("/* only a comment */", d), None);
        assert_eq!(first_keyword("", d), None);
    }

    #[test]
    fn test_empty_segments_dropped() {
        assert_eq!(pg("; ;  ;SELECT 1;;").len(), 1);
    }
}
