//! Read-only statement validation.
//!
//! The database transaction is the real guard (every statement runs inside a
//! `READ ONLY` transaction that is rolled back). This layer rejects obvious
//! writes early with a clear message and decides how a statement may be
//! wrapped for row limiting.

use crate::error::ServerError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Leading keyword of an accepted statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    With,
    Values,
    Table,
    Show,
    Explain,
}

impl StatementKind {
    /// Whether the statement can be used as a subquery.
    ///
    /// `SHOW` and `EXPLAIN` are utility statements and must run as-is.
    pub fn is_wrappable(&self) -> bool {
        !matches!(self, StatementKind::Show | StatementKind::Explain)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            StatementKind::Select => "SELECT",
            StatementKind::With => "WITH",
            StatementKind::Values => "VALUES",
            StatementKind::Table => "TABLE",
            StatementKind::Show => "SHOW",
            StatementKind::Explain => "EXPLAIN",
        };
        f.write_str(keyword)
    }
}

/// A statement that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    /// Statement text with any trailing semicolon removed.
    pub sql: String,
    /// Leading keyword.
    pub kind: StatementKind,
}

static STATEMENT_KIND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(SELECT|WITH|VALUES|TABLE|SHOW|EXPLAIN)\b")
        .unwrap_or_else(|e| panic!("Internal error: invalid statement pattern: {e}"))
});

static DATA_MODIFYING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|MERGE)\b")
        .unwrap_or_else(|e| panic!("Internal error: invalid data-modifying pattern: {e}"))
});

/// Validator for the `query` tool.
#[derive(Debug, Clone)]
pub struct QueryValidator {
    max_length: usize,
}

impl QueryValidator {
    /// Create a validator accepting statements up to `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Validate a statement.
    pub fn validate(&self, query: &str) -> Result<ValidatedQuery, ServerError> {
        if query.len() > self.max_length {
            return Err(ServerError::validation(format!(
                "Query exceeds maximum length of {} bytes",
                self.max_length
            )));
        }

        let original: Vec<char> = query.chars().collect();
        let mut masked = mask_non_code(&original);

        // A single trailing semicolon is tolerated.
        if let Some(last) = masked.iter().rposition(|c| !c.is_whitespace()) {
            if masked[last] == ';' {
                masked[last] = ' ';
                return self.check(&original, &masked, Some(last));
            }
        }
        self.check(&original, &masked, None)
    }

    fn check(
        &self,
        original: &[char],
        masked: &[char],
        stripped: Option<usize>,
    ) -> Result<ValidatedQuery, ServerError> {
        let code: String = masked.iter().collect();
        let code = code.trim();

        if code.is_empty() {
            return Err(ServerError::validation("Query is empty"));
        }

        if code.contains(';') {
            return Err(ServerError::validation(
                "Multiple statements are not allowed",
            ));
        }

        let kind = match STATEMENT_KIND
            .captures(code)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_uppercase())
            .as_deref()
        {
            Some("SELECT") => StatementKind::Select,
            Some("WITH") => StatementKind::With,
            Some("VALUES") => StatementKind::Values,
            Some("TABLE") => StatementKind::Table,
            Some("SHOW") => StatementKind::Show,
            Some("EXPLAIN") => StatementKind::Explain,
            _ => {
                let keyword = code.split_whitespace().next().unwrap_or_default();
                return Err(ServerError::validation(format!(
                    "Statement '{keyword}' is not read-only"
                )));
            }
        };

        if matches!(kind, StatementKind::With | StatementKind::Explain) {
            if let Some(m) = DATA_MODIFYING.find(code) {
                return Err(ServerError::validation(format!(
                    "{kind} statement contains data-modifying keyword '{}'",
                    m.as_str().to_ascii_uppercase()
                )));
            }
        }

        let sql: String = original
            .iter()
            .enumerate()
            .map(|(i, c)| if Some(i) == stripped { ' ' } else { *c })
            .collect();

        Ok(ValidatedQuery {
            sql: sql.trim().to_string(),
            kind,
        })
    }
}

/// Blank out string literals, quoted identifiers, dollar-quoted bodies and
/// comments, keeping one output char per input char.
fn mask_non_code(chars: &[char]) -> Vec<char> {
    let len = chars.len();
    let mut out = Vec::with_capacity(len);
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '\'' | '"' => {
                let backslash_escapes = c == '\''
                    && i > 0
                    && matches!(chars[i - 1], 'E' | 'e')
                    && (i < 2 || !is_ident_char(chars[i - 2]));
                out.push(' ');
                i += 1;
                while i < len {
                    if backslash_escapes && chars[i] == '\\' && i + 1 < len {
                        out.extend([' ', ' ']);
                        i += 2;
                        continue;
                    }
                    if chars[i] == c {
                        if chars.get(i + 1) == Some(&c) {
                            out.extend([' ', ' ']);
                            i += 2;
                            continue;
                        }
                        out.push(' ');
                        i += 1;
                        break;
                    }
                    out.push(' ');
                    i += 1;
                }
            }
            '-' if next == Some('-') => {
                while i < len && chars[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                let mut depth = 0usize;
                while i < len {
                    if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                        depth += 1;
                        out.extend([' ', ' ']);
                        i += 2;
                    } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        depth -= 1;
                        out.extend([' ', ' ']);
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        out.push(' ');
                        i += 1;
                    }
                }
            }
            '$' if i == 0 || !is_ident_char(chars[i - 1]) => match dollar_tag(chars, i) {
                Some(tag_len) => {
                    let body_end = find_closing_tag(chars, i, tag_len).unwrap_or(len);
                    out.extend(std::iter::repeat(' ').take(body_end - i));
                    i = body_end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Length of a `$tag$` opener at `start`, if there is one.
fn dollar_tag(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    (chars.get(j) == Some(&'$')).then_some(j - start + 1)
}

/// Index just past the closing tag matching the opener at `start`.
fn find_closing_tag(chars: &[char], start: usize, tag_len: usize) -> Option<usize> {
    let tag = &chars[start..start + tag_len];
    let mut j = start + tag_len;
    while j + tag_len <= chars.len() {
        if &chars[j..j + tag_len] == tag {
            return Some(j + tag_len);
        }
        j += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> QueryValidator {
        QueryValidator::new(100_000)
    }

    fn kind(sql: &str) -> StatementKind {
        validator().validate(sql).unwrap().kind
    }

    #[test]
    fn test_accepts_read_only_statements() {
        assert_eq!(kind("SELECT * FROM users"), StatementKind::Select);
        assert_eq!(kind("  select 1"), StatementKind::Select);
        assert_eq!(
            kind("WITH cte AS (SELECT 1) SELECT * FROM cte"),
            StatementKind::With
        );
        assert_eq!(kind("VALUES (1), (2)"), StatementKind::Values);
        assert_eq!(kind("TABLE users"), StatementKind::Table);
        assert_eq!(kind("SHOW server_version"), StatementKind::Show);
        assert_eq!(kind("EXPLAIN SELECT 1"), StatementKind::Explain);
    }

    #[test]
    fn test_rejects_writes() {
        let v = validator();
        for sql in [
            "INSERT INTO users VALUES (1)",
            "UPDATE users SET name = 'x'",
            "DELETE FROM users",
            "DROP TABLE users",
            "CREATE TABLE t (id int)",
            "TRUNCATE users",
            "COPY users TO '/tmp/x'",
            "SET statement_timeout = 0",
        ] {
            assert!(
                matches!(v.validate(sql), Err(ServerError::ValidationFailed(_))),
                "accepted: {sql}"
            );
        }
    }

    #[test]
    fn test_rejects_data_modifying_cte() {
        let v = validator();
        assert!(v
            .validate("WITH d AS (DELETE FROM users RETURNING *) SELECT * FROM d")
            .is_err());
        assert!(v.validate("EXPLAIN ANALYZE UPDATE users SET x = 1").is_err());
    }

    #[test]
    fn test_keywords_inside_literals_are_ignored() {
        let v = validator();
        assert!(v
            .validate("WITH x AS (SELECT 'delete me' AS note) SELECT * FROM x")
            .is_ok());
        assert!(v
            .validate(r#"WITH x AS (SELECT 1 AS "update") SELECT * FROM x"#)
            .is_ok());
        assert!(v
            .validate("WITH x AS (SELECT $body$ insert; $body$ AS t) SELECT * FROM x")
            .is_ok());
        assert!(v.validate("SELECT updated_at FROM users").is_ok());
    }

    #[test]
    fn test_single_statement_only() {
        let v = validator();
        assert!(v.validate("SELECT 1; SELECT 2").is_err());
        assert!(v.validate("SELECT 1; DROP TABLE users").is_err());
        assert!(v.validate("SELECT 1;;").is_err());
        assert!(v.validate("SELECT 'a;b'").is_ok());
        assert!(v.validate("SELECT E'it\\'s; fine'").is_ok());
    }

    #[test]
    fn test_trailing_semicolon_is_stripped() {
        let q = validator().validate("SELECT 1;  ").unwrap();
        assert_eq!(q.sql, "SELECT 1");

        let q = validator().validate("SELECT 1; -- done").unwrap();
        assert_eq!(q.sql, "SELECT 1  -- done");
    }

    #[test]
    fn test_leading_comments() {
        assert_eq!(kind("-- note\nSELECT 1"), StatementKind::Select);
        assert_eq!(kind("/* a /* nested */ b */ SELECT 1"), StatementKind::Select);
        assert!(validator().validate("/* SELECT */ DELETE FROM t").is_err());
    }

    #[test]
    fn test_empty_and_comment_only() {
        let v = validator();
        assert!(v.validate("").is_err());
        assert!(v.validate("   ").is_err());
        assert!(v.validate("-- nothing").is_err());
        assert!(v.validate(";").is_err());
    }

    #[test]
    fn test_query_length_limit() {
        let v = QueryValidator::new(100);
        let long_query = "SELECT ".to_string() + &"x".repeat(100);
        assert!(v.validate(&long_query).is_err());
    }

    #[test]
    fn test_wrappable() {
        assert!(StatementKind::Select.is_wrappable());
        assert!(StatementKind::Values.is_wrappable());
        assert!(!StatementKind::Show.is_wrappable());
        assert!(!StatementKind::Explain.is_wrappable());
    }

    #[test]
    fn test_positional_parameter_is_not_dollar_quote() {
        let masked = mask_non_code(&"SELECT $1".chars().collect::<Vec<_>>());
        assert_eq!(masked.iter().collect::<String>(), "SELECT $1");
    }
}
