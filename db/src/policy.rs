use std::iter::Peekable;
use std::str::Chars;

use crate::DbError;

const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "VALUES"];

const OPEN_PAREN: &str = "(";

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "UPSERT", "CREATE", "DROP", "ALTER", "ATTACH",
    "DETACH", "PRAGMA", "VACUUM", "REINDEX", "ANALYZE",
];

/// Which statements `get_results` is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryPolicy {
    #[default]
    ReadOnly,
    ReadWrite,
}

impl QueryPolicy {
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only {
            QueryPolicy::ReadOnly
        } else {
            QueryPolicy::ReadWrite
        }
    }

    pub fn is_read_only(self) -> bool {
        self == QueryPolicy::ReadOnly
    }

    /// Rejects anything but a single read-only statement under `ReadOnly`.
    pub fn check(self, sql: &str) -> Result<(), DbError> {
        if self == QueryPolicy::ReadWrite {
            return Ok(());
        }

        let statements = statement_words(sql);
        let words = match statements.as_slice() {
            [] => return Err(DbError::ReadOnlyViolation("empty statement".to_string())),
            [words] => words,
            _ => {
                return Err(DbError::ReadOnlyViolation(
                    "multiple statements are not permitted".to_string(),
                ));
            }
        };

        let first = words[0].as_str();
        if !READ_KEYWORDS.contains(&first) {
            return Err(DbError::ReadOnlyViolation(format!(
                "{first} statements are not permitted"
            )));
        }

        // A keyword directly followed by `(` is a function call, e.g. replace(x, 'a', 'b').
        let write = words.iter().enumerate().find(|(i, w)| {
            WRITE_KEYWORDS.contains(&w.as_str())
                && words.get(i + 1).map(String::as_str) != Some(OPEN_PAREN)
        });
        if let Some((_, word)) = write {
            return Err(DbError::ReadOnlyViolation(format!(
                "{word} is not permitted"
            )));
        }

        Ok(())
    }
}

/// Number of non-empty statements in `sql`.
pub fn statement_count(sql: &str) -> usize {
    statement_words(sql).len()
}

/// Upper-cased first word of the first statement in `sql`.
pub fn leading_keyword(sql: &str) -> Option<String> {
    statement_words(sql)
        .into_iter()
        .next()
        .and_then(|words| words.into_iter().next())
}

/// Splits `sql` on top-level semicolons and returns the upper-cased bare words
/// of each statement, with `(` kept as its own token. String literals, quoted
/// identifiers and comments are skipped.
fn statement_words(sql: &str) -> Vec<Vec<String>> {
    let mut statements = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c.to_ascii_uppercase());
            continue;
        }
        if !word.is_empty() {
            current.push(std::mem::take(&mut word));
        }

        match c {
            '\'' | '"' | '`' => skip_past(&mut chars, c),
            '[' => skip_past(&mut chars, ']'),
            '(' => current.push(OPEN_PAREN.to_string()),
            '-' if chars.peek() == Some(&'-') => skip_past(&mut chars, '\n'),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            ';' if !current.is_empty() => statements.push(std::mem::take(&mut current)),
            _ => {}
        }
    }

    if !word.is_empty() {
        current.push(word);
    }
    if !current.is_empty() {
        statements.push(current);
    }
    statements
}

fn skip_past(chars: &mut Peekable<Chars<'_>>, end: char) {
    for next in chars.by_ref() {
        if next == end {
            break;
        }
    }
}
