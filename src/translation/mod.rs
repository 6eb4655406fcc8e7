mod scanner;

use scanner::{
    State, is_block_comment_end, is_block_comment_start, is_line_comment_start, matches_tag,
    scan_digits, try_start_dollar_quote,
};

use crate::error::PgSteadyError;

/// A raw SQL fragment with its placeholders rewritten to absolute `$N` positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbered {
    pub sql: String,
    /// Highest placeholder position referenced, relative to the fragment.
    pub placeholders: usize,
}

/// Rewrite the placeholders of a caller-supplied fragment so they follow `offset`
/// already-bound parameters.
///
/// Bare `?` are numbered in order of appearance; `?N` and `$N` are treated as
/// fragment-relative and shifted by `offset`. Quoted literals, comments and
/// dollar-quoted bodies are copied untouched.
///
/// The jsonb operators `?|` and `?&` are left alone. A lone `?` is always a
/// placeholder, so test for a jsonb key with `jsonb_exists(col, key)` instead.
///
/// ```rust
/// use pg_steady::translation::renumber_placeholders;
///
/// let out = renumber_placeholders("age > ? AND name = ?", 2).unwrap();
/// assert_eq!(out.sql, "age > $3 AND name = $4");
/// assert_eq!(out.placeholders, 2);
/// ```
///
/// # Errors
/// Returns `PgSteadyError::ParameterError` if a numbered placeholder is `0` or
/// does not fit in `usize`.
pub fn renumber_placeholders(sql: &str, offset: usize) -> Result<Renumbered, PgSteadyError> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;
    let mut bare = 0usize;
    let mut highest = 0usize;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' | b'?' => {
                    if b == b'$'
                        && let Some((tag, close)) = try_start_dollar_quote(bytes, idx)
                    {
                        state = State::DollarQuoted(tag);
                        idx = close;
                    } else if let Some((digits_end, digits)) = scan_digits(bytes, idx + 1) {
                        let relative: usize = digits.parse().map_err(|_| {
                            PgSteadyError::ParameterError(format!("placeholder out of range: {digits}"))
                        })?;
                        if relative == 0 {
                            return Err(PgSteadyError::ParameterError(
                                "placeholders are numbered from 1".into(),
                            ));
                        }
                        highest = highest.max(relative);
                        out.push_str(&sql[copied..idx]);
                        out.push('$');
                        out.push_str(&(relative + offset).to_string());
                        copied = digits_end;
                        idx = digits_end - 1;
                    } else if b == b'?' && matches!(bytes.get(idx + 1), Some(b'|' | b'&')) {
                        // jsonb `?|` / `?&` operators
                        idx += 1;
                    } else if b == b'?' {
                        bare += 1;
                        highest = highest.max(bare);
                        out.push_str(&sql[copied..idx]);
                        out.push('$');
                        out.push_str(&(bare + offset).to_string());
                        copied = idx + 1;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    out.push_str(&sql[copied..]);
    Ok(Renumbered {
        sql: out,
        placeholders: highest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_bare_question_marks_after_offset() {
        let res = renumber_placeholders("a = ? AND b >= ?", 0).unwrap();
        assert_eq!(res.sql, "a = $1 AND b >= $2");
        assert_eq!(res.placeholders, 2);

        let res = renumber_placeholders("a = ?", 3).unwrap();
        assert_eq!(res.sql, "a = $4");
    }

    #[test]
    fn shifts_numbered_placeholders() {
        let res = renumber_placeholders("a = $1 OR b = $1 OR c = ?2", 2).unwrap();
        assert_eq!(res.sql, "a = $3 OR b = $3 OR c = $4");
        assert_eq!(res.placeholders, 2);
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "name = '?' AND x = $1 -- $2\n/* ? */ AND y = ?2";
        let res = renumber_placeholders(sql, 1).unwrap();
        assert_eq!(res.sql, "name = '?' AND x = $2 -- $2\n/* ? */ AND y = $3");
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let sql = "body = $foo$ ? $1 $foo$ AND id = ?";
        let res = renumber_placeholders(sql, 0).unwrap();
        assert_eq!(res.sql, "body = $foo$ ? $1 $foo$ AND id = $1");
    }

    #[test]
    fn keeps_multibyte_text_intact() {
        let res = renumber_placeholders("note = 'héllo ✓' AND id = ?", 0).unwrap();
        assert_eq!(res.sql, "note = 'héllo ✓' AND id = $1");
    }

    #[test]
    fn leaves_jsonb_array_operators_alone() {
        let res = renumber_placeholders("tags ?| ? AND attrs ?& $2", 1).unwrap();
        assert_eq!(res.sql, "tags ?| $2 AND attrs ?& $3");
        assert_eq!(res.placeholders, 2);
    }

    #[test]
    fn rejects_zero_placeholder() {
        assert!(matches!(
            renumber_placeholders("a = $0", 0),
            Err(PgSteadyError::ParameterError(_))
        ));
    }

    #[test]
    fn fragment_without_placeholders_is_unchanged() {
        let res = renumber_placeholders("deleted_at IS NULL", 5).unwrap();
        assert_eq!(res.sql, "deleted_at IS NULL");
        assert_eq!(res.placeholders, 0);
    }
}
