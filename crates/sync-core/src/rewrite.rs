//! Bookmark predicate injection for source queries.
//!
//! The rewriter does not parse SQL. It scans the top level of the query
//! (outside parentheses, string literals, quoted identifiers, `$$` blocks and
//! comments) for the handful of keywords that decide where a predicate can
//! go, and splices `column > literal` in by conjunction.
//!
//! Queries whose output rows are not input rows (set operations, grouping,
//! `DISTINCT`, window functions) are wrapped instead, so the predicate
//! filters what the query returns rather than what it reads.
//!
//! If the query already filters on the watermark column, that predicate is
//! kept and the bookmark predicate is appended after it.

use bookmark::Watermark;

/// Alias of the derived table used when a query has to be wrapped.
const WRAP_ALIAS: &str = "bookmark_source";

/// Add `column > watermark` to `query`.
///
/// Returns the query unchanged when there is no watermark (first sync).
pub fn rewrite(query: &str, column: &str, watermark: Option<&Watermark>) -> String {
    let Some(watermark) = watermark else {
        return query.to_string();
    };

    let base = strip_terminator(query);
    let predicate = format!("{column} > {}", watermark.to_sql_literal());
    let words = scan(base).words;

    if needs_wrapping(&words) {
        return format!(
            "SELECT * FROM ({base}{}) AS {WRAP_ALIAS} WHERE {predicate}",
            comment_break(base)
        );
    }

    let tails = tail_clause_starts(&words);
    match words.iter().find(|w| w.upper == "WHERE") {
        Some(where_word) => {
            let pred_start = where_word.end;
            let pred_end = tails
                .iter()
                .copied()
                .find(|&t| t > where_word.start)
                .unwrap_or(base.len());
            let existing = base[pred_start..pred_end].trim();
            let head = base[..where_word.start].trim_end();
            join_parts(
                head,
                &format!(
                    "WHERE ({existing}{}) AND {predicate}",
                    comment_break(existing)
                ),
                &base[pred_end..],
            )
        }
        None => {
            let at = tails.first().copied().unwrap_or(base.len());
            join_parts(
                base[..at].trim_end(),
                &format!("WHERE {predicate}"),
                &base[at..],
            )
        }
    }
}

fn join_parts(head: &str, clause: &str, tail: &str) -> String {
    let separator = if scan(head).ends_in_line_comment {
        "\n"
    } else {
        " "
    };
    let tail = tail.trim();
    if tail.is_empty() {
        format!("{head}{separator}{clause}")
    } else {
        format!("{head}{separator}{clause} {tail}")
    }
}

/// A newline if `sql` ends inside a `--` or `//` comment, so text appended
/// after it is not swallowed by the comment.
fn comment_break(sql: &str) -> &'static str {
    if scan(sql).ends_in_line_comment {
        "\n"
    } else {
        ""
    }
}

fn strip_terminator(query: &str) -> &str {
    let mut q = query.trim();
    while let Some(stripped) = q.strip_suffix(';') {
        q = stripped.trim_end();
    }
    q
}

/// True when filtering input rows would change the rows the query returns.
fn needs_wrapping(words: &[Word]) -> bool {
    words.iter().enumerate().any(|(i, word)| match word.upper.as_str() {
        "UNION" | "INTERSECT" | "EXCEPT" | "MINUS" | "HAVING" | "QUALIFY" | "DISTINCT"
        | "OVER" => true,
        "GROUP" => words.get(i + 1).is_some_and(|next| next.upper == "BY"),
        _ => false,
    })
}

/// Byte offsets at which top-level tail clauses begin, in order.
fn tail_clause_starts(words: &[Word]) -> Vec<usize> {
    let mut starts = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let is_tail = match word.upper.as_str() {
            "HAVING" | "QUALIFY" | "LIMIT" | "OFFSET" | "FETCH" => true,
            "GROUP" | "ORDER" => words.get(i + 1).is_some_and(|next| next.upper == "BY"),
            _ => false,
        };
        if is_tail {
            starts.push(word.start);
        }
    }
    starts
}

struct Scan {
    words: Vec<Word>,
    ends_in_line_comment: bool,
}

#[derive(Debug)]
struct Word {
    upper: String,
    start: usize,
    end: usize,
}

/// Collect bare words appearing at parenthesis depth zero.
fn scan(sql: &str) -> Scan {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut depth = 0usize;
    let mut ends_in_line_comment = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' | b'"' | b'`' => i = skip_quoted(bytes, i, b),
            b'-' | b'/' if bytes.get(i + 1) == Some(&b) => {
                i = skip_line(bytes, i);
                ends_in_line_comment = i == bytes.len() && bytes.last() != Some(&b'\n');
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'$' if bytes.get(i + 1) == Some(&b'$') => i = skip_dollar_block(bytes, i),
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                if depth == 0 {
                    words.push(Word {
                        upper: sql[start..i].to_ascii_uppercase(),
                        start,
                        end: i,
                    });
                }
            }
            _ if b.is_ascii_digit() => {
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    Scan {
        words,
        ends_in_line_comment,
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Skip a quoted run; a doubled quote character is an escaped quote.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == b'\\' && quote == b'\'' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}

fn skip_dollar_block(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"$$")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookmark::parse_timestamp;

    fn int(v: i64) -> Watermark {
        Watermark::Int(v)
    }

    fn ts(s: &str) -> Watermark {
        Watermark::Timestamp(parse_timestamp(s).unwrap())
    }

    #[test]
    fn test_absent_watermark_returns_query_unchanged() {
        let q = "SELECT * FROM orders;  ";
        assert_eq!(rewrite(q, "id", None), q);
    }

    #[test]
    fn test_no_where_appends_predicate() {
        assert_eq!(
            rewrite("SELECT * FROM orders", "id", Some(&int(9))),
            "SELECT * FROM orders WHERE id > 9"
        );
    }

    #[test]
    fn test_strips_terminator() {
        assert_eq!(
            rewrite("  SELECT * FROM orders ;\n", "id", Some(&int(9))),
            "SELECT * FROM orders WHERE id > 9"
        );
    }

    #[test]
    fn test_existing_where_is_conjoined() {
        assert_eq!(
            rewrite(
                "SELECT * FROM orders WHERE status = 'open' OR status = 'new'",
                "updated_at",
                Some(&ts("2024-01-01 00:00:00"))
            ),
            "SELECT * FROM orders WHERE (status = 'open' OR status = 'new') AND updated_at > '2024-01-01 00:00:00'"
        );
    }

    #[test]
    fn test_predicate_goes_before_tail_clauses() {
        assert_eq!(
            rewrite(
                "select * from t where x = 1 order by id limit 10",
                "id",
                Some(&int(3))
            ),
            "select * from t WHERE (x = 1) AND id > 3 order by id limit 10"
        );
    }

    // =========================================================================
    // Queries filtered on their output rows
    // =========================================================================

    #[test]
    fn test_group_by_is_wrapped() {
        assert_eq!(
            rewrite(
                "SELECT id, MAX(updated_at) AS updated_at, SUM(amount) AS total FROM payments GROUP BY id",
                "updated_at",
                Some(&int(10))
            ),
            "SELECT * FROM (SELECT id, MAX(updated_at) AS updated_at, SUM(amount) AS total FROM payments GROUP BY id) AS bookmark_source WHERE updated_at > 10"
        );
    }

    #[test]
    fn test_having_and_distinct_are_wrapped() {
        assert_eq!(
            rewrite(
                "SELECT a, count(*) AS n FROM t WHERE x = 1 GROUP BY a HAVING count(*) > 1",
                "n",
                Some(&int(3))
            ),
            "SELECT * FROM (SELECT a, count(*) AS n FROM t WHERE x = 1 GROUP BY a HAVING count(*) > 1) AS bookmark_source WHERE n > 3"
        );
        assert_eq!(
            rewrite("SELECT DISTINCT id FROM t", "id", Some(&int(3))),
            "SELECT * FROM (SELECT DISTINCT id FROM t) AS bookmark_source WHERE id > 3"
        );
    }

    #[test]
    fn test_nested_where_is_ignored() {
        assert_eq!(
            rewrite(
                "WITH recent AS (SELECT * FROM t WHERE x > 1) SELECT * FROM recent",
                "id",
                Some(&int(7))
            ),
            "WITH recent AS (SELECT * FROM t WHERE x > 1) SELECT * FROM recent WHERE id > 7"
        );
    }

    #[test]
    fn test_keywords_in_strings_and_comments_are_ignored() {
        assert_eq!(
            rewrite(
                "SELECT 'where' AS \"ORDER BY\" FROM t -- limit 5\n",
                "id",
                Some(&int(1))
            ),
            "SELECT 'where' AS \"ORDER BY\" FROM t -- limit 5\nWHERE id > 1"
        );
    }

    #[test]
    fn test_trailing_comment_in_where_is_closed() {
        assert_eq!(
            rewrite(
                "SELECT * FROM t WHERE x = 1 -- only x\nORDER BY id",
                "id",
                Some(&int(1))
            ),
            "SELECT * FROM t WHERE (x = 1 -- only x\n) AND id > 1 ORDER BY id"
        );
    }

    #[test]
    fn test_window_function_is_wrapped() {
        assert_eq!(
            rewrite(
                "SELECT id, row_number() OVER (ORDER BY ts) AS rn FROM t",
                "id",
                Some(&int(2))
            ),
            "SELECT * FROM (SELECT id, row_number() OVER (ORDER BY ts) AS rn FROM t) AS bookmark_source WHERE id > 2"
        );
    }

    #[test]
    fn test_grouping_inside_subquery_is_not_wrapped() {
        assert_eq!(
            rewrite(
                "WITH totals AS (SELECT id, SUM(x) AS s FROM t GROUP BY id) SELECT * FROM totals ORDER BY id",
                "id",
                Some(&int(2))
            ),
            "WITH totals AS (SELECT id, SUM(x) AS s FROM t GROUP BY id) SELECT * FROM totals WHERE id > 2 ORDER BY id"
        );
    }

    #[test]
    fn test_set_operation_is_wrapped() {
        assert_eq!(
            rewrite(
                "SELECT id FROM a UNION ALL SELECT id FROM b;",
                "id",
                Some(&int(4))
            ),
            "SELECT * FROM (SELECT id FROM a UNION ALL SELECT id FROM b) AS bookmark_source WHERE id > 4"
        );
    }

    #[test]
    fn test_existing_filter_on_column_is_kept() {
        assert_eq!(
            rewrite("SELECT * FROM t WHERE id > 100", "id", Some(&int(5))),
            "SELECT * FROM t WHERE (id > 100) AND id > 5"
        );
    }

    #[test]
    fn test_qualify_is_wrapped() {
        assert_eq!(
            rewrite(
                "SELECT * FROM t QUALIFY row_number() OVER (PARTITION BY k ORDER BY ts DESC) = 1;",
                "ts",
                Some(&ts("2024-02-03 04:05:06.5"))
            ),
            "SELECT * FROM (SELECT * FROM t QUALIFY row_number() OVER (PARTITION BY k ORDER BY ts DESC) = 1) AS bookmark_source WHERE ts > '2024-02-03 04:05:06.500'"
        );
    }
}
