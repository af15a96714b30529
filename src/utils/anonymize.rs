// Query text anonymization
// Replaces literal values with a placeholder so that structurally identical
// queries share one fingerprint.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches single-quoted string literals, standalone integer literals and
/// double-quoted identifiers-as-literals in one pass.
static LITERALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'[^']*'|\d+|".*?""#).expect("invalid anonymization regex"));

/// Replace every literal in `query` with `?`.
///
/// Idempotent: the placeholder itself never matches, so re-anonymizing an
/// already-anonymized string is a no-op.
pub fn anonymize_query_text(query: &str) -> String {
    LITERALS.replace_all(query, "?").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_integer_and_string_literals() {
        let anonymized =
            anonymize_query_text("SELECT * FROM t WHERE id = 123 AND name = 'John'");
        assert_eq!(anonymized, "SELECT * FROM t WHERE id = ? AND name = ?");
    }

    #[test]
    fn replaces_double_quoted_literals() {
        let anonymized = anonymize_query_text(r#"SELECT * FROM t WHERE label = "blue""#);
        assert_eq!(anonymized, "SELECT * FROM t WHERE label = ?");
    }

    #[test]
    fn is_idempotent() {
        let once = anonymize_query_text("SELECT * FROM orders WHERE id=5");
        let twice = anonymize_query_text(&once);
        assert_eq!(once, "SELECT * FROM orders WHERE id=?");
        assert_eq!(once, twice);
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(anonymize_query_text("SELECT a, b FROM t"), "SELECT a, b FROM t");
    }
}
