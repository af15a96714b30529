// String helpers for building SQL filter fragments and cleaning config input.

/// Quote every name and join with commas, for `IN (%s)` substitution points.
///
/// # Example
/// ```ignore
/// assert_eq!(quoted_list(&["app".into(), "crm".into()]), "'app','crm'");
/// ```
pub fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("'{}'", name))
        .collect::<Vec<_>>()
        .join(",")
}

/// Join numeric ids with commas, for `IN (%s)` substitution points.
pub fn joined_ids(ids: &[i64]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

/// Clean a string and return Option, empty strings become None.
pub trait StringExt {
    fn clean(&self) -> Option<String>;
}

impl StringExt for str {
    #[inline]
    fn clean(&self) -> Option<String> {
        let trimmed = self.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl StringExt for String {
    #[inline]
    fn clean(&self) -> Option<String> {
        self.as_str().clean()
    }
}
