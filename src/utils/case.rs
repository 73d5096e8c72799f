use regex::{Captures, Regex};
use std::sync::OnceLock;

fn capital_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\.?([A-Z])").expect("static pattern"))
}

/// Convert a camelCase identifier to snake_case.
///
/// A dot immediately before a capital is folded into the separator, and a
/// leading capital does not produce a leading underscore.
pub fn camel_to_snake(input: &str) -> String {
    let replaced = capital_pattern().replace_all(input, |caps: &Captures| {
        format!("_{}", caps[1].to_lowercase())
    });
    match replaced.strip_prefix('_') {
        Some(rest) => rest.to_string(),
        None => replaced.into_owned(),
    }
}
