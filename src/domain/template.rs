//! `#{path}` placeholder substitution shared by signatures and text modules.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}").expect("placeholder regex")
});

/// Rendered in place of a placeholder nothing resolves.
pub const UNKNOWN_VALUE: &str = "-";

/// Replace every `#{a.b.c}` with `resolve("a.b.c")`, or `-` when it returns `None`.
pub fn render<F>(template: &str, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            resolve(&caps[1]).unwrap_or_else(|| UNKNOWN_VALUE.to_string())
        })
        .into_owned()
}
