//! Environment variable interpolation for config files.
//!
//! | Syntax            | Unset        | Empty        |
//! |-------------------|--------------|--------------|
//! | `$VAR`, `${VAR}`  | error        | empty        |
//! | `${VAR:-dflt}`    | `dflt`       | `dflt`       |
//! | `${VAR-dflt}`     | `dflt`       | empty        |
//! | `$$`              | literal `$`  |              |

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$(?:(?P<escape>\$)|\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)(?:(?P<op>:?-)(?P<fallback>[^}]*))?\}|(?P<bare>[A-Za-z_][A-Za-z0-9_]*))",
    )
    .expect("Invalid env reference pattern")
});

/// What to do when a variable is unset or empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback<'a> {
    Required,
    IfUnset(&'a str),
    IfUnsetOrEmpty(&'a str),
}

impl<'a> Fallback<'a> {
    fn from_captures(caps: &Captures<'a>) -> Self {
        let fallback = caps.name("fallback").map_or("", |m| m.as_str());
        match caps.name("op").map(|m| m.as_str()) {
            Some(":-") => Fallback::IfUnsetOrEmpty(fallback),
            Some(_) => Fallback::IfUnset(fallback),
            None => Fallback::Required,
        }
    }
}

fn resolve(name: &str, fallback: Fallback<'_>) -> Result<String, String> {
    match (env::var(name), fallback) {
        (Ok(value), _) if value.contains(['\n', '\r']) => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        (Ok(value), Fallback::IfUnsetOrEmpty(dflt)) if value.is_empty() => Ok(dflt.to_string()),
        (Ok(value), _) => Ok(value),
        (Err(_), Fallback::IfUnset(dflt) | Fallback::IfUnsetOrEmpty(dflt)) => Ok(dflt.to_string()),
        (Err(_), Fallback::Required) => Err(format!("environment variable '{name}' is not set")),
    }
}

/// Substitute environment references in `input`.
///
/// Every failing reference is collected so a config with several missing
/// variables reports all of them at once.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = REFERENCE.replace_all(input, |caps: &Captures| {
        if caps.name("escape").is_some() {
            return "$".to_string();
        }
        let name = caps
            .name("braced")
            .or_else(|| caps.name("bare"))
            .map_or("", |m| m.as_str());

        resolve(name, Fallback::from_captures(caps)).unwrap_or_else(|e| {
            errors.push(e);
            String::new()
        })
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names so tests can run in parallel.
    fn set(key: &str, value: &str) {
        // SAFETY: variable names are unique to a single test.
        unsafe { env::set_var(key, value) }
    }

    fn unset(key: &str) {
        // SAFETY: variable names are unique to a single test.
        unsafe { env::remove_var(key) }
    }

    #[test]
    fn test_bare_and_braced() {
        set("SNOWDRIFT_T_BUCKET", "docs");
        let text = interpolate("a: $SNOWDRIFT_T_BUCKET, b: ${SNOWDRIFT_T_BUCKET}/x").unwrap();
        assert_eq!(text, "a: docs, b: docs/x");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        unset("SNOWDRIFT_T_GONE_1");
        unset("SNOWDRIFT_T_GONE_2");
        let errors = interpolate("$SNOWDRIFT_T_GONE_1 ${SNOWDRIFT_T_GONE_2}").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("SNOWDRIFT_T_GONE_1"));
        assert!(errors[1].contains("not set"));
    }

    #[test]
    fn test_fallbacks() {
        unset("SNOWDRIFT_T_UNSET");
        set("SNOWDRIFT_T_EMPTY", "");
        set("SNOWDRIFT_T_SET", "real");

        assert_eq!(interpolate("${SNOWDRIFT_T_UNSET:-d}").unwrap(), "d");
        assert_eq!(interpolate("${SNOWDRIFT_T_UNSET-d}").unwrap(), "d");
        assert_eq!(interpolate("${SNOWDRIFT_T_EMPTY:-d}").unwrap(), "d");
        assert_eq!(interpolate("${SNOWDRIFT_T_EMPTY-d}").unwrap(), "");
        assert_eq!(interpolate("${SNOWDRIFT_T_SET:-d}").unwrap(), "real");
    }

    #[test]
    fn test_escape() {
        assert_eq!(interpolate("cost: $$5").unwrap(), "cost: $5");
    }

    #[test]
    fn test_newlines_rejected() {
        set("SNOWDRIFT_T_MULTILINE", "a\nb");
        let errors = interpolate("$SNOWDRIFT_T_MULTILINE").unwrap_err();
        assert!(errors[0].contains("newlines"));
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(interpolate("page_size: 5").unwrap(), "page_size: 5");
    }
}
