//! Type-name helpers.

/// Uppercase the first character.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Singularize an English collection name.
///
/// Covers the regular plural forms collection names use in practice
/// (`orders`, `categories`, `addresses`, `boxes`); irregular words pass through.
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let stem = |suffix_len: usize| word[..word.len() - suffix_len].to_string();

    if lower.ends_with("ies") && word.len() > 3 {
        format!("{}y", stem(3))
    } else if ["sses", "shes", "ches", "xes", "zes"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        stem(2)
    } else if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        word.to_string()
    } else if lower.ends_with('s') && word.len() > 1 {
        stem(1)
    } else {
        word.to_string()
    }
}

/// Name of a facet's root type: singular and capitalized.
pub fn root_type_name(facet: &str) -> String {
    singularize(&capitalize(facet))
}

/// Name of a composite type nested under `parent` at `field`.
pub fn nested_type_name(parent: &str, field: &str) -> String {
    format!("{parent}{}", capitalize(field))
}
