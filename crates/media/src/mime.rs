use std::path::Path;

/// Normalize a client-supplied content type: lowercase, parameters dropped.
pub fn normalize(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_allowed(content_type: &str, allowlist: &[String]) -> bool {
    let mime = normalize(content_type);
    allowlist.iter().any(|a| a.eq_ignore_ascii_case(&mime))
}

/// Extension of the original file name including the dot (`".pdf"`), or an
/// empty string. Extensions that are not short and alphanumeric are dropped.
pub fn extension_of(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}
