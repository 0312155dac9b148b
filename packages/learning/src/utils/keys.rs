use uuid::Uuid;

/// Placeholder stored in a record while its file is still being written.
pub const PLACEHOLDER_KEY: &str = "dummy";

/// Key prefix shared by every object owned by `owner`.
pub fn owner_prefix(owner: &str) -> String {
    format!("{owner}-")
}

/// Build a fresh storage key: `{owner}-{uuid}-{filename}`.
pub fn object_key(owner: &str, original_filename: &str) -> String {
    format!(
        "{}{}-{}",
        owner_prefix(owner),
        Uuid::now_v7(),
        sanitize_filename(original_filename)
    )
}

/// Reduce an uploaded filename to characters that are safe in a flat object key.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Recover the object key from a stored file reference.
///
/// Records may hold either a bare key or a full URL; in the latter case the
/// key is the last path segment, without query string or fragment.
pub fn object_key_from_stored(stored: &str) -> &str {
    let without_query = stored.split(['?', '#']).next().unwrap_or(stored);
    without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
}
