/// Placeholder used when an uploaded name sanitizes to nothing.
pub const FALLBACK_FILENAME: &str = "unnamed";

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// The mapping is one character in, one character out, so multi-byte
/// characters collapse to a single underscore. A dot directly following
/// another dot is also replaced, so the result never contains `..`.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized = String::with_capacity(filename.len());
    for c in filename.chars() {
        let keep = c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-';
        if keep && !(c == '.' && sanitized.ends_with('.')) {
            sanitized.push(c);
        } else {
            sanitized.push('_');
        }
    }

    if sanitized.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Lexical check that a client supplied stored name stays inside the
/// storage root. Never touches the filesystem.
pub fn is_safe_stored_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name.contains("..") {
        return false;
    }

    // Separators, drive markers and NUL
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c == ':' || c == '\0')
    {
        tracing::warn!("Path traversal attempt detected: {:?}", name);
        return false;
    }

    true
}
