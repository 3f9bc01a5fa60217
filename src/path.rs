//! Path sanitization for PUT names and a strict validator for GET names.
//!
//! The PUT sanitizer is deliberately weak (it only strips leading `/`,
//! `./`, and `../` segments) — it exists to make accidental paths
//! harmless, not to resist an adversary. GET names never pass through the
//! sanitizer at all; they are validated with [`validate_get_name`] and
//! rejected outright if they could resolve outside the serving directory.

/// Repeatedly strips one leading `/`, `./`, or `../` segment until no rule
/// applies. The result may be empty; callers MUST reject the empty name
/// before using it to create a file.
pub fn sanitize_put_name(raw: &str) -> String {
    let mut name = raw;
    loop {
        if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix("../") {
            name = rest;
        } else {
            break;
        }
    }
    name.to_string()
}

/// Returns true only for names that are safe to join onto the serving
/// directory by string concatenation: non-empty, no `/`, and not `.` or
/// `..`. GET names are looked up directly (no leading-segment stripping),
/// so any separator or traversal segment is rejected rather than reduced.
pub fn validate_get_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    !name.contains('/') && !name.contains('\\')
}
