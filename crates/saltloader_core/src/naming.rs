//! Identifier rules shared by capability keys, virtual names and dispatch keys.

/// Returns true for one name segment: `[a-z0-9_]`, not empty, not starting
/// with a digit.
///
/// Leading underscores are allowed here; exposure rules for private function
/// names live in the loader.
pub fn is_valid_segment(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_lowercase() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Splits `<virtual>.<function>` into its two segments.
///
/// Returns `None` for anything but exactly two valid segments.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let (module, function) = name.split_once('.')?;
    if function.contains('.') || !is_valid_segment(module) || !is_valid_segment(function) {
        return None;
    }
    Some((module, function))
}

/// Joins a virtual name and a function name into a dispatch key.
pub fn qualify(module: &str, function: &str) -> String {
    format!("{module}.{function}")
}
