use std::path::Path;

const MAX_NAME_BYTES: usize = 255;

/// Reduce a client-supplied filename to a display-safe basename.
///
/// Directory components are dropped (both `/` and `\`), control characters
/// removed, and the result truncated to 255 bytes on a char boundary.
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let name = Path::new(last).file_name()?.to_str()?;

    let clean: String = name.chars().filter(|c| !c.is_control()).collect();
    let clean = clean.trim();
    if clean.is_empty() || clean == "." || clean == ".." {
        return None;
    }

    let mut end = clean.len().min(MAX_NAME_BYTES);
    while !clean.is_char_boundary(end) {
        end -= 1;
    }
    Some(clean[..end].to_owned())
}
