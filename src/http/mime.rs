//! Content types by file extension.

use std::path::Path;

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

const TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
];

/// Content type for the last `.`-delimited extension of `path`, compared
/// case-insensitively. Unknown or missing extensions map to `text/plain`.
pub fn content_type_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            TYPES
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(ext))
                .map(|(_, mime)| *mime)
        })
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
