use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// One row of a directory listing. Names are kept as raw bytes so that
/// links to non-UTF-8 names still resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: OsString,
    pub is_dir: bool,
}

impl Entry {
    pub fn new(name: impl Into<OsString>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
        }
    }
}

/// Reads the entries of `dir`, classifying each with a `stat` that follows
/// symlinks. Sorted by name; `.` is never included. `..` is included when
/// `with_parent` is set.
pub fn read_entries(dir: &Path, with_parent: bool) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for item in fs::read_dir(dir)? {
        let item = item?;
        // A dangling symlink has no target to stat; list it as a file.
        let is_dir = fs::metadata(item.path())
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        entries.push(Entry::new(item.file_name(), is_dir));
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    if with_parent {
        entries.insert(0, Entry::new("..", true));
    }

    Ok(entries)
}

/// Renders the listing page for `url_path`, the path as the client sent it,
/// which must end with `/`. Links append the percent-encoded entry name to
/// it and labels show the name decoded. Directories get a trailing `/` on
/// both the link and the label.
pub fn render(url_path: &str, entries: &[Entry]) -> String {
    let base = escape_html(url_path);
    let decoded = urlencoding::decode_binary(url_path.as_bytes());
    let title = escape_html(&String::from_utf8_lossy(&decoded));
    let mut html = format!(
        "<html><head><title>Directory {title}</title></head><body><h1>Directory {title}</h1><ul>"
    );

    for entry in entries {
        let slash = if entry.is_dir { "/" } else { "" };
        let href = urlencoding::encode_binary(entry.name.as_bytes());
        let label = escape_html(&entry.name.to_string_lossy());
        let _ = write!(
            html,
            "<li><a href=\"{base}{href}{slash}\">{label}{slash}</a></li>"
        );
    }

    html.push_str("</ul></body></html>");
    html
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
