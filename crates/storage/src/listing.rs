//! Folder-listing document generation.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::StorageError;

struct Entry {
    name: String,
    is_dir: bool,
    size: u64,
    modified: Option<DateTime<Utc>>,
}

/// Generates an `x-obex/folder-listing` document for `dir`.
///
/// Folders come first, then files, each group sorted by name. Hidden
/// entries (leading `.`) and entries whose names are not valid UTF-8 are
/// skipped. A `<parent-folder/>` element is emitted unless `at_root`.
pub fn folder_listing(dir: &Path, at_root: bool) -> Result<Vec<u8>, StorageError> {
    let mut entries: Vec<Entry> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if name.starts_with('.') {
                return None;
            }
            let metadata = entry.metadata().ok()?;
            Some(Entry {
                name,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            })
        })
        .collect();

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

    let mut xml = String::from(
        "<?xml version=\"1.0\"?>\n\
         <!DOCTYPE folder-listing SYSTEM \"obex-folder-listing.dtd\">\n\
         <folder-listing version=\"1.0\">\n",
    );
    if !at_root {
        xml.push_str("  <parent-folder/>\n");
    }
    for entry in &entries {
        let element = if entry.is_dir { "folder" } else { "file" };
        let _ = write!(xml, "  <{element} name=\"{}\"", escape(&entry.name));
        if !entry.is_dir {
            let _ = write!(xml, " size=\"{}\"", entry.size);
        }
        if let Some(modified) = &entry.modified {
            let _ = write!(
                xml,
                " modified=\"{}\"",
                obexbox_protocol::time::format_iso8601(modified)
            );
        }
        xml.push_str("/>\n");
    }
    xml.push_str("</folder-listing>\n");

    Ok(xml.into_bytes())
}

/// Escapes text for use inside an XML attribute.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_folders_then_files() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path();
        std::fs::create_dir(base.join("zeta")).unwrap();
        std::fs::write(base.join("b.txt"), "1234").unwrap();
        std::fs::write(base.join("a&b.txt"), "").unwrap();
        std::fs::write(base.join(".hidden"), "x").unwrap();

        let xml = String::from_utf8(folder_listing(base, true).unwrap()).unwrap();
        let zeta = xml.find("<folder name=\"zeta\"").unwrap();
        let amp = xml.find("<file name=\"a&amp;b.txt\" size=\"0\"").unwrap();
        let b = xml.find("<file name=\"b.txt\" size=\"4\"").unwrap();
        assert!(zeta < amp && amp < b);
        assert!(!xml.contains(".hidden"));
        assert!(!xml.contains("parent-folder"));
        assert!(xml.ends_with("</folder-listing>\n"));
    }

    #[test]
    fn parent_folder_below_root() {
        let tmp = tempfile::tempdir().unwrap();
        let xml = String::from_utf8(folder_listing(tmp.path(), false).unwrap()).unwrap();
        assert!(xml.contains("<parent-folder/>"));
    }

    #[test]
    fn missing_directory_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(folder_listing(&tmp.path().join("nope"), true).is_err());
    }

    #[test]
    fn escape_covers_markup() {
        assert_eq!(escape("<a href='x'>\"&"), "&lt;a href=&apos;x&apos;&gt;&quot;&amp;");
    }
}
