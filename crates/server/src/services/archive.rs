//! Upload resolution: turns a raw upload (bare `index.html` or a zip
//! archive) into the set of files to publish, with paths made relative to
//! the publish root.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("File size exceeds the upload limit")]
    PayloadTooLarge,

    #[error("Only index.html or ZIP files containing index.html are allowed")]
    UnsupportedUpload,

    #[error("index.html not found")]
    NoEntryPoint,

    #[error("Multiple index.html files found, ambiguous structure")]
    AmbiguousEntryPoint,

    #[error("Invalid zip archive: {0}")]
    InvalidArchive(String),
}

/// One file of a resolved site, addressed relative to the publish root
/// with forward-slash separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
    pub path: String,
    pub data: Vec<u8>,
}

/// Resolves an upload into the files to store. The size cap is enforced
/// on the raw bytes before any extraction work.
pub fn resolve_upload(
    filename: &str,
    data: &[u8],
    max_bytes: u64,
) -> Result<Vec<SiteFile>, ArchiveError> {
    if data.len() as u64 > max_bytes {
        return Err(ArchiveError::PayloadTooLarge);
    }

    if filename == "index.html" {
        return Ok(vec![SiteFile {
            path: "index.html".to_string(),
            data: data.to_vec(),
        }]);
    }

    if filename.ends_with(".zip") {
        return resolve_zip(data);
    }

    Err(ArchiveError::UnsupportedUpload)
}

fn resolve_zip(data: &[u8]) -> Result<Vec<SiteFile>, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

    // First pass: collect safe entry paths and locate the directories
    // that directly contain an index.html.
    let mut entries = Vec::new();
    let mut index_dirs = BTreeSet::new();

    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        // enclosed_name rejects absolute paths and `..` components
        let Some(path) = entry.enclosed_name() else {
            continue;
        };
        let normalized = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if normalized == "index.html" || normalized.ends_with("/index.html") {
            let dir = normalized
                .rsplit_once('/')
                .map(|(dir, _)| dir.to_string())
                .unwrap_or_default();
            index_dirs.insert(dir);
        }
        entries.push((i, normalized));
    }

    if index_dirs.is_empty() {
        return Err(ArchiveError::NoEntryPoint);
    }
    if index_dirs.len() > 1 {
        return Err(ArchiveError::AmbiguousEntryPoint);
    }
    let root = index_dirs.into_iter().next().unwrap_or_default();

    // Second pass: read everything under the publish root, paths relative
    // to it.
    let mut files = Vec::new();
    for (i, normalized) in entries {
        let relative = if root.is_empty() {
            normalized
        } else {
            match normalized.strip_prefix(&format!("{root}/")) {
                Some(rest) => rest.to_string(),
                None => continue,
            }
        };

        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

        files.push(SiteFile {
            path: relative,
            data,
        });
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(paths: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            for (path, data) in paths {
                writer
                    .start_file(path.to_string(), SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    const MAX: u64 = 20 * 1024 * 1024;

    #[test]
    fn bare_index_html_is_a_single_file_site() {
        let files = resolve_upload("index.html", b"<html></html>", MAX).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "index.html");
        assert_eq!(files[0].data, b"<html></html>");
    }

    #[test]
    fn other_filenames_are_rejected() {
        let err = resolve_upload("site.tar.gz", b"data", MAX).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedUpload));
    }

    #[test]
    fn size_cap_is_checked_before_extraction() {
        let zip = make_zip(&[("index.html", b"hi")]);
        let err = resolve_upload("site.zip", &zip, 1).unwrap_err();
        assert!(matches!(err, ArchiveError::PayloadTooLarge));
    }

    #[test]
    fn zip_with_root_index() {
        let zip = make_zip(&[("index.html", b"<html>"), ("assets/a.js", b"js")]);
        let mut files = resolve_upload("site.zip", &zip, MAX).unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "assets/a.js");
        assert_eq!(files[1].path, "index.html");
    }

    #[test]
    fn nested_root_paths_are_relative_to_it() {
        let zip = make_zip(&[
            ("site/index.html", b"<html>"),
            ("site/assets/a.js", b"js"),
            ("site/css/style.css", b"css"),
        ]);
        let mut files = resolve_upload("demo.zip", &zip, MAX).unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["assets/a.js", "css/style.css", "index.html"]);
    }

    #[test]
    fn files_outside_the_root_are_excluded() {
        let zip = make_zip(&[("site/index.html", b"<html>"), ("README.md", b"docs")]);
        let files = resolve_upload("demo.zip", &zip, MAX).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "index.html");
    }

    #[test]
    fn zip_without_index_fails() {
        let zip = make_zip(&[("about.html", b"<html>")]);
        let err = resolve_upload("site.zip", &zip, MAX).unwrap_err();
        assert!(matches!(err, ArchiveError::NoEntryPoint));
    }

    #[test]
    fn zip_with_two_index_files_is_ambiguous() {
        let zip = make_zip(&[("a/index.html", b"1"), ("b/index.html", b"2")]);
        let err = resolve_upload("site.zip", &zip, MAX).unwrap_err();
        assert!(matches!(err, ArchiveError::AmbiguousEntryPoint));
    }

    #[test]
    fn corrupt_archive_is_reported() {
        let err = resolve_upload("site.zip", b"not a zip", MAX).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidArchive(_)));
    }
}
