//! Archive expander (§4.11).
//!
//! Recognizes `.zip`, `.gz`, `.tar`, `.tar.gz`, `.tgz`, `.tar.bz2`, `.tbz2`.
//! `extract_xml_from_archive` extracts into a fresh temp directory and
//! recursively collects every non-dotfile `.xml` (case-insensitive), then
//! removes the temp directory regardless of outcome. A bare `.gz` is
//! treated as a single decompressed payload, named after the stripped
//! filename, rather than searched for `.xml` members.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tempfile::TempDir;

use crate::error::{EngineError, EngineResult};
use crate::Document;

const ARCHIVE_EXTENSIONS: &[&str] = &[".zip", ".gz", ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2"];

pub fn is_archive(path: &Path) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    ARCHIVE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Extracts `archive_path`'s contents into `dest` (must already exist).
/// Used by the schema catalogue to unpack schema distributions, where the
/// caller wants the files on disk rather than collected as [`Document`]s.
pub fn extract_all(archive_path: &Path, dest: &Path) -> EngineResult<()> {
    let name = archive_path.to_string_lossy().to_lowercase();
    if name.ends_with(".zip") {
        extract_zip(archive_path, dest)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive_path, dest)
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        extract_tar_bz2(archive_path, dest)
    } else if name.ends_with(".tar") {
        extract_tar(archive_path, dest)
    } else if name.ends_with(".gz") {
        extract_bare_gz(archive_path, dest)
    } else {
        Err(EngineError::Archive(format!(
            "{} does not have a recognized archive extension",
            archive_path.display()
        )))
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> EngineResult<()> {
    let file = File::open(archive_path).map_err(|e| EngineError::Archive(format!("could not open archive: {}", e)))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| EngineError::Archive(format!("invalid zip archive: {}", e)))?;
    zip.extract(dest).map_err(|e| EngineError::Archive(format!("could not extract zip archive: {}", e)))
}

fn extract_tar(archive_path: &Path, dest: &Path) -> EngineResult<()> {
    let file = File::open(archive_path).map_err(|e| EngineError::Archive(format!("could not open archive: {}", e)))?;
    let mut archive = tar::Archive::new(file);
    archive.unpack(dest).map_err(|e| EngineError::Archive(format!("could not extract tar archive: {}", e)))
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> EngineResult<()> {
    let file = File::open(archive_path).map_err(|e| EngineError::Archive(format!("could not open archive: {}", e)))?;
    let decoder = GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest).map_err(|e| EngineError::Archive(format!("could not extract tar.gz archive: {}", e)))
}

fn extract_tar_bz2(archive_path: &Path, dest: &Path) -> EngineResult<()> {
    let file = File::open(archive_path).map_err(|e| EngineError::Archive(format!("could not open archive: {}", e)))?;
    let decoder = bzip2::read::BzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest).map_err(|e| EngineError::Archive(format!("could not extract tar.bz2 archive: {}", e)))
}

fn extract_bare_gz(archive_path: &Path, dest: &Path) -> EngineResult<()> {
    let file = File::open(archive_path).map_err(|e| EngineError::Archive(format!("could not open archive: {}", e)))?;
    let mut decoder = GzDecoder::new(file);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| EngineError::Archive(format!("could not decompress gz payload: {}", e)))?;
    let stripped_name = stripped_gz_name(archive_path);
    std::fs::write(dest.join(stripped_name), out).map_err(|e| EngineError::Archive(format!("could not write decompressed payload: {}", e)))
}

fn stripped_gz_name(archive_path: &Path) -> String {
    let name = archive_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    name.strip_suffix(".gz").map(str::to_string).unwrap_or(name)
}

/// Extracts `archive_path` into a fresh temp directory, collects every
/// `.xml` file it contains as a [`Document`], and removes the temp
/// directory before returning, on both success and failure.
pub fn extract_xml_from_archive(archive_path: &Path) -> EngineResult<Vec<Document>> {
    let temp_dir = TempDir::new().map_err(|e| EngineError::Archive(format!("could not create temp directory: {}", e)))?;

    let name = archive_path.to_string_lossy().to_lowercase();
    let result = if name.ends_with(".gz") && !name.ends_with(".tar.gz") {
        extract_bare_gz(archive_path, temp_dir.path()).map(|_| {
            let stripped = stripped_gz_name(archive_path);
            temp_dir.path().join(&stripped)
        })
    } else {
        extract_all(archive_path, temp_dir.path()).map(|_| temp_dir.path().to_path_buf())
    };

    let collected = result.and_then(|root| collect_xml_documents(&root, temp_dir.path()));
    // temp_dir drops (and removes itself) here regardless of outcome.
    collected
}

fn collect_xml_documents(root: &Path, archive_root: &Path) -> EngineResult<Vec<Document>> {
    let mut docs = Vec::new();
    if root.is_file() {
        if is_xml_member(root) {
            docs.push(read_document(root, archive_root)?);
        }
        return Ok(docs);
    }
    walk_xml_files(root, archive_root, &mut docs)?;
    Ok(docs)
}

fn walk_xml_files(dir: &Path, archive_root: &Path, docs: &mut Vec<Document>) -> EngineResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::Archive(format!("could not read extracted directory: {}", e)))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Archive(format!("could not read directory entry: {}", e)))?;
        let path = entry.path();
        if path.is_dir() {
            walk_xml_files(&path, archive_root, docs)?;
        } else if is_xml_member(&path) {
            docs.push(read_document(&path, archive_root)?);
        }
    }
    Ok(())
}

fn is_xml_member(path: &Path) -> bool {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    !file_name.starts_with('.') && file_name.to_lowercase().ends_with(".xml")
}

fn read_document(path: &Path, archive_root: &Path) -> EngineResult<Document> {
    let xml = std::fs::read_to_string(path).map_err(|e| EngineError::Archive(format!("could not read {}: {}", path.display(), e)))?;
    let file_name = path
        .strip_prefix(archive_root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned();
    Ok(Document { file_name, xml })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn recognizes_every_documented_extension() {
        for ext in ARCHIVE_EXTENSIONS {
            assert!(is_archive(Path::new(&format!("schema{}", ext))), "failed for {}", ext);
        }
        assert!(!is_archive(Path::new("schema.xsd")));
        assert!(!is_archive(Path::new("schema.xml")));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(is_archive(Path::new("Schema.ZIP")));
    }

    fn write_zip_with_entries(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn collects_xml_files_from_zip_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.zip");
        write_zip_with_entries(
            &archive_path,
            &[
                ("a.xml", b"<root/>"),
                ("nested/b.xml", b"<root/>"),
                ("readme.txt", b"not xml"),
                ("nested/.hidden.xml", b"<root/>"),
            ],
        );

        let docs = extract_xml_from_archive(&archive_path).unwrap();
        let mut names: Vec<_> = docs.iter().map(|d| d.file_name.replace('\\', "/")).collect();
        names.sort();
        assert_eq!(names, vec!["a.xml", "nested/b.xml"]);
    }

    #[test]
    fn bare_gz_decompresses_to_single_named_document() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("document.xml.gz");
        let file = File::create(&archive_path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(b"<root>hello</root>").unwrap();
        encoder.finish().unwrap();

        let docs = extract_xml_from_archive(&archive_path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name, "document.xml");
        assert!(docs[0].xml.contains("hello"));
    }

    #[test]
    fn unrecognized_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.xsd");
        std::fs::write(&path, b"not an archive").unwrap();
        let err = extract_all(&path, dir.path()).unwrap_err();
        assert!(err.to_string().contains("recognized archive extension"));
    }
}
