//! Zip/jar archive helpers.
//!
//! Archives written here are byte-for-byte reproducible: entries are sorted
//! by name and every entry carries the same timestamp, compression method and
//! permissions. Signature material under `META-INF/` is removed because a
//! renamed archive can never satisfy its original signatures.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::core::errors::{BobbinError, Result};
use crate::io::staging;

/// Location of the embedded mapping table inside a mappings archive
pub const MAPPINGS_ENTRY: &str = "mappings/mappings.tiny";

/// Manifest entry name
pub const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

const SIGNATURE_EXTENSIONS: [&str; 4] = [".SF", ".RSA", ".DSA", ".EC"];

/// A file stored in an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path, `/` separated
    pub name: String,
    /// Uncompressed contents
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    /// Create an entry
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Whether the entry holds a compiled class
    pub fn is_class(&self) -> bool {
        self.name.ends_with(".class")
    }
}

/// Whether a path looks like a zip or jar archive
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)
        .map_err(|e| BobbinError::io(format!("Failed to open archive: {}", path.display()), e))?;
    Ok(ZipArchive::new(file)?)
}

/// Read the text of the embedded mapping table of an archive
pub fn read_embedded_mappings(path: &Path) -> Result<String> {
    let mut archive = open(path)?;
    let mut entry = match archive.by_name(MAPPINGS_ENTRY) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(BobbinError::mapping_load_at(
                format!("archive does not contain {MAPPINGS_ENTRY}"),
                path.display().to_string(),
                None,
            ))
        }
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    entry.read_to_string(&mut text).map_err(|e| {
        BobbinError::mapping_load_at(
            format!("{MAPPINGS_ENTRY} is not readable text: {e}"),
            path.display().to_string(),
            None,
        )
    })?;
    Ok(text)
}

/// Copy the embedded mapping table of an archive to `dest`
pub fn extract_mappings_entry(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let text = read_embedded_mappings(archive)?;
    fs::write(dest, text).map_err(|e| {
        BobbinError::io(format!("Failed to write mappings: {}", dest.display()), e)
    })?;
    debug!("Extracted {} from {} to {}", MAPPINGS_ENTRY, archive.display(), dest.display());
    Ok(dest.to_path_buf())
}

/// Read every file entry of an archive, skipping directory entries
pub fn read_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut archive = open(path)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
        file.read_to_end(&mut data)?;
        entries.push(ArchiveEntry::new(file.name(), data));
    }
    Ok(entries)
}

/// Write entries to `path` deterministically, replacing the destination atomically.
///
/// Duplicate names keep the last entry given.
pub fn write_archive(path: &Path, entries: impl IntoIterator<Item = ArchiveEntry>) -> Result<()> {
    let sorted: BTreeMap<String, Vec<u8>> = entries
        .into_iter()
        .map(|entry| (entry.name, entry.data))
        .collect();

    let mut staged = staging::stage_for(path)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let mut writer = ZipWriter::new(staged.as_file_mut());
    for (name, data) in &sorted {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(data)?;
    }
    writer.finish()?;

    staging::publish(staged, path)
}

/// Whether an entry is signature material that must not survive a rename
pub fn is_signature_entry(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    let upper = file.to_ascii_uppercase();
    upper.starts_with("SIG-") || SIGNATURE_EXTENSIONS.iter().any(|ext| upper.ends_with(ext))
}

/// Remove per-entry digest attributes from a manifest.
///
/// Sections left without attributes other than `Name` are dropped. Line
/// endings are normalized to CRLF as the manifest format requires.
pub fn strip_manifest_digests(manifest: &str) -> String {
    let normalized = manifest.replace("\r\n", "\n");
    let mut sections: Vec<Vec<String>> = vec![Vec::new()];
    for line in normalized.split('\n') {
        if line.is_empty() {
            if sections.last().is_some_and(|section| !section.is_empty()) {
                sections.push(Vec::new());
            }
            continue;
        }
        let Some(section) = sections.last_mut() else {
            continue;
        };
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some(previous) = section.last_mut() {
                previous.push_str(continuation);
                continue;
            }
        }
        section.push(line.to_string());
    }

    let mut out = String::new();
    for (index, section) in sections.iter().enumerate() {
        let kept: Vec<&String> = section
            .iter()
            .filter(|attribute| !is_digest_attribute(attribute))
            .collect();
        let only_name = kept.iter().all(|attribute| attribute.starts_with("Name:"));
        if index > 0 && (kept.is_empty() || only_name) {
            continue;
        }
        for attribute in kept {
            write_manifest_line(&mut out, attribute);
        }
        out.push_str("\r\n");
    }
    out
}

/// Manifest lines are limited to 72 bytes; longer ones continue after a space
fn write_manifest_line(out: &mut String, line: &str) {
    let mut limit = 72;
    let mut rest = line;
    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        let mut split = limit;
        while !rest.is_char_boundary(split) {
            split -= 1;
        }
        out.push_str(&rest[..split]);
        out.push_str("\r\n ");
        rest = &rest[split..];
        limit = 71;
    }
}

fn is_digest_attribute(attribute: &str) -> bool {
    attribute
        .split_once(':')
        .is_some_and(|(key, _)| key.trim().ends_with("-Digest"))
}

/// Drop signature files and strip digests from the manifest
pub fn normalize_meta_inf(entries: Vec<ArchiveEntry>) -> Vec<ArchiveEntry> {
    entries
        .into_iter()
        .filter(|entry| {
            let signature = is_signature_entry(&entry.name);
            if signature {
                debug!("Dropping signature entry {}", entry.name);
            }
            !signature
        })
        .map(|mut entry| {
            if entry.name == MANIFEST_ENTRY {
                if let Ok(text) = std::str::from_utf8(&entry.data) {
                    entry.data = strip_manifest_digests(text).into_bytes();
                }
            }
            entry
        })
        .collect()
}

/// Copy non-class entries of `input` that `output` lacks into `output`.
///
/// The output is rewritten deterministically with normalized `META-INF`.
/// Returns the number of entries copied.
pub fn merge_resources(output: &Path, input: &Path) -> Result<usize> {
    let mut entries = read_entries(output)?;
    let present: std::collections::HashSet<String> =
        entries.iter().map(|entry| entry.name.clone()).collect();
    let missing: Vec<ArchiveEntry> = read_entries(input)?
        .into_iter()
        .filter(|entry| {
            !entry.is_class() && !is_signature_entry(&entry.name) && !present.contains(&entry.name)
        })
        .collect();
    let copied = missing.len();
    entries.extend(missing);
    write_archive(output, normalize_meta_inf(entries))?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<ArchiveEntry> {
        vec![
            ArchiveEntry::new("b/Second.class", vec![0xCA, 0xFE]),
            ArchiveEntry::new("a/First.class", vec![0xBA, 0xBE]),
            ArchiveEntry::new("assets/lang.json", b"{}".to_vec()),
        ]
    }

    #[test]
    fn test_write_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.jar");
        let second = dir.path().join("two.jar");
        write_archive(&first, sample_entries()).unwrap();
        let mut reversed = sample_entries();
        reversed.reverse();
        write_archive(&second, reversed).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

        let names: Vec<String> = read_entries(&first)
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["a/First.class", "assets/lang.json", "b/Second.class"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_written_archives_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("out.jar");
        write_archive(&jar, sample_entries()).unwrap();
        let mode = fs::metadata(&jar).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn test_embedded_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("mappings.jar");
        write_archive(
            &jar,
            vec![ArchiveEntry::new(MAPPINGS_ENTRY, b"tiny\t2\t0\ta\tb\n".to_vec())],
        )
        .unwrap();
        assert!(is_archive(&jar));
        assert!(read_embedded_mappings(&jar).unwrap().starts_with("tiny\t2"));

        let dest = dir.path().join("out.tiny");
        extract_mappings_entry(&jar, &dest).unwrap();
        assert!(fs::read_to_string(&dest).unwrap().starts_with("tiny"));
    }

    #[test]
    fn test_missing_embedded_mappings_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("plain.jar");
        write_archive(&jar, sample_entries()).unwrap();
        let err = read_embedded_mappings(&jar).unwrap_err();
        assert!(matches!(err, BobbinError::MappingLoad { .. }));
    }

    #[test]
    fn test_signature_entries() {
        assert!(is_signature_entry("META-INF/MOJANGCS.SF"));
        assert!(is_signature_entry("META-INF/mojangcs.rsa"));
        assert!(is_signature_entry("META-INF/SIG-FOO"));
        assert!(!is_signature_entry("META-INF/MANIFEST.MF"));
        assert!(!is_signature_entry("META-INF/services/a.SF"));
        assert!(!is_signature_entry("data/file.SF"));
    }

    #[test]
    fn test_strip_manifest_digests() {
        let manifest = "Manifest-Version: 1.0\r\nMain-Class: net.Main\r\n\r\n\
Name: a/First.class\r\nSHA-256-Digest: abc\r\n de\r\n\r\n\
Name: assets/lang.json\r\nSHA-256-Digest: xyz\r\nContent-Type: json\r\n\r\n";
        let stripped = strip_manifest_digests(manifest);
        assert_eq!(
            stripped,
            "Manifest-Version: 1.0\r\nMain-Class: net.Main\r\n\r\n\
Name: assets/lang.json\r\nContent-Type: json\r\n\r\n"
        );
    }

    #[test]
    fn test_long_manifest_lines_are_wrapped() {
        let value = "x".repeat(100);
        let stripped = strip_manifest_digests(&format!("Class-Path: {value}\r\n"));
        let lines: Vec<&str> = stripped.split("\r\n").collect();
        assert_eq!(lines[0].len(), 72);
        assert!(lines[1].starts_with(' '));
        assert_eq!(format!("{}{}", lines[0], &lines[1][1..]), format!("Class-Path: {value}"));
    }

    #[test]
    fn test_merge_resources_copies_missing_non_class_entries() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        let output = dir.path().join("out.jar");
        let mut input_entries = sample_entries();
        input_entries.push(ArchiveEntry::new("META-INF/CERT.RSA", vec![1, 2, 3]));
        write_archive(&input, input_entries).unwrap();
        write_archive(&output, vec![ArchiveEntry::new("renamed/A.class", vec![1])]).unwrap();

        let copied = merge_resources(&output, &input).unwrap();
        assert_eq!(copied, 1);
        let names: Vec<String> = read_entries(&output)
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["assets/lang.json", "renamed/A.class"]);
    }
}
