//! Content-addressed storage for remapped artifacts.
//!
//! A remapped artifact is identified by a [`CacheKey`]: the fingerprint of
//! the input, the mapping spec, the renamer identity, the renamer options
//! that change its output and the fingerprint of the resolved table. The
//! table fingerprint keeps a spec whose structure changed from being served a
//! stale artifact.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{BobbinError, Result};
use crate::io::staging;
use crate::mapping::namespace::MappingSpec;
use crate::mapping::table::RenamingTable;
use crate::mapping::tiny::write_tiny;

const METADATA_FILE: &str = "entry.json";

/// SHA-256 content fingerprint, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a byte slice
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated digest for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a file's contents
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path)
        .map_err(|e| BobbinError::io(format!("Failed to open for hashing: {}", path.display()), e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer).map_err(|e| {
            BobbinError::io(format!("Failed to read for hashing: {}", path.display()), e)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Fingerprint a table by its persisted form
pub fn fingerprint_table(table: &RenamingTable) -> Result<Fingerprint> {
    let mut bytes = Vec::new();
    write_tiny(table, &mut bytes)?;
    Ok(Fingerprint::of_bytes(&bytes))
}

/// Identity of one remapped artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Fingerprint of the input artifact
    pub input: Fingerprint,
    /// Mapping spec the artifact is remapped under
    pub spec: MappingSpec,
    /// Renamer identity and version
    pub renamer: String,
    /// Whether parameters and locals were renamed
    pub remap_locals: bool,
    /// Fingerprint of the resolved table
    pub mappings: Fingerprint,
}

impl CacheKey {
    /// Single digest covering every component of the key
    pub fn digest(&self) -> Fingerprint {
        let spec = self.spec.to_string();
        let locals = if self.remap_locals { "remap-locals" } else { "keep-locals" };
        let mut hasher = Sha256::new();
        for part in [
            self.input.as_str(),
            spec.as_str(),
            self.renamer.as_str(),
            locals,
            self.mappings.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        Fingerprint(format!("{:x}", hasher.finalize()))
    }
}

/// Metadata stored next to each artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Key the artifact was stored under
    pub key: CacheKey,
    /// File name of the stored artifact
    pub file_name: String,
    /// Size in bytes
    pub size: u64,
    /// Unix timestamp of the store operation
    pub stored_at: u64,
}

/// Storage for remapped artifacts
pub trait ArtifactStore: Send + Sync {
    /// Path of a stored artifact, if present
    fn lookup(&self, key: &CacheKey, file_name: &str) -> Result<Option<PathBuf>>;

    /// Store a copy of `artifact` and return the stored path
    fn store(&self, key: &CacheKey, file_name: &str, artifact: &Path) -> Result<PathBuf>;
}

/// Artifact store laid out as `<root>/<2 hex>/<digest>/<file name>`
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        let digest = key.digest();
        self.root.join(&digest.as_str()[..2]).join(digest.as_str())
    }

    fn load_metadata(&self, path: &Path) -> Result<ArtifactMetadata> {
        let content = fs::read_to_string(path).map_err(|e| {
            BobbinError::io(format!("Failed to read cache metadata: {}", path.display()), e)
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Every readable entry in the store
    pub fn entries(&self) -> Result<Vec<ArtifactMetadata>> {
        let mut entries = Vec::new();
        if !self.root.exists() {
            return Ok(entries);
        }
        for shard in read_dir(&self.root)? {
            for entry in read_dir(&shard)? {
                match self.load_metadata(&entry.join(METADATA_FILE)) {
                    Ok(metadata) => entries.push(metadata),
                    Err(e) => tracing::debug!("Skipping cache entry {}: {}", entry.display(), e),
                }
            }
        }
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)
        .map_err(|e| BobbinError::io(format!("Failed to list {}", dir.display()), e))?
    {
        let path = entry?.path();
        if path.is_dir() {
            paths.push(path);
        }
    }
    Ok(paths)
}

impl ArtifactStore for DirectoryStore {
    fn lookup(&self, key: &CacheKey, file_name: &str) -> Result<Option<PathBuf>> {
        let dir = self.entry_dir(key);
        let artifact = dir.join(file_name);
        let metadata_path = dir.join(METADATA_FILE);
        if !artifact.is_file() || !metadata_path.is_file() {
            tracing::debug!("Cache miss for {} ({})", file_name, key.digest().short());
            return Ok(None);
        }

        match self.load_metadata(&metadata_path) {
            Ok(metadata) if metadata.key == *key && metadata.file_name == file_name => {
                tracing::debug!("Cache hit for {} ({})", file_name, key.digest().short());
                Ok(Some(artifact))
            }
            Ok(_) => {
                tracing::warn!("Cache entry {} does not match its key, ignoring it", dir.display());
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Unreadable cache entry {}: {}", dir.display(), e);
                Ok(None)
            }
        }
    }

    fn store(&self, key: &CacheKey, file_name: &str, artifact: &Path) -> Result<PathBuf> {
        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir).map_err(|e| {
            BobbinError::io(format!("Failed to create cache directory: {}", dir.display()), e)
        })?;

        let stored = dir.join(file_name);
        let size = staging::copy_into_place(artifact, &stored).map_err(|e| {
            BobbinError::cache(
                format!("Failed to move artifact into the cache: {e}"),
                Some(key.digest().to_string()),
            )
        })?;

        let metadata = ArtifactMetadata {
            key: key.clone(),
            file_name: file_name.to_string(),
            size,
            stored_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default(),
        };
        let metadata_path = dir.join(METADATA_FILE);
        let staged = staging::stage_for(&metadata_path)?;
        serde_json::to_writer_pretty(staged.as_file(), &metadata)?;
        staging::publish(staged, &metadata_path)?;

        tracing::debug!("Stored {} in cache ({} bytes)", stored.display(), size);
        Ok(stored)
    }
}
