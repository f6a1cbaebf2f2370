//! Structure resolution.
//!
//! A [`CompositionContext`] turns [`MappingsStructure`] trees into renaming
//! tables. It owns the canonical source, memoizes resolved tables by
//! structural equality so repeated sub-trees are built once, and keeps the
//! registry of which structure backs each [`MappingSpec`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::errors::{BobbinError, Result};
use crate::io::archive;
use crate::mapping::compose::{chain, merge, reverse};
use crate::mapping::namespace::MappingSpec;
use crate::mapping::structure::MappingsStructure;
use crate::mapping::table::RenamingTable;
use crate::mapping::tiny::{parse_tiny_str, read_tiny_file};

/// Supplies the canonical table, in its published target -> source orientation
pub trait CanonicalSourceProvider: Send + Sync {
    /// Load the canonical table
    fn canonical_table(&self) -> Result<RenamingTable>;

    /// Short description for diagnostics
    fn describe(&self) -> String {
        "canonical source".to_string()
    }
}

/// Canonical table read from a tiny file or a mappings archive
#[derive(Debug, Clone)]
pub struct FileCanonicalSource {
    path: PathBuf,
}

impl FileCanonicalSource {
    /// Canonical source backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CanonicalSourceProvider for FileCanonicalSource {
    fn canonical_table(&self) -> Result<RenamingTable> {
        load_table(&self.path)
    }

    fn describe(&self) -> String {
        format!("canonical source {}", self.path.display())
    }
}

/// Used when the build has no canonical table; resolving `CanonicalSource` fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCanonicalSource;

impl CanonicalSourceProvider for NoCanonicalSource {
    fn canonical_table(&self) -> Result<RenamingTable> {
        Err(BobbinError::composition(
            "structure uses the canonical source but none is configured",
        ))
    }
}

/// Load a persisted table. Archives are searched for their embedded table.
pub fn load_table(path: &Path) -> Result<RenamingTable> {
    if archive::is_archive(path) {
        let origin = format!("{}!{}", path.display(), archive::MAPPINGS_ENTRY);
        let text = archive::read_embedded_mappings(path)?;
        return parse_tiny_str(&text, &origin);
    }
    read_tiny_file(path)
}

/// Resolution state shared by every structure evaluated within one build
pub struct CompositionContext {
    canonical: Box<dyn CanonicalSourceProvider>,
    memo: DashMap<MappingsStructure, Arc<RenamingTable>>,
    registry: DashMap<MappingSpec, MappingsStructure>,
}

impl std::fmt::Debug for CompositionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionContext")
            .field("canonical", &self.canonical.describe())
            .field("memoized", &self.memo.len())
            .field("registered", &self.registry.len())
            .finish()
    }
}

impl Default for CompositionContext {
    fn default() -> Self {
        Self::new(NoCanonicalSource)
    }
}

impl CompositionContext {
    /// Create a context with the given canonical source
    pub fn new(canonical: impl CanonicalSourceProvider + 'static) -> Self {
        Self {
            canonical: Box::new(canonical),
            memo: DashMap::new(),
            registry: DashMap::new(),
        }
    }

    /// Structure registered for `spec`, registering the one built by `create` if there is none
    pub fn get_or_register(
        &self,
        spec: &MappingSpec,
        create: impl FnOnce() -> MappingsStructure,
    ) -> MappingsStructure {
        self.registry
            .entry(spec.clone())
            .or_insert_with(create)
            .value()
            .clone()
    }

    /// Register the structure backing `spec`.
    ///
    /// Registering the same structure again is a no-op; registering a different
    /// one for an already registered spec is an error.
    pub fn register(&self, spec: MappingSpec, structure: MappingsStructure) -> Result<()> {
        let existing = self.get_or_register(&spec, || structure.clone());
        if existing != structure {
            return Err(BobbinError::composition(format!(
                "mapping spec {spec} is already registered as {existing}, cannot register {structure}"
            )));
        }
        Ok(())
    }

    /// Structure registered for `spec`
    pub fn structure_for(&self, spec: &MappingSpec) -> Option<MappingsStructure> {
        self.registry.get(spec).map(|entry| entry.value().clone())
    }

    /// Resolve the table identified by `spec`; `Unmapped` is the identity table
    pub fn resolve_spec(&self, spec: &MappingSpec) -> Result<Arc<RenamingTable>> {
        match spec {
            MappingSpec::Unmapped => Ok(Arc::new(RenamingTable::identity())),
            MappingSpec::Named { .. } => {
                let structure = self.structure_for(spec).ok_or_else(|| {
                    BobbinError::composition(format!("no structure registered for mapping spec {spec}"))
                })?;
                self.resolve(&structure)
            }
        }
    }

    /// Number of memoized tables
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// Resolve a structure tree into a table
    pub fn resolve(&self, structure: &MappingsStructure) -> Result<Arc<RenamingTable>> {
        if let Some(hit) = self.memo.get(structure) {
            debug!("Reusing resolved table for {}", structure);
            return Ok(Arc::clone(hit.value()));
        }

        let table = match structure {
            MappingsStructure::File(path) => {
                let table = load_table(path)?;
                info!(
                    "Loaded {} classes ({} -> {}) from {}",
                    table.stats().classes,
                    table.source_namespace(),
                    table.target_namespace(),
                    path.display()
                );
                table
            }
            MappingsStructure::Chained(children) => {
                let tables = self.resolve_children(children)?;
                let mut stages = tables.iter();
                match stages.next() {
                    None => RenamingTable::identity(),
                    Some(head) => {
                        stages.fold(RenamingTable::clone(head), |acc, next| chain(&acc, next))
                    }
                }
            }
            MappingsStructure::Merged(children) => {
                let tables = self.resolve_children(children)?;
                let labelled: Vec<(String, &RenamingTable)> = children
                    .iter()
                    .zip(&tables)
                    .map(|(child, table)| (child.to_string(), table.as_ref()))
                    .collect();
                merge(&labelled)?
            }
            MappingsStructure::Reversed(child) => reverse(self.resolve(child)?.as_ref())?,
            MappingsStructure::CanonicalSource => {
                debug!("Loading {}", self.canonical.describe());
                reverse(&self.canonical.canonical_table()?)?
            }
        };

        let table = Arc::new(table);
        Ok(Arc::clone(
            self.memo
                .entry(structure.clone())
                .or_insert(table)
                .value(),
        ))
    }

    fn resolve_children(&self, children: &[MappingsStructure]) -> Result<Vec<Arc<RenamingTable>>> {
        children
            .par_iter()
            .map(|child| self.resolve(child))
            .collect()
    }
}

/// Resolve a structure with a one-off context
pub fn resolve(
    structure: &MappingsStructure,
    canonical: impl CanonicalSourceProvider + 'static,
) -> Result<RenamingTable> {
    let context = CompositionContext::new(canonical);
    context
        .resolve(structure)
        .map(|table| RenamingTable::clone(&table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::archive::{write_archive, ArchiveEntry, MAPPINGS_ENTRY};
    use crate::mapping::table::MemberKey;
    use crate::mapping::tiny::write_tiny_file;
    use tempfile::TempDir;

    const X_TO_Y: &str = "tiny\t2\t0\tx\ty\n\
c\ta\tpkg/Middle\n\
\tf\tI\tb\tmiddle_field\n\
c\tonly_first\tpkg/FirstOnly\n";

    const Y_TO_Z: &str = "tiny\t2\t0\ty\tz\n\
c\tpkg/Middle\tpkg/Final\n\
\tf\tI\tmiddle_field\tcount\n\
c\tonly_second\tpkg/SecondOnly\n";

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_chained_files_compose() {
        let dir = TempDir::new().unwrap();
        let structure = MappingsStructure::chained([
            MappingsStructure::file(write(&dir, "a.tiny", X_TO_Y)),
            MappingsStructure::file(write(&dir, "b.tiny", Y_TO_Z)),
        ]);
        let table = resolve(&structure, NoCanonicalSource).unwrap();
        assert_eq!(table.source_namespace().as_str(), "x");
        assert_eq!(table.target_namespace().as_str(), "z");
        assert_eq!(table.map_class("a"), "pkg/Final");
        assert_eq!(table.map_field("a", "b", "I"), "count");
        assert_eq!(table.map_class("only_first"), "pkg/FirstOnly");
        assert_eq!(table.map_class("only_second"), "pkg/SecondOnly");
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let table = resolve(&MappingsStructure::chained([]), NoCanonicalSource).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.map_class("anything"), "anything");
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let structure = MappingsStructure::merged([
            MappingsStructure::file(write(&dir, "a.tiny", X_TO_Y)),
            MappingsStructure::reversed(MappingsStructure::reversed(MappingsStructure::file(
                dir.path().join("a.tiny"),
            ))),
        ]);
        let first = resolve(&structure, NoCanonicalSource).unwrap();
        let second = resolve(&structure, NoCanonicalSource).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_memo_keys_on_structure_equality() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.tiny", X_TO_Y);
        let context = CompositionContext::default();
        let first = context.resolve(&MappingsStructure::file(&path)).unwrap();
        // a separately built but equal structure hits the memo
        let second = context.resolve(&MappingsStructure::file(path.clone())).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(context.memoized(), 1);
    }

    #[test]
    fn test_canonical_source_is_reversed() {
        let dir = TempDir::new().unwrap();
        let mut canonical = RenamingTable::new("named", "official");
        canonical
            .insert_class("net/Widget", Some("a".to_string()))
            .insert_field(MemberKey::new("size", "I"), Some("b".to_string()));
        let path = dir.path().join("canonical.tiny");
        write_tiny_file(&canonical, &path).unwrap();

        let table = resolve(
            &MappingsStructure::CanonicalSource,
            FileCanonicalSource::new(&path),
        )
        .unwrap();
        assert_eq!(table.source_namespace().as_str(), "official");
        assert_eq!(table.map_class("a"), "net/Widget");
        assert_eq!(table.map_field("a", "b", "I"), "size");
    }

    #[test]
    fn test_missing_canonical_source_is_an_error() {
        let err = resolve(&MappingsStructure::CanonicalSource, NoCanonicalSource).unwrap_err();
        assert!(matches!(err, BobbinError::Composition { .. }));
    }

    #[test]
    fn test_missing_file_fails_resolution() {
        let err = resolve(
            &MappingsStructure::chained([MappingsStructure::file("/nonexistent/a.tiny")]),
            NoCanonicalSource,
        )
        .unwrap_err();
        assert!(matches!(err, BobbinError::MappingLoad { .. }));
    }

    #[test]
    fn test_archive_leaf_reads_embedded_table() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("mappings.jar");
        write_archive(&jar, vec![ArchiveEntry::new(MAPPINGS_ENTRY, X_TO_Y.as_bytes())]).unwrap();
        let table = resolve(&MappingsStructure::file(&jar), NoCanonicalSource).unwrap();
        assert_eq!(table.map_class("a"), "pkg/Middle");

        let empty = dir.path().join("empty.jar");
        write_archive(&empty, vec![ArchiveEntry::new("a.class", vec![0])]).unwrap();
        let err = resolve(&MappingsStructure::file(&empty), NoCanonicalSource).unwrap_err();
        assert!(matches!(err, BobbinError::MappingLoad { .. }));
    }

    #[test]
    fn test_merge_conflict_names_both_files() {
        let dir = TempDir::new().unwrap();
        let conflicting = "tiny\t2\t0\tx\ty\nc\ta\tpkg/Other\n";
        let structure = MappingsStructure::merged([
            MappingsStructure::file(write(&dir, "a.tiny", X_TO_Y)),
            MappingsStructure::file(write(&dir, "c.tiny", conflicting)),
        ]);
        let message = resolve(&structure, NoCanonicalSource).unwrap_err().to_string();
        assert!(message.contains("class a"));
        assert!(message.contains("a.tiny"));
        assert!(message.contains("c.tiny"));
    }

    #[test]
    fn test_registry_is_create_or_get() {
        let context = CompositionContext::default();
        let spec = MappingSpec::named("x", "y");
        let first = context.get_or_register(&spec, || MappingsStructure::file("a.tiny"));
        let second = context.get_or_register(&spec, || MappingsStructure::file("b.tiny"));
        assert_eq!(first, second);
        assert!(context
            .register(spec.clone(), MappingsStructure::file("a.tiny"))
            .is_ok());
        assert!(context
            .register(spec, MappingsStructure::file("b.tiny"))
            .is_err());
    }

    #[test]
    fn test_resolve_spec() {
        let dir = TempDir::new().unwrap();
        let context = CompositionContext::default();
        assert!(context.resolve_spec(&MappingSpec::Unmapped).unwrap().is_empty());

        let spec = MappingSpec::named("x", "y");
        assert!(context.resolve_spec(&spec).is_err());
        context
            .register(spec.clone(), MappingsStructure::file(write(&dir, "a.tiny", X_TO_Y)))
            .unwrap();
        assert_eq!(context.resolve_spec(&spec).unwrap().map_class("a"), "pkg/Middle");
    }
}
