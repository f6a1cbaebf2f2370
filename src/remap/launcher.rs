//! Renamer side of the argument-file protocol, run by `bobbin-remap`.
//!
//! The launcher loads the table named in the argument file, orients it with
//! [`RenamerAdapter`], hands the input's entries to a [`ClassRewriter`] and
//! writes the result deterministically.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::core::errors::{BobbinError, Result};
use crate::io::archive::{self, normalize_meta_inf, read_entries, write_archive, ArchiveEntry};
use crate::mapping::table::RenamingTable;
use crate::mapping::tiny::TinyDocument;
use crate::remap::adapter::{RemapPlan, RenamerAdapter};
use crate::remap::arguments::RemapArguments;

/// Rewrites the entries of an archive according to a plan
pub trait ClassRewriter: Send + Sync {
    /// Short name for log lines
    fn name(&self) -> &str;

    /// Produce the entries of the output archive
    fn rewrite(
        &self,
        entries: Vec<ArchiveEntry>,
        plan: &RemapPlan,
        classpath: &[&Path],
    ) -> Result<Vec<ArchiveEntry>>;
}

/// Moves each class entry to the path of its target-namespace name.
///
/// Class bytes and other entries are copied unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryRelocator;

impl ClassRewriter for EntryRelocator {
    fn name(&self) -> &str {
        "entry-relocator"
    }

    fn rewrite(
        &self,
        entries: Vec<ArchiveEntry>,
        plan: &RemapPlan,
        _classpath: &[&Path],
    ) -> Result<Vec<ArchiveEntry>> {
        let mut placed: BTreeMap<String, String> = BTreeMap::new();
        let mut out = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if let Some(class_name) = entry.name.strip_suffix(".class") {
                let relocated = format!("{}.class", plan.map_class(class_name));
                if let Some(previous) = placed.insert(relocated.clone(), entry.name.clone()) {
                    return Err(BobbinError::composition(format!(
                        "entries {previous} and {} would both be written to {relocated}",
                        entry.name
                    )));
                }
                entry.name = relocated;
            }
            out.push(entry);
        }
        Ok(out)
    }
}

/// What a launcher run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchReport {
    /// Class entries written
    pub classes: usize,
    /// Classes whose name changed
    pub renamed_classes: usize,
    /// Non-class entries written
    pub resources: usize,
}

/// Load the table named by `--mappings`, projected onto `--source`/`--target`
/// when the file declares more than two namespaces
pub fn load_mappings(arguments: &RemapArguments) -> Result<RenamingTable> {
    let path = &arguments.mappings;
    let (text, origin) = if archive::is_archive(path) {
        (
            archive::read_embedded_mappings(path)?,
            format!("{}!{}", path.display(), archive::MAPPINGS_ENTRY),
        )
    } else {
        let text = fs::read_to_string(path).map_err(|e| {
            BobbinError::mapping_load_at(format!("cannot read file: {e}"), path.display().to_string(), None)
        })?;
        (text, path.display().to_string())
    };

    let document = TinyDocument::parse(text.as_bytes(), &origin)?;
    if document.namespaces().len() == 2 {
        return document.into_table();
    }
    match (&arguments.source, &arguments.target) {
        (Some(source), Some(target)) => document
            .project(source, target)
            .map_err(|e| e.with_mapping_path(origin)),
        _ => Err(BobbinError::argument(format!(
            "{origin} declares {} namespaces; --source and --target are required",
            document.namespaces().len()
        ))),
    }
}

/// Execute a parsed argument file
pub fn run(arguments: &RemapArguments, rewriter: &dyn ClassRewriter) -> Result<LaunchReport> {
    let table = load_mappings(arguments)?;

    if !arguments.input.is_file() {
        return Err(BobbinError::io(
            format!("Input does not exist: {}", arguments.input.display()),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }
    let classpath = arguments.effective_classpath();
    for entry in &classpath {
        if !entry.exists() {
            warn!("Classpath entry {} does not exist", entry.display());
        }
    }
    if let Some(tmpdir) = &arguments.tmpdir {
        fs::create_dir_all(tmpdir).map_err(|e| {
            BobbinError::io(format!("Failed to create tmpdir: {}", tmpdir.display()), e)
        })?;
    }

    let adapter = RenamerAdapter::new(
        &table,
        arguments.source.as_ref(),
        arguments.target.as_ref(),
        arguments.remap_locals,
    )?;
    let plan = adapter.plan();
    info!(
        "Remapping {} from {} to {} with {} ({} classes, {} renamed)",
        arguments.input.display(),
        adapter.source(),
        adapter.target(),
        rewriter.name(),
        plan.classes.len(),
        plan.renamed_classes()
    );

    let entries = read_entries(&arguments.input)?;
    let rewritten = normalize_meta_inf(rewriter.rewrite(entries, &plan, &classpath)?);
    let classes = rewritten.iter().filter(|entry| entry.is_class()).count();
    let report = LaunchReport {
        classes,
        renamed_classes: plan.renamed_classes(),
        resources: rewritten.len() - classes,
    };
    write_archive(&arguments.output, rewritten)?;
    debug!("Wrote {} ({:?})", arguments.output.display(), report);
    Ok(report)
}

/// Read an argument file and execute it
pub fn run_argument_file(path: &Path, rewriter: &dyn ClassRewriter) -> Result<LaunchReport> {
    let arguments = RemapArguments::from_file(path)?;
    run(&arguments, rewriter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::namespace::Namespace;

    const MAPPINGS: &str = "tiny\t2\t0\tofficial\tintermediary\tnamed\n\
c\ta\tclass_1\tnet/Widget\n\
c\tb\tclass_2\t\n";

    fn setup() -> (tempfile::TempDir, RemapArguments) {
        let dir = tempfile::tempdir().unwrap();
        let mappings = dir.path().join("mappings.tiny");
        fs::write(&mappings, MAPPINGS).unwrap();
        let input = dir.path().join("in.jar");
        write_archive(
            &input,
            vec![
                ArchiveEntry::new("a.class", vec![1]),
                ArchiveEntry::new("b.class", vec![2]),
                ArchiveEntry::new("c.class", vec![3]),
                ArchiveEntry::new("data/config.json", b"{}".to_vec()),
                ArchiveEntry::new("META-INF/KEY.DSA", vec![9]),
            ],
        )
        .unwrap();
        let mut arguments = RemapArguments::new(&mappings, &input, dir.path().join("out.jar"));
        arguments.source = Some(Namespace::from("official"));
        arguments.target = Some(Namespace::from("named"));
        (dir, arguments)
    }

    fn names(path: &Path) -> Vec<String> {
        read_entries(path)
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect()
    }

    #[test]
    fn test_relocates_classes_and_keeps_resources() {
        let (_dir, arguments) = setup();
        let report = run(&arguments, &EntryRelocator).unwrap();
        assert_eq!(
            names(&arguments.output),
            vec!["b.class", "c.class", "data/config.json", "net/Widget.class"]
        );
        assert_eq!(
            report,
            LaunchReport {
                classes: 3,
                renamed_classes: 1,
                resources: 1,
            }
        );
    }

    #[test]
    fn test_multi_namespace_file_needs_a_pair() {
        let (_dir, mut arguments) = setup();
        arguments.target = None;
        let err = run(&arguments, &EntryRelocator).unwrap_err();
        assert!(err.is_argument_error());
        assert!(!arguments.output.exists());
    }

    #[test]
    fn test_reverse_pair_on_projected_file() {
        let (dir, mut arguments) = setup();
        arguments.source = Some(Namespace::from("intermediary"));
        arguments.target = Some(Namespace::from("official"));
        let input = dir.path().join("intermediary.jar");
        write_archive(&input, vec![ArchiveEntry::new("class_1.class", vec![1])]).unwrap();
        arguments.input = input;
        run(&arguments, &EntryRelocator).unwrap();
        assert_eq!(names(&arguments.output), vec!["a.class"]);
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let (dir, mut arguments) = setup();
        arguments.input = dir.path().join("absent.jar");
        assert!(matches!(
            run(&arguments, &EntryRelocator).unwrap_err(),
            BobbinError::Io { .. }
        ));
    }

    #[test]
    fn test_colliding_relocations_are_rejected() {
        let mut plan = RemapPlan::default();
        plan.classes.insert("a".to_string(), "z".to_string());
        let entries = vec![
            ArchiveEntry::new("a.class", vec![1]),
            ArchiveEntry::new("z.class", vec![2]),
        ];
        assert!(EntryRelocator.rewrite(entries, &plan, &[]).is_err());
    }

    #[test]
    fn test_argument_file_entry_point() {
        let (dir, arguments) = setup();
        let file = dir.path().join("args.txt");
        arguments.write_file(&file).unwrap();
        run_argument_file(&file, &EntryRelocator).unwrap();
        assert!(arguments.output.is_file());

        let missing = dir.path().join("missing-args.txt");
        assert!(run_argument_file(&missing, &EntryRelocator)
            .unwrap_err()
            .is_argument_error());
    }
}
