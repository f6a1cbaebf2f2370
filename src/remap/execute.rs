//! Host side of a remap: prepare the argument file, run the renamer, and
//! promote the result.
//!
//! Every invocation works in its own scratch directory which is removed when
//! the invocation ends, whatever the outcome. The declared output path only
//! ever holds a complete artifact: it is cleared up front and written by an
//! atomic rename once the renamer has succeeded.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::errors::{BobbinError, Result};
use crate::io::{archive, staging};
use crate::mapping::namespace::Namespace;
use crate::mapping::table::RenamingTable;
use crate::mapping::tiny::write_tiny_file;
use crate::remap::arguments::RemapArguments;
use crate::remap::renamer::Renamer;

const ARGUMENT_FILE: &str = "arguments.txt";
const MATERIALIZED_MAPPINGS: &str = "mappings.tiny";

/// Where the renamer gets its table from
#[derive(Debug, Clone)]
pub enum MappingsSource {
    /// A resolved table, written to the scratch directory before launch
    Table(Arc<RenamingTable>),
    /// A persisted table, or an archive embedding one
    File(PathBuf),
}

/// Options forwarded to the renamer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapOptions {
    /// Rename parameters and local variables
    pub remap_locals: bool,
    /// Source namespace; the table's own when absent
    pub source: Option<Namespace>,
    /// Target namespace; the table's own when absent
    pub target: Option<Namespace>,
    /// Copy non-class entries of the input the renamer did not emit
    pub copy_resources: bool,
}

impl Default for RemapOptions {
    fn default() -> Self {
        Self {
            remap_locals: true,
            source: None,
            target: None,
            copy_resources: true,
        }
    }
}

/// One remap invocation
#[derive(Debug, Clone)]
pub struct RemapRequest {
    /// Table to apply
    pub mappings: MappingsSource,
    /// Artifact to read
    pub input: PathBuf,
    /// Artifact to write
    pub output: PathBuf,
    /// Libraries the input is compiled against
    pub classpath: Vec<PathBuf>,
    /// Parent of the per-invocation scratch directory
    pub scratch_dir: PathBuf,
    /// Renamer options
    pub options: RemapOptions,
}

impl RemapRequest {
    /// Request with an empty classpath and default options
    pub fn new(
        mappings: MappingsSource,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mappings,
            input: input.into(),
            output: output.into(),
            classpath: Vec::new(),
            scratch_dir: scratch_dir.into(),
            options: RemapOptions::default(),
        }
    }

    /// Set the classpath
    #[must_use]
    pub fn with_classpath(mut self, classpath: impl IntoIterator<Item = PathBuf>) -> Self {
        self.classpath = classpath.into_iter().collect();
        self
    }

    /// Set the options
    #[must_use]
    pub fn with_options(mut self, options: RemapOptions) -> Self {
        self.options = options;
        self
    }
}

/// What an invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapResult {
    /// The output was written
    Completed {
        /// Declared output path, now holding the renamed artifact
        output: PathBuf,
        /// Anything the renamer printed
        diagnostics: String,
    },
    /// The input does not exist yet; nothing was done
    SkippedMissingInput,
}

/// Runs remap requests through a [`Renamer`]
#[derive(Clone)]
pub struct Remapper {
    renamer: Arc<dyn Renamer>,
}

impl std::fmt::Debug for Remapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remapper")
            .field("renamer", &self.renamer.identity())
            .finish()
    }
}

impl Remapper {
    /// Remapper delegating to `renamer`
    pub fn new(renamer: Arc<dyn Renamer>) -> Self {
        Self { renamer }
    }

    /// Identity of the underlying renamer
    pub fn renamer_identity(&self) -> String {
        self.renamer.identity()
    }

    /// Execute one request
    pub async fn execute(&self, request: &RemapRequest, cancel: &CancellationToken) -> Result<RemapResult> {
        if !request.input.exists() {
            info!(
                "Input {} does not exist yet, skipping remap",
                request.input.display()
            );
            return Ok(RemapResult::SkippedMissingInput);
        }

        remove_stale_output(&request.output)?;

        fs::create_dir_all(&request.scratch_dir).map_err(|e| {
            BobbinError::io(
                format!("Failed to create scratch directory: {}", request.scratch_dir.display()),
                e,
            )
        })?;
        let work = tempfile::Builder::new()
            .prefix("bobbin-")
            .tempdir_in(&request.scratch_dir)
            .map_err(|e| {
                BobbinError::io(
                    format!("Failed to create work directory in {}", request.scratch_dir.display()),
                    e,
                )
            })?;
        debug!("Remapping {} in {}", request.input.display(), work.path().display());

        let mappings = {
            let source = request.mappings.clone();
            let work = work.path().to_path_buf();
            run_blocking("materializing mappings", move || materialize_mappings(&source, &work))
                .await?
        };
        let staged = work.path().join(staged_name(&request.output));
        let arguments = RemapArguments {
            mappings,
            output: staged.clone(),
            input: request.input.clone(),
            classpath: request.classpath.clone(),
            source: request.options.source.clone(),
            target: request.options.target.clone(),
            remap_locals: request.options.remap_locals,
            tmpdir: Some(work.path().to_path_buf()),
        };
        let argument_file = work.path().join(ARGUMENT_FILE);
        arguments.write_file(&argument_file)?;

        let output = self.renamer.run(&argument_file, cancel).await?;

        let input = request.input.clone();
        let destination = request.output.clone();
        let copy_resources = request.options.copy_resources;
        let diagnostics = output.diagnostics;
        let diagnostics = run_blocking("finishing the remapped artifact", move || {
            let produced = fs::metadata(&staged).map(|meta| meta.is_file() && meta.len() > 0);
            if !matches!(produced, Ok(true)) {
                return Err(BobbinError::remap_execution(
                    format!("renamer produced no output for {}", input.display()),
                    Some(0),
                    diagnostics,
                ));
            }
            if copy_resources && archive::is_archive(&input) {
                let copied = archive::merge_resources(&staged, &input)?;
                debug!("Copied {} resources from {}", copied, input.display());
            }
            promote(&staged, &destination)?;
            Ok(diagnostics)
        })
        .await?;
        info!("Remapped {} -> {}", request.input.display(), request.output.display());
        Ok(RemapResult::Completed {
            output: request.output.clone(),
            diagnostics,
        })
    }
}

fn materialize_mappings(source: &MappingsSource, work: &Path) -> Result<PathBuf> {
    let target = work.join(MATERIALIZED_MAPPINGS);
    match source {
        MappingsSource::Table(table) => {
            write_tiny_file(table, &target)?;
            Ok(target)
        }
        MappingsSource::File(path) if archive::is_archive(path) => {
            archive::extract_mappings_entry(path, &target)
        }
        MappingsSource::File(path) => {
            if !path.is_file() {
                return Err(BobbinError::mapping_load_at(
                    "mapping file does not exist",
                    path.display().to_string(),
                    None,
                ));
            }
            Ok(path.clone())
        }
    }
}

fn staged_name(output: &Path) -> String {
    match output.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("output.{ext}"),
        None => "output.jar".to_string(),
    }
}

fn remove_stale_output(output: &Path) -> Result<()> {
    match fs::remove_file(output) {
        Ok(()) => {
            debug!("Removed previous output {}", output.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BobbinError::io(
            format!("Failed to clear output: {}", output.display()),
            e,
        )),
    }
}

/// Move the staged artifact to `output` so readers only ever see a complete file
pub(crate) fn promote(staged: &Path, output: &Path) -> Result<()> {
    staging::copy_into_place(staged, output)?;
    Ok(())
}

/// Run blocking filesystem work off the async worker threads
pub(crate) async fn run_blocking<T, F>(what: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BobbinError::internal(format!("{what} did not complete: {e}")))?
}
