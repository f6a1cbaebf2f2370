//! Cache-aware remap engine.
//!
//! [`RemapEngine`] ties the pieces together for a host build: it resolves the
//! table behind a [`MappingSpec`], derives the cache key, serves hits from the
//! artifact store and otherwise runs the renamer. Remaps for distinct keys run
//! concurrently up to `execution.max_concurrency`; concurrent requests for the
//! same key share one execution.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::try_join_all;
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::config::BobbinConfig;
use crate::core::errors::{BobbinError, Result};
use crate::io::cache::{fingerprint_file, fingerprint_table, ArtifactStore, CacheKey, DirectoryStore};
use crate::mapping::context::CompositionContext;
use crate::mapping::namespace::MappingSpec;
use crate::mapping::table::RenamingTable;
use crate::remap::execute::{
    promote, run_blocking, MappingsSource, RemapOptions, RemapRequest, RemapResult, Remapper,
};
use crate::remap::renamer::{ProcessRenamer, Renamer};

/// What [`RemapEngine::remap`] did for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapOutcome {
    /// The output path holds the remapped artifact
    Remapped {
        /// Declared output path
        output: PathBuf,
        /// Served from the artifact store
        cache_hit: bool,
    },
    /// The input does not exist yet; nothing was done
    SkippedMissingInput,
    /// The mapping spec is `unmapped`; the input is used as is
    Passthrough(PathBuf),
}

#[derive(Debug)]
enum Production {
    Artifact { path: PathBuf, cache_hit: bool },
    Skipped,
}

/// Front door for remapping artifacts under a [`MappingSpec`]
pub struct RemapEngine {
    config: Arc<BobbinConfig>,
    context: Arc<CompositionContext>,
    remapper: Remapper,
    store: Option<Arc<dyn ArtifactStore>>,
    permits: Semaphore,
    in_flight: DashMap<String, Arc<OnceCell<Result<Production>>>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RemapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemapEngine")
            .field("remapper", &self.remapper)
            .field("cache", &self.store.is_some())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl RemapEngine {
    /// Engine spawning the configured renamer and caching in the configured directory
    pub fn new(config: BobbinConfig, context: Arc<CompositionContext>) -> Result<Self> {
        info!("Initializing remap engine");
        config.validate()?;
        let renamer = ProcessRenamer::new(&config.renamer.program, config.renamer.version.clone())
            .with_args(config.renamer.args.iter().cloned());
        let store: Option<Arc<dyn ArtifactStore>> = if config.cache.enabled {
            Some(Arc::new(DirectoryStore::new(&config.cache.directory)))
        } else {
            debug!("Artifact cache disabled");
            None
        };
        Self::with_renamer(config, context, Arc::new(renamer), store)
    }

    /// Engine with an explicit renamer and store
    pub fn with_renamer(
        config: BobbinConfig,
        context: Arc<CompositionContext>,
        renamer: Arc<dyn Renamer>,
        store: Option<Arc<dyn ArtifactStore>>,
    ) -> Result<Self> {
        config.validate()?;
        let permits = Semaphore::new(config.execution.max_concurrency);
        info!(
            "Remap engine ready: renamer {}, {} concurrent remaps",
            renamer.identity(),
            config.execution.max_concurrency
        );
        Ok(Self {
            config: Arc::new(config),
            context,
            remapper: Remapper::new(renamer),
            store,
            permits,
            in_flight: DashMap::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Composition context specs are resolved against
    pub fn context(&self) -> &Arc<CompositionContext> {
        &self.context
    }

    /// Engine configuration
    pub fn config(&self) -> &BobbinConfig {
        &self.config
    }

    /// Token that terminates every in-flight renamer when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all in-flight remaps
    pub fn cancel(&self) {
        info!("Cancelling in-flight remaps");
        self.cancel.cancel();
    }

    /// Remap `input` under `spec` into `output`
    pub async fn remap(
        &self,
        spec: &MappingSpec,
        input: &Path,
        output: &Path,
        classpath: &[PathBuf],
    ) -> Result<RemapOutcome> {
        if spec.is_unmapped() {
            debug!("{} is unmapped, passing through", input.display());
            return Ok(RemapOutcome::Passthrough(input.to_path_buf()));
        }
        if !input.exists() {
            info!("Input {} does not exist yet, skipping remap", input.display());
            return Ok(RemapOutcome::SkippedMissingInput);
        }

        let table = self.resolve_table(spec).await?;
        let (input_fingerprint, mappings_fingerprint) = {
            let input = input.to_path_buf();
            let table = Arc::clone(&table);
            run_blocking("fingerprinting", move || {
                Ok((fingerprint_file(&input)?, fingerprint_table(&table)?))
            })
            .await?
        };
        let key = CacheKey {
            input: input_fingerprint,
            spec: spec.clone(),
            renamer: self.remapper.renamer_identity(),
            remap_locals: self.config.execution.remap_locals,
            mappings: mappings_fingerprint,
        };
        let digest = key.digest();
        let file_name = spec.artifact_file_name(&file_name_of(input)?);

        // waiters on a failed production get the same error instead of a rerun
        let cell = Arc::clone(
            &self
                .in_flight
                .entry(digest.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );
        let produced = cell
            .get_or_init(|| self.produce(&key, &file_name, table, input, output, classpath))
            .await;
        self.in_flight
            .remove_if(digest.as_str(), |_, existing| Arc::ptr_eq(existing, &cell));

        match produced {
            Err(err) => Err(err.clone()),
            Ok(Production::Skipped) => Ok(RemapOutcome::SkippedMissingInput),
            Ok(Production::Artifact { path, cache_hit }) => {
                if path != output {
                    let (path, output) = (path.clone(), output.to_path_buf());
                    run_blocking("copying the remapped artifact", move || promote(&path, &output))
                        .await?;
                }
                Ok(RemapOutcome::Remapped {
                    output: output.to_path_buf(),
                    cache_hit: *cache_hit,
                })
            }
        }
    }

    /// Remap every input into `output_dir` as `bobbin-<index>-<file name>`.
    ///
    /// The directory is emptied first.
    pub async fn remap_many(
        &self,
        spec: &MappingSpec,
        inputs: &[PathBuf],
        output_dir: &Path,
        classpath: &[PathBuf],
    ) -> Result<Vec<RemapOutcome>> {
        if output_dir.exists() {
            fs::remove_dir_all(output_dir).map_err(|e| {
                BobbinError::io(format!("Failed to clear {}", output_dir.display()), e)
            })?;
        }
        fs::create_dir_all(output_dir).map_err(|e| {
            BobbinError::io(format!("Failed to create {}", output_dir.display()), e)
        })?;

        let mut outputs = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            outputs.push(output_dir.join(format!("bobbin-{index}-{}", file_name_of(input)?)));
        }
        info!("Remapping {} artifacts under {}", inputs.len(), spec);
        try_join_all(
            inputs
                .iter()
                .zip(&outputs)
                .map(|(input, output)| self.remap(spec, input, output, classpath)),
        )
        .await
    }

    async fn resolve_table(&self, spec: &MappingSpec) -> Result<Arc<RenamingTable>> {
        let context = Arc::clone(&self.context);
        let spec = spec.clone();
        run_blocking("table resolution", move || context.resolve_spec(&spec)).await
    }

    async fn produce(
        &self,
        key: &CacheKey,
        file_name: &str,
        table: Arc<RenamingTable>,
        input: &Path,
        output: &Path,
        classpath: &[PathBuf],
    ) -> Result<Production> {
        if let Some(store) = &self.store {
            if let Some(path) = store.lookup(key, file_name)? {
                info!("Cache hit for {} ({})", file_name, key.digest().short());
                return Ok(Production::Artifact {
                    path,
                    cache_hit: true,
                });
            }
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BobbinError::internal("remap worker pool is closed"))?;
        let request = RemapRequest::new(
            MappingsSource::Table(table),
            input,
            output,
            &self.config.execution.scratch_dir,
        )
        .with_classpath(classpath.iter().cloned())
        .with_options(RemapOptions {
            remap_locals: self.config.execution.remap_locals,
            ..RemapOptions::default()
        });

        match self.remapper.execute(&request, &self.cancel).await? {
            RemapResult::SkippedMissingInput => Ok(Production::Skipped),
            RemapResult::Completed {
                output,
                diagnostics,
            } => {
                if !diagnostics.trim().is_empty() {
                    debug!("Renamer output for {}:\n{}", input.display(), diagnostics.trim_end());
                }
                if let Some(store) = &self.store {
                    let (store, key) = (Arc::clone(store), key.clone());
                    let (file_name, artifact) = (file_name.to_string(), output.clone());
                    run_blocking("storing the artifact", move || {
                        store.store(&key, &file_name, &artifact)
                    })
                    .await?;
                }
                Ok(Production::Artifact {
                    path: output,
                    cache_hit: false,
                })
            }
        }
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            BobbinError::io(
                format!("Path has no file name: {}", path.display()),
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )
        })
}
