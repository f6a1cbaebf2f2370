//! Command execution for the `bobbin` binary.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use owo_colors::OwoColorize;
use tracing::{info, warn};

use crate::cli::args::{
    InitConfigArgs, InspectArgs, InspectFormat, MappingsArgs, RemapArgs, ResolveArgs,
    ValidateConfigArgs,
};
use crate::cli::config_layer::{build_layered_config, load_configuration};
use bobbin_rs::mapping::compose::reverse;
use bobbin_rs::mapping::context::NoCanonicalSource;
use bobbin_rs::mapping::structure::StructureDocument;
use bobbin_rs::mapping::tiny::{write_tiny, write_tiny_file};
use bobbin_rs::{
    BobbinConfig, CompositionContext, FileCanonicalSource, MappingSpec, MappingsStructure,
    RemapEngine, RemapOutcome, RenamingTable,
};

/// Composition context and structure described by the mapping arguments
fn structure_from_args(args: &MappingsArgs) -> anyhow::Result<(CompositionContext, MappingsStructure)> {
    let context = match &args.canonical {
        Some(path) => CompositionContext::new(FileCanonicalSource::new(path)),
        None => CompositionContext::new(NoCanonicalSource),
    };
    let structure = match (&args.mappings, &args.structure) {
        (Some(mappings), _) => MappingsStructure::file(mappings),
        (None, Some(document_path)) => {
            let document = StructureDocument::from_file(document_path)?;
            let base_dir = document_path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            match &args.definition {
                Some(name) => document.definition(name, base_dir)?,
                None => document.to_structure(base_dir)?,
            }
        }
        (None, None) => bail!("either --mappings or --structure is required"),
    };
    Ok((context, structure))
}

fn resolve_table(args: &MappingsArgs) -> anyhow::Result<Arc<RenamingTable>> {
    let (context, structure) = structure_from_args(args)?;
    info!("Resolving {}", structure);
    Ok(context.resolve(&structure)?)
}

/// Remap one archive, or a batch into an output directory
pub async fn remap_command(args: RemapArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = build_layered_config(config_path, &args)?;
    let (context, structure) = structure_from_args(&args.mappings)?;

    let spec = match &args.spec {
        Some(spec) => spec.clone(),
        None => {
            let table = context.resolve(&structure)?;
            MappingSpec::named(
                table.source_namespace().clone(),
                table.target_namespace().clone(),
            )
        }
    };
    if spec.is_unmapped() {
        bail!("remapping requires a named spec such as official->named");
    }
    context.register(spec.clone(), structure)?;

    let engine = RemapEngine::new(config, Arc::new(context))?;
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping renamers");
            cancel.cancel();
        }
    });

    let outcomes = match (&args.output, &args.output_dir) {
        (Some(output), None) => {
            let [input] = args.inputs.as_slice() else {
                bail!("--output takes a single input; use --output-dir for {} inputs", args.inputs.len());
            };
            vec![engine.remap(&spec, input, output, &args.classpath).await?]
        }
        (None, Some(output_dir)) => {
            engine
                .remap_many(&spec, &args.inputs, output_dir, &args.classpath)
                .await?
        }
        _ => bail!("exactly one of --output or --output-dir is required"),
    };

    for (input, outcome) in args.inputs.iter().zip(&outcomes) {
        match outcome {
            RemapOutcome::Remapped { output, cache_hit } => {
                let how = if *cache_hit { "cached" } else { "remapped" };
                println!(
                    "{} {} -> {} ({})",
                    "✅".bright_green(),
                    input.display(),
                    output.display().to_string().cyan(),
                    how.dimmed()
                );
            }
            RemapOutcome::SkippedMissingInput => {
                println!(
                    "{} {} does not exist yet, skipped",
                    "⏭️".yellow(),
                    input.display()
                );
            }
            RemapOutcome::Passthrough(path) => {
                println!("{} {} is unmapped", "➖".dimmed(), path.display());
            }
        }
    }
    Ok(())
}

/// Resolve mappings and write them in tiny format
pub async fn resolve_command(args: ResolveArgs) -> anyhow::Result<()> {
    let resolved = resolve_table(&args.mappings)?;
    let source = args.source.as_ref().unwrap_or(resolved.source_namespace());
    let target = args.target.as_ref().unwrap_or(resolved.target_namespace());

    let table = if source == resolved.source_namespace() && target == resolved.target_namespace() {
        RenamingTable::clone(&resolved)
    } else if source == resolved.target_namespace() && target == resolved.source_namespace() {
        reverse(&resolved)?
    } else {
        bail!(
            "cannot write {source} -> {target}: the resolved table maps {} -> {}",
            resolved.source_namespace(),
            resolved.target_namespace()
        );
    };

    match &args.output {
        Some(path) => {
            write_tiny_file(&table, path)?;
            eprintln!(
                "{} {}",
                "✅ Mappings written to:".bright_green().bold(),
                path.display().to_string().cyan()
            );
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_tiny(&table, &mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

/// Print namespaces and entry counts
pub async fn inspect_command(args: InspectArgs) -> anyhow::Result<()> {
    let table = resolve_table(&args.mappings)?;
    let stats = table.stats();
    match args.format {
        InspectFormat::Json => {
            let summary = serde_json::json!({
                "source": table.source_namespace().as_str(),
                "target": table.target_namespace().as_str(),
                "stats": stats,
                "local_names": table.has_local_names(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        InspectFormat::Text => {
            println!(
                "{} {} -> {}",
                "🧵 Namespaces:".bright_blue().bold(),
                table.source_namespace().to_string().cyan(),
                table.target_namespace().to_string().cyan()
            );
            println!("   Classes:    {}", stats.classes);
            println!("   Fields:     {}", stats.fields);
            println!("   Methods:    {}", stats.methods);
            println!("   Parameters: {}", stats.parameters);
            println!("   Locals:     {}", stats.locals);
        }
    }
    Ok(())
}

/// Print the default configuration
pub async fn print_default_config() -> anyhow::Result<()> {
    println!("{}", "# Default bobbin configuration".dimmed());
    println!("{}", "# Save this to a file and customize as needed".dimmed());
    println!("{}", "# Usage: bobbin remap --config your-config.yml ...".dimmed());
    println!();
    println!("{}", serde_yaml::to_string(&BobbinConfig::default())?);
    Ok(())
}

/// Write a configuration file with defaults
pub async fn init_config(args: InitConfigArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "Configuration file already exists: {} (use --force to overwrite)",
            args.output.display()
        );
    }
    BobbinConfig::default().to_yaml_file(&args.output)?;

    println!(
        "{} {}",
        "✅ Configuration saved to:".bright_green().bold(),
        args.output.display().to_string().cyan()
    );
    println!();
    println!("{}", "🔧 Key settings you can customize:".bright_blue().bold());
    println!("   renamer.program            Renamer executable to spawn");
    println!("   renamer.version            Renamer identity used in cache keys");
    println!("   execution.max_concurrency  Remaps running at once");
    println!("   cache.directory            Where remapped artifacts are kept");
    Ok(())
}

/// Check that a configuration file loads and validates
pub async fn validate_config(args: ValidateConfigArgs) -> anyhow::Result<()> {
    println!(
        "{} {}",
        "🔍 Validating configuration:".bright_blue().bold(),
        args.file.display().to_string().cyan()
    );
    let config = load_configuration(Some(&args.file))?;
    config
        .validate()
        .with_context(|| format!("{} is not valid", args.file.display()))?;

    println!("{}", "✅ Configuration file is valid!".bright_green().bold());
    println!();
    println!("   Renamer:         {}", config.renamer.program.display());
    println!("   Renamer version: {}", config.renamer.version);
    println!("   Concurrency:     {}", config.execution.max_concurrency);
    println!("   Remap locals:    {}", config.execution.remap_locals);
    if config.cache.enabled {
        println!("   Cache:           {}", config.cache.directory.display());
    } else {
        println!("   Cache:           disabled");
    }
    Ok(())
}
