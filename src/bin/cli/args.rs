//! CLI Argument Structures
//!
//! Command and argument definitions for the `bobbin` binary.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use bobbin_rs::{MappingSpec, Namespace};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bytecode namespace remapping
#[derive(Parser)]
#[command(name = "bobbin")]
#[command(version = VERSION)]
#[command(about = "Bobbin - remap compiled archives between naming namespaces")]
#[command(long_about = "
Compose renaming tables and remap compiled archives with them.

Common Usage:

  # Remap one archive with a single table
  bobbin remap --mappings mappings.tiny --output game-named.jar game.jar

  # Build the table from a structure document and remap a batch
  bobbin remap --structure mappings.yml --output-dir build/remapped a.jar b.jar

  # Write the resolved table, reversed
  bobbin resolve --structure mappings.yml --source named --target official -o out.tiny

  # Show what a table contains
  bobbin inspect --mappings mappings.tiny
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to .bobbin.yml or .bobbin.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Remap archives into a target namespace
    Remap(Box<RemapArgs>),

    /// Resolve mappings and write the table in tiny format
    Resolve(ResolveArgs),

    /// Print namespaces and entry counts of resolved mappings
    Inspect(InspectArgs),

    /// Print default configuration in YAML format
    #[command(name = "print-default-config")]
    PrintDefaultConfig,

    /// Initialize a configuration file with defaults
    #[command(name = "init-config")]
    InitConfig(InitConfigArgs),

    /// Validate a bobbin configuration file
    #[command(name = "validate-config")]
    ValidateConfig(ValidateConfigArgs),
}

/// Where the renaming table comes from
#[derive(Args, Debug, Clone)]
pub struct MappingsArgs {
    /// Tiny mapping file, or an archive embedding mappings/mappings.tiny
    #[arg(long, conflicts_with = "structure", required_unless_present = "structure")]
    pub mappings: Option<PathBuf>,

    /// Structure document (YAML or JSON) describing how tables compose
    #[arg(long)]
    pub structure: Option<PathBuf>,

    /// Named definition of the structure document to use instead of its root
    #[arg(long, requires = "structure")]
    pub definition: Option<String>,

    /// Canonical table used by `canonical` structure nodes
    #[arg(long)]
    pub canonical: Option<PathBuf>,
}

/// Remap command arguments
#[derive(Args)]
pub struct RemapArgs {
    #[command(flatten)]
    pub mappings: MappingsArgs,

    /// Mapping spec, e.g. official->named (defaults to the table's namespaces)
    #[arg(long)]
    pub spec: Option<MappingSpec>,

    /// Archives to remap
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output archive (single input only)
    #[arg(short, long, conflicts_with = "output_dir", required_unless_present = "output_dir")]
    pub output: Option<PathBuf>,

    /// Output directory; receives bobbin-<index>-<file name> per input
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Library on the compile classpath of the inputs (repeatable)
    #[arg(long = "classpath", value_name = "PATH")]
    pub classpath: Vec<PathBuf>,

    /// Renamer program to spawn
    #[arg(long)]
    pub renamer: Option<PathBuf>,

    /// Maximum number of concurrent remaps
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Parent directory for per-remap scratch directories
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Keep parameter and local variable names unchanged
    #[arg(long)]
    pub no_remap_locals: bool,

    /// Do not read or write the artifact cache
    #[arg(long)]
    pub no_cache: bool,
}

/// Resolve command arguments
#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub mappings: MappingsArgs,

    /// Namespace names are read in; must be one of the table's namespaces
    #[arg(long)]
    pub source: Option<Namespace>,

    /// Namespace names are written in; must be one of the table's namespaces
    #[arg(long)]
    pub target: Option<Namespace>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Inspect command arguments
#[derive(Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub mappings: MappingsArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: InspectFormat,
}

/// Output formats for `bobbin inspect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InspectFormat {
    /// Human-readable summary
    Text,
    /// JSON object
    Json,
}

/// Init-config command arguments
#[derive(Args)]
pub struct InitConfigArgs {
    /// Output configuration file name
    #[arg(short, long, default_value = ".bobbin.yml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

/// Validate-config command arguments
#[derive(Args)]
pub struct ValidateConfigArgs {
    /// Path to configuration file
    pub file: PathBuf,
}
