//! # Bobbin-RS: Bytecode Namespace Remapping
//!
//! Bobbin renames the classes, members, parameters and locals of compiled
//! archives from one naming namespace to another. The library provides:
//!
//! - **Mapping tables**: a two-namespace renaming table, its line-based
//!   persisted format and archive-embedded tables
//! - **Composition**: declarative structures that chain, merge and reverse
//!   tables, resolved with structural memoization
//! - **Remap execution**: the argument-file protocol between the host and
//!   the renamer process, with guaranteed scratch cleanup and atomic output
//! - **Artifact caching**: content-addressed reuse of remapped artifacts and
//!   coalescing of duplicate in-flight remaps
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    API Layer (RemapEngine)               │
//! ├──────────────────────────────────────────────────────────┤
//! │  Mapping        │  Remap             │  I/O              │
//! │                 │                    │                   │
//! │ • Namespaces    │ • Argument file    │ • Archives        │
//! │ • Tables / tiny │ • Renamer process  │ • Artifact cache  │
//! │ • Composition   │ • Adapter          │                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use bobbin_rs::{BobbinConfig, CompositionContext, MappingSpec, MappingsStructure, RemapEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let spec = MappingSpec::named("official", "named");
//!     let context = Arc::new(CompositionContext::default());
//!     context.register(spec.clone(), MappingsStructure::file("mappings.tiny"))?;
//!
//!     let engine = RemapEngine::new(BobbinConfig::default(), context)?;
//!     let outcome = engine
//!         .remap(&spec, Path::new("game.jar"), Path::new("game-named.jar"), &[])
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Memory allocator selection (mutually exclusive)
#[cfg(all(feature = "mimalloc", not(feature = "jemalloc")))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(all(feature = "jemalloc", not(feature = "mimalloc")))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

// Errors and configuration
pub mod core {
    //! Error types and configuration.

    pub mod config;
    pub mod errors;
}

// Renaming tables and their composition
pub mod mapping {
    //! Namespaces, renaming tables and the composition algebra.

    pub mod compose;
    pub mod context;
    pub mod namespace;
    pub mod structure;
    pub mod table;
    pub mod tiny;
}

// Both sides of the renamer process boundary
pub mod remap {
    //! Remap execution: argument files, the renamer process and the adapter.

    pub mod adapter;
    pub mod arguments;
    pub mod execute;
    pub mod launcher;
    pub mod renamer;
}

// Archives and the artifact cache
pub mod io {
    //! Archive handling and remapped-artifact caching.

    pub mod archive;
    pub mod cache;
    pub mod staging;
}

// Public API and engine interface
pub mod api {
    //! High-level remap engine.

    pub mod engine;
}

// Re-export primary types for convenience
pub use api::engine::{RemapEngine, RemapOutcome};
pub use core::config::BobbinConfig;
pub use core::errors::{BobbinError, Result, ResultExt};
pub use mapping::context::{CompositionContext, FileCanonicalSource};
pub use mapping::namespace::{MappingSpec, Namespace};
pub use mapping::structure::MappingsStructure;
pub use mapping::table::RenamingTable;
pub use remap::execute::{MappingsSource, RemapRequest, RemapResult, Remapper};
pub use remap::renamer::{ProcessRenamer, Renamer};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
