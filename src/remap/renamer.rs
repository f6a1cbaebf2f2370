//! Launching the renamer.
//!
//! The renamer is an injectable capability: [`ProcessRenamer`] spawns an
//! external program with the argument file, tests substitute their own
//! implementation and inspect the argument file instead.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::errors::{BobbinError, Result};

/// Output of a successful renamer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenamerOutput {
    /// Anything the renamer printed
    pub diagnostics: String,
}

/// Runs a remap described by an argument file
#[async_trait]
pub trait Renamer: Send + Sync {
    /// Tool identity, version and any fixed arguments; part of every cache key
    fn identity(&self) -> String;

    /// Run to completion, or stop early when `cancel` fires
    async fn run(&self, argument_file: &Path, cancel: &CancellationToken) -> Result<RenamerOutput>;
}

/// Renamer running as a child process
#[derive(Debug, Clone)]
pub struct ProcessRenamer {
    program: PathBuf,
    args: Vec<String>,
    version: String,
}

impl ProcessRenamer {
    /// Renamer invoking `program`; `version` identifies it in cache keys
    pub fn new(program: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            version: version.into(),
        }
    }

    /// Arguments placed before the argument-file path
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Program that gets spawned
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Renamer for ProcessRenamer {
    fn identity(&self) -> String {
        if self.args.is_empty() {
            self.version.clone()
        } else {
            format!("{} {:?}", self.version, self.args)
        }
    }

    async fn run(&self, argument_file: &Path, cancel: &CancellationToken) -> Result<RenamerOutput> {
        debug!(
            "Spawning {} {:?} {}",
            self.program.display(),
            self.args,
            argument_file.display()
        );
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(argument_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BobbinError::remap_execution(
                    format!("failed to launch {}: {e}", self.program.display()),
                    None,
                    String::new(),
                )
            })?;

        // dropping the child on cancellation kills it
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| {
                BobbinError::remap_execution(
                    format!("failed to wait for {}: {e}", self.program.display()),
                    None,
                    String::new(),
                )
            })?,
            () = cancel.cancelled() => {
                info!("Renamer {} cancelled", self.program.display());
                return Err(BobbinError::cancelled(format!(
                    "renamer {} was terminated",
                    self.program.display()
                )));
            }
        };

        let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            if !diagnostics.is_empty() && !diagnostics.ends_with('\n') {
                diagnostics.push('\n');
            }
            diagnostics.push_str(&stdout);
        }

        if !output.status.success() {
            let code = output.status.code();
            return Err(BobbinError::remap_execution(
                match code {
                    Some(code) => format!("{} exited with status {code}", self.program.display()),
                    None => format!("{} was terminated by a signal", self.program.display()),
                },
                code,
                diagnostics,
            ));
        }
        Ok(RenamerOutput { diagnostics })
    }
}
