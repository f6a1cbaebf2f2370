//! Error types for the bobbin-rs library.
//!
//! Every fallible operation in the crate returns [`BobbinError`]. The variants
//! follow the failure taxonomy of the remapping pipeline: argument-file
//! problems, mapping-table loading, merge conflicts and child-process
//! failures each get their own structured variant so callers can match on
//! them and diagnostics keep their context.

use std::io;
use std::num::ParseIntError;

use thiserror::Error;

/// Main result type for bobbin operations.
pub type Result<T> = std::result::Result<T, BobbinError>;

/// Comprehensive error type for all bobbin operations.
#[derive(Error, Debug)]
pub enum BobbinError {
    /// I/O related errors (file operations, process pipes, etc.)
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error description
        message: String,
        /// Configuration field that caused the error
        field: Option<String>,
    },

    /// Malformed or missing input in the argument-file protocol
    #[error("Argument error: {message}")]
    Argument {
        /// Error description
        message: String,
    },

    /// A mapping table could not be loaded
    #[error("Failed to load mappings{}: {message}", location_suffix(.path.as_deref(), .line.as_ref()))]
    MappingLoad {
        /// Error description
        message: String,
        /// File the table was read from
        path: Option<String>,
        /// One-based line number (if available)
        line: Option<usize>,
    },

    /// Two merged tables disagree on the name of a symbol
    #[error(
        "Merge conflict for {symbol}: '{first_source}' maps it to '{first_target}' \
         but '{second_source}' maps it to '{second_target}'"
    )]
    MergeConflict {
        /// Symbol both tables rename
        symbol: String,
        /// Description of the first table
        first_source: String,
        /// Name assigned by the first table
        first_target: String,
        /// Description of the second table
        second_source: String,
        /// Name assigned by the second table
        second_target: String,
    },

    /// Table composition failed for a reason other than a merge conflict
    #[error("Composition error: {message}")]
    Composition {
        /// Error description
        message: String,
    },

    /// The renamer process failed or produced no output
    #[error("Remap execution failed: {message}")]
    RemapExecution {
        /// Error description
        message: String,
        /// Exit code of the child process, if it exited normally
        exit_code: Option<i32>,
        /// Captured diagnostic output of the child process
        diagnostics: String,
    },

    /// The operation was cancelled before completion
    #[error("Operation cancelled: {message}")]
    Cancelled {
        /// What was being done when cancellation arrived
        message: String,
    },

    /// Cache and storage errors
    #[error("Cache error: {message}")]
    Cache {
        /// Error description
        message: String,
        /// Cache key that caused the issue
        key: Option<String>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Data type being serialized
        data_type: Option<String>,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Error description
        message: String,
        /// Additional context
        context: Option<String>,
    },
}

fn location_suffix(path: Option<&str>, line: Option<&usize>) -> String {
    match (path, line) {
        (Some(path), Some(line)) => format!(" from {path}:{line}"),
        (Some(path), None) => format!(" from {path}"),
        (None, Some(line)) => format!(" at line {line}"),
        (None, None) => String::new(),
    }
}

impl BobbinError {
    /// Create a new I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new configuration error with field context
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new argument-protocol error
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    /// Create a new mapping load error
    pub fn mapping_load(message: impl Into<String>) -> Self {
        Self::MappingLoad {
            message: message.into(),
            path: None,
            line: None,
        }
    }

    /// Create a new mapping load error pointing at a line of a file
    pub fn mapping_load_at(
        message: impl Into<String>,
        path: impl Into<String>,
        line: Option<usize>,
    ) -> Self {
        Self::MappingLoad {
            message: message.into(),
            path: Some(path.into()),
            line,
        }
    }

    /// Create a new composition error
    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition {
            message: message.into(),
        }
    }

    /// Create a new remap execution error
    pub fn remap_execution(
        message: impl Into<String>,
        exit_code: Option<i32>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::RemapExecution {
            message: message.into(),
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }

    /// Create a new cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache(message: impl Into<String>, key: Option<String>) -> Self {
        Self::Cache {
            message: message.into(),
            key,
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// Attach a file path to a mapping load error that does not carry one yet
    pub fn with_mapping_path(mut self, file: impl Into<String>) -> Self {
        if let Self::MappingLoad { path, .. } = &mut self {
            if path.is_none() {
                *path = Some(file.into());
            }
        }
        self
    }

    /// Add context to an existing error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        match &mut self {
            Self::Internal { context: ctx, .. } => {
                *ctx = Some(context.into());
            }
            Self::Io { message, .. } => {
                *message = format!("{}: {message}", context.into());
            }
            _ => {}
        }
        self
    }

    /// Whether this error came from the argument-file protocol
    pub const fn is_argument_error(&self) -> bool {
        matches!(self, Self::Argument { .. })
    }
}

/// Underlying sources are not cloneable; copies carry their kind and message.
impl Clone for BobbinError {
    fn clone(&self) -> Self {
        match self {
            Self::Io { message, source } => Self::Io {
                message: message.clone(),
                source: io::Error::new(source.kind(), source.to_string()),
            },
            Self::Config { message, field } => Self::Config {
                message: message.clone(),
                field: field.clone(),
            },
            Self::Argument { message } => Self::argument(message.clone()),
            Self::MappingLoad {
                message,
                path,
                line,
            } => Self::MappingLoad {
                message: message.clone(),
                path: path.clone(),
                line: *line,
            },
            Self::MergeConflict {
                symbol,
                first_source,
                first_target,
                second_source,
                second_target,
            } => Self::MergeConflict {
                symbol: symbol.clone(),
                first_source: first_source.clone(),
                first_target: first_target.clone(),
                second_source: second_source.clone(),
                second_target: second_target.clone(),
            },
            Self::Composition { message } => Self::composition(message.clone()),
            Self::RemapExecution {
                message,
                exit_code,
                diagnostics,
            } => Self::remap_execution(message.clone(), *exit_code, diagnostics.clone()),
            Self::Cancelled { message } => Self::cancelled(message.clone()),
            Self::Cache { message, key } => Self::cache(message.clone(), key.clone()),
            Self::Serialization {
                message,
                data_type,
                source,
            } => Self::Serialization {
                message: message.clone(),
                data_type: data_type.clone(),
                source: source
                    .as_ref()
                    .map(|source| Box::<dyn std::error::Error + Send + Sync>::from(source.to_string())),
            },
            Self::Internal { message, context } => Self::Internal {
                message: message.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<io::Error> for BobbinError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for BobbinError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON serialization failed: {err}"),
            data_type: Some("JSON".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for BobbinError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML serialization failed: {err}"),
            data_type: Some("YAML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<zip::result::ZipError> for BobbinError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(source) => Self::io("Archive I/O failed", source),
            other => Self::Serialization {
                message: format!("Archive handling failed: {other}"),
                data_type: Some("zip".to_string()),
                source: Some(Box::new(other)),
            },
        }
    }
}

impl From<ParseIntError> for BobbinError {
    fn from(err: ParseIntError) -> Self {
        Self::mapping_load(format!("Invalid integer: {err}"))
    }
}

/// Result extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error result
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BobbinError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| BobbinError::with_context(e.into(), f()))
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| BobbinError::with_context(e.into(), msg))
    }
}
