//! Namespace identities and the [`MappingSpec`] cache-key token.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::BobbinError;

/// Separator between the two namespaces in the text form of a [`MappingSpec`].
pub const SPEC_SEPARATOR: &str = "->";

/// Text form of [`MappingSpec::Unmapped`].
pub const UNMAPPED: &str = "unmapped";

/// An opaque symbol-naming scheme identifier such as `official` or `named`.
///
/// Two namespaces with the same string are the same namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Arc<str>);

impl Namespace {
    /// Create a namespace from its name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The namespace name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Namespace {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Identifies which renaming table is in effect for an artifact.
///
/// `Unmapped` is the state of every artifact before any remap is applied.
/// `Named` carries a direction: `Named(a, b)` is never equal to `Named(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MappingSpec {
    /// No renaming applied
    Unmapped,
    /// Renamed from `start` to `end`
    Named {
        /// Source namespace
        start: Namespace,
        /// Target namespace
        end: Namespace,
    },
}

impl MappingSpec {
    /// Create a directed spec between two namespaces
    pub fn named(start: impl Into<Namespace>, end: impl Into<Namespace>) -> Self {
        Self::Named {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether this is the identity spec
    pub const fn is_unmapped(&self) -> bool {
        matches!(self, Self::Unmapped)
    }

    /// The `(start, end)` pair of a named spec
    pub const fn namespaces(&self) -> Option<(&Namespace, &Namespace)> {
        match self {
            Self::Unmapped => None,
            Self::Named { start, end } => Some((start, end)),
        }
    }

    /// The mapping spec pointing the other way; `Unmapped` is its own inverse
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::Unmapped => Self::Unmapped,
            Self::Named { start, end } => Self::Named {
                start: end.clone(),
                end: start.clone(),
            },
        }
    }

    /// Label for an artifact remapped under this spec, `"<spec>@<file name>"`
    pub fn artifact_file_name(&self, input_file_name: &str) -> String {
        format!("{self}@{input_file_name}")
    }
}

impl fmt::Display for MappingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmapped => f.write_str(UNMAPPED),
            Self::Named { start, end } => write!(f, "{start}{SPEC_SEPARATOR}{end}"),
        }
    }
}

impl FromStr for MappingSpec {
    type Err = BobbinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == UNMAPPED {
            return Ok(Self::Unmapped);
        }
        let mut parts = s.split(SPEC_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(start), Some(end), None) if !start.is_empty() && !end.is_empty() => {
                Ok(Self::named(start, end))
            }
            _ => Err(BobbinError::argument(format!(
                "Mapping spec '{s}' must be '{UNMAPPED}' or contain exactly one '{SPEC_SEPARATOR}' between two namespaces"
            ))),
        }
    }
}

impl TryFrom<String> for MappingSpec {
    type Error = BobbinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MappingSpec> for String {
    fn from(spec: MappingSpec) -> Self {
        spec.to_string()
    }
}
