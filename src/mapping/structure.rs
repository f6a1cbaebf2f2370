//! Mapping structures: recipes describing how to build a renaming table.
//!
//! [`MappingsStructure`] is the closed recipe tree consumed by the
//! composition engine. [`StructureDocument`] is its on-disk form: a YAML (or
//! JSON) file with named definitions that may reference each other, which is
//! where cycles can appear and are rejected while expanding.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{BobbinError, Result};

/// How to derive a renaming table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingsStructure {
    /// Load a persisted table; archives are searched for their embedded table
    File(PathBuf),
    /// Apply each child in order, composing source to target across the chain
    Chained(Vec<MappingsStructure>),
    /// Union of tables that must agree wherever they overlap
    Merged(Vec<MappingsStructure>),
    /// Swap source and target of the child
    Reversed(Box<MappingsStructure>),
    /// The externally supplied canonical table, reversed on consumption
    CanonicalSource,
}

impl MappingsStructure {
    /// Leaf loading a table file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Chain of structures
    pub fn chained(children: impl IntoIterator<Item = Self>) -> Self {
        Self::Chained(children.into_iter().collect())
    }

    /// Merge of structures
    pub fn merged(children: impl IntoIterator<Item = Self>) -> Self {
        Self::Merged(children.into_iter().collect())
    }

    /// Reversal of a structure
    pub fn reversed(child: Self) -> Self {
        Self::Reversed(Box::new(child))
    }

    /// Every file leaf in evaluation order
    pub fn files(&self) -> Vec<&Path> {
        let mut files = Vec::new();
        self.collect_files(&mut files);
        files
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a Path>) {
        match self {
            Self::File(path) => out.push(path),
            Self::Chained(children) | Self::Merged(children) => {
                for child in children {
                    child.collect_files(out);
                }
            }
            Self::Reversed(child) => child.collect_files(out),
            Self::CanonicalSource => {}
        }
    }

    /// Whether the canonical source appears anywhere in the tree
    pub fn uses_canonical_source(&self) -> bool {
        match self {
            Self::CanonicalSource => true,
            Self::File(_) => false,
            Self::Chained(children) | Self::Merged(children) => {
                children.iter().any(Self::uses_canonical_source)
            }
            Self::Reversed(child) => child.uses_canonical_source(),
        }
    }
}

impl fmt::Display for MappingsStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file({})", path.display()),
            Self::Chained(children) => write_list(f, "chain", children),
            Self::Merged(children) => write_list(f, "merge", children),
            Self::Reversed(child) => write!(f, "reverse({child})"),
            Self::CanonicalSource => f.write_str("canonical"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, children: &[MappingsStructure]) -> fmt::Result {
    write!(f, "{name}[")?;
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{child}")?;
    }
    f.write_str("]")
}

/// One node of a structure document. Exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructureNode {
    /// Table file, relative to the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Chained children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<Vec<StructureNode>>,
    /// Merged children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<Vec<StructureNode>>,
    /// Reversed child
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<Box<StructureNode>>,
    /// Use the canonical source
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub canonical: bool,
    /// Reference to a named definition
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// A structure file: named definitions plus the root recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructureDocument {
    /// Reusable named structures
    #[serde(default)]
    pub definitions: BTreeMap<String, StructureNode>,
    /// The structure to build
    pub root: StructureNode,
}

impl StructureDocument {
    /// Read a document; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BobbinError::io(
                format!("Failed to read structure file: {}", path.display()),
                e,
            )
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let document = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(document)
    }

    /// Expand the root into a structure tree, resolving relative paths against `base_dir`
    pub fn to_structure(&self, base_dir: &Path) -> Result<MappingsStructure> {
        let mut stack = Vec::new();
        self.expand(&self.root, base_dir, &mut stack)
    }

    /// Expand one named definition into a structure tree
    pub fn definition(&self, name: &str, base_dir: &Path) -> Result<MappingsStructure> {
        let node = self.definitions.get(name).ok_or_else(|| {
            BobbinError::composition(format!("structure definition '{name}' does not exist"))
        })?;
        let mut stack = vec![name.to_string()];
        self.expand(node, base_dir, &mut stack)
    }

    fn expand(
        &self,
        node: &StructureNode,
        base_dir: &Path,
        stack: &mut Vec<String>,
    ) -> Result<MappingsStructure> {
        let set = [
            node.file.is_some(),
            node.chain.is_some(),
            node.merge.is_some(),
            node.reverse.is_some(),
            node.canonical,
            node.reference.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if set != 1 {
            return Err(BobbinError::composition(format!(
                "a structure node must set exactly one of file, chain, merge, reverse, canonical, ref (found {set})"
            )));
        }

        let expand_all = |children: &[StructureNode], stack: &mut Vec<String>| {
            children
                .iter()
                .map(|child| self.expand(child, base_dir, stack))
                .collect::<Result<Vec<_>>>()
        };

        if let Some(file) = &node.file {
            return Ok(MappingsStructure::File(base_dir.join(file)));
        }
        if let Some(children) = &node.chain {
            return Ok(MappingsStructure::Chained(expand_all(children, stack)?));
        }
        if let Some(children) = &node.merge {
            return Ok(MappingsStructure::Merged(expand_all(children, stack)?));
        }
        if let Some(child) = &node.reverse {
            return Ok(MappingsStructure::reversed(self.expand(child, base_dir, stack)?));
        }
        if node.canonical {
            return Ok(MappingsStructure::CanonicalSource);
        }

        let name = node.reference.as_deref().unwrap_or_default();
        if let Some(start) = stack.iter().position(|entry| entry == name) {
            let mut cycle = stack[start..].to_vec();
            cycle.push(name.to_string());
            return Err(BobbinError::composition(format!(
                "structure definitions form a cycle: {}",
                cycle.join(" -> ")
            )));
        }
        let target = self.definitions.get(name).ok_or_else(|| {
            BobbinError::composition(format!("reference to unknown structure definition '{name}'"))
        })?;
        debug!("Expanding structure reference '{}'", name);
        stack.push(name.to_string());
        let expanded = self.expand(target, base_dir, stack);
        stack.pop();
        expanded
    }
}
