//! In-memory renaming tables.
//!
//! A [`RenamingTable`] renames symbols from its source namespace into its
//! target namespace. Entries are keyed by their source-namespace identity:
//! classes by internal name, fields and methods by `(name, descriptor)` with
//! the descriptor written in source-namespace terms.
//!
//! Every entry distinguishes "listed but not renamed" (`target == None`) from
//! "renamed" (`target == Some(..)`), which keeps merges precise and makes the
//! persisted format round-trip exactly. All maps are ordered so iteration and
//! serialization are deterministic.

use std::collections::BTreeMap;
use std::fmt;

use crate::mapping::namespace::Namespace;

/// Namespace name used for tables that do not declare one.
pub const DEFAULT_SOURCE_NAMESPACE: &str = "source";
/// Namespace name used for tables that do not declare one.
pub const DEFAULT_TARGET_NAMESPACE: &str = "target";

/// Identity of a field or method inside its owner class
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    /// Member name
    pub name: String,
    /// JVM descriptor, in the namespace of the table that owns the key
    pub descriptor: String,
}

impl MemberKey {
    /// Create a member key
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// A field rename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldEntry {
    /// Target-namespace name, `None` if the field keeps its name
    pub target: Option<String>,
}

/// A method parameter rename, keyed by local-variable index in [`MethodEntry`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterEntry {
    /// Source-namespace name, often absent in obfuscated inputs
    pub source: Option<String>,
    /// Target-namespace name
    pub target: Option<String>,
}

/// A local-variable rename
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalEntry {
    /// Local variable slot
    pub lv_index: u16,
    /// Bytecode offset at which the variable becomes live
    pub start_offset: u32,
    /// Row in the local variable table, when known
    pub lvt_row_index: Option<u32>,
    /// Source-namespace name
    pub source: Option<String>,
    /// Target-namespace name
    pub target: Option<String>,
}

/// A method rename plus its parameter and local-variable renames
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodEntry {
    /// Target-namespace name, `None` if the method keeps its name
    pub target: Option<String>,
    /// Parameter renames by local-variable index
    pub parameters: BTreeMap<u16, ParameterEntry>,
    /// Local-variable renames, kept sorted
    pub locals: Vec<LocalEntry>,
}

impl MethodEntry {
    /// Record a parameter rename, replacing any previous entry for the slot
    pub fn insert_parameter(
        &mut self,
        lv_index: u16,
        source: Option<String>,
        target: Option<String>,
    ) -> &mut Self {
        self.parameters
            .insert(lv_index, ParameterEntry { source, target });
        self
    }

    /// Record a local-variable rename
    pub fn push_local(&mut self, local: LocalEntry) -> &mut Self {
        let at = self
            .locals
            .binary_search(&local)
            .unwrap_or_else(|position| position);
        self.locals.insert(at, local);
        self
    }

    /// Whether the method carries parameter or local-variable entries
    pub fn has_local_names(&self) -> bool {
        !self.parameters.is_empty() || !self.locals.is_empty()
    }
}

/// All renames that belong to one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassEntry {
    /// Target-namespace internal name, `None` if the class keeps its name
    pub target: Option<String>,
    /// Field renames
    pub fields: BTreeMap<MemberKey, FieldEntry>,
    /// Method renames
    pub methods: BTreeMap<MemberKey, MethodEntry>,
}

impl ClassEntry {
    /// Record a field rename
    pub fn insert_field(&mut self, key: MemberKey, target: Option<String>) -> &mut Self {
        self.fields.insert(key, FieldEntry { target });
        self
    }

    /// Record a method rename and return it for parameter/local entries
    pub fn insert_method(&mut self, key: MemberKey, target: Option<String>) -> &mut MethodEntry {
        let entry = self.methods.entry(key).or_default();
        entry.target = target;
        entry
    }
}

/// Entry counts, used for logging and `bobbin inspect`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TableStats {
    /// Number of class entries
    pub classes: usize,
    /// Number of field entries
    pub fields: usize,
    /// Number of method entries
    pub methods: usize,
    /// Number of parameter entries
    pub parameters: usize,
    /// Number of local-variable entries
    pub locals: usize,
}

/// A concrete renaming from one namespace into another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamingTable {
    source: Namespace,
    target: Namespace,
    classes: BTreeMap<String, ClassEntry>,
}

impl Default for RenamingTable {
    fn default() -> Self {
        Self::identity()
    }
}

impl RenamingTable {
    /// Create an empty table between two namespaces
    pub fn new(source: impl Into<Namespace>, target: impl Into<Namespace>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            classes: BTreeMap::new(),
        }
    }

    /// The table that renames nothing
    pub fn identity() -> Self {
        Self::new(DEFAULT_SOURCE_NAMESPACE, DEFAULT_TARGET_NAMESPACE)
    }

    /// Namespace the keys are written in
    pub const fn source_namespace(&self) -> &Namespace {
        &self.source
    }

    /// Namespace the targets are written in
    pub const fn target_namespace(&self) -> &Namespace {
        &self.target
    }

    /// Whether the table has no entries at all
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Look up the entry for a source-namespace class name
    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    /// All class entries in name order
    pub fn classes(&self) -> impl Iterator<Item = (&str, &ClassEntry)> {
        self.classes.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Add (or fetch) the entry for a class and set its target name
    pub fn insert_class(&mut self, name: impl Into<String>, target: Option<String>) -> &mut ClassEntry {
        let entry = self.classes.entry(name.into()).or_default();
        entry.target = target;
        entry
    }

    /// Fetch the entry for a class, creating an unrenamed one if absent
    pub fn class_entry_mut(&mut self, name: impl Into<String>) -> &mut ClassEntry {
        self.classes.entry(name.into()).or_default()
    }

    /// Target name of a class; unknown or unrenamed classes keep their name
    pub fn map_class<'a>(&'a self, name: &'a str) -> &'a str {
        self.classes
            .get(name)
            .and_then(|entry| entry.target.as_deref())
            .unwrap_or(name)
    }

    /// Target name of a field, falling back to its current name
    pub fn map_field<'a>(&'a self, owner: &str, name: &'a str, descriptor: &str) -> &'a str {
        self.classes
            .get(owner)
            .and_then(|class| class.fields.get(&MemberKey::new(name, descriptor)))
            .and_then(|field| field.target.as_deref())
            .unwrap_or(name)
    }

    /// Target name of a method, falling back to its current name
    pub fn map_method<'a>(&'a self, owner: &str, name: &'a str, descriptor: &str) -> &'a str {
        self.classes
            .get(owner)
            .and_then(|class| class.methods.get(&MemberKey::new(name, descriptor)))
            .and_then(|method| method.target.as_deref())
            .unwrap_or(name)
    }

    /// Rewrite every class reference inside a field or method descriptor
    pub fn map_descriptor(&self, descriptor: &str) -> String {
        remap_descriptor(descriptor, |name| self.map_class(name).to_string())
    }

    /// Copy of this table with parameter and local-variable entries removed
    #[must_use]
    pub fn without_local_names(&self) -> Self {
        let mut table = self.clone();
        for class in table.classes.values_mut() {
            for method in class.methods.values_mut() {
                method.parameters.clear();
                method.locals.clear();
            }
        }
        table
    }

    /// Whether any method carries parameter or local-variable entries
    pub fn has_local_names(&self) -> bool {
        self.classes
            .values()
            .flat_map(|class| class.methods.values())
            .any(MethodEntry::has_local_names)
    }

    /// Count entries by kind
    pub fn stats(&self) -> TableStats {
        let mut stats = TableStats {
            classes: self.classes.len(),
            ..TableStats::default()
        };
        for class in self.classes.values() {
            stats.fields += class.fields.len();
            stats.methods += class.methods.len();
            for method in class.methods.values() {
                stats.parameters += method.parameters.len();
                stats.locals += method.locals.len();
            }
        }
        stats
    }
}

/// Rewrite the `L<internal name>;` references of a descriptor with `map`.
///
/// Anything that is not a class reference is copied through unchanged, so
/// malformed descriptors degrade to partial renaming instead of failing.
pub fn remap_descriptor(descriptor: &str, mut map: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(descriptor.len());
    let mut rest = descriptor;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..=start]);
        let after = &rest[start + 1..];
        match after.find(';') {
            Some(end) => {
                out.push_str(&map(&after[..end]));
                out.push(';');
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
