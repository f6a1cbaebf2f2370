//! Walks a renaming table in the direction the renamer was asked for.
//!
//! The adapter picks the orientation from the requested (source, target)
//! pair, then reports every rename to a [`MappingAcceptor`]. Symbols without a
//! target name are reported under their source name, so a consumer never
//! sees a missing name.

use std::borrow::Cow;
use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::core::errors::{BobbinError, Result};
use crate::mapping::compose::reverse;
use crate::mapping::namespace::Namespace;
use crate::mapping::table::RenamingTable;

/// Identity of a field or method in the source namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberRef {
    /// Owner class, source namespace
    pub owner: String,
    /// Member name, source namespace
    pub name: String,
    /// Descriptor, source namespace
    pub descriptor: String,
}

impl MemberRef {
    fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// Position of a local variable inside a method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalSlot {
    /// Local variable index
    pub lv_index: u16,
    /// Bytecode offset where the variable starts
    pub start_offset: u32,
    /// Row in the local variable table, when known
    pub lvt_row_index: Option<u32>,
}

/// Receives renames from [`RenamerAdapter::apply`]
pub trait MappingAcceptor {
    /// A class and its target name
    fn accept_class(&mut self, source_name: &str, target_name: &str);
    /// A field and its target name
    fn accept_field(&mut self, field: MemberRef, target_name: &str);
    /// A method and its target name
    fn accept_method(&mut self, method: MemberRef, target_name: &str);
    /// A method parameter and its target name
    fn accept_parameter(&mut self, method: &MemberRef, lv_index: u16, target_name: &str);
    /// A local variable and its target name
    fn accept_local(&mut self, method: &MemberRef, slot: LocalSlot, target_name: &str);
}

/// Adapts a two-namespace table to a requested (source, target) pair
#[derive(Debug)]
pub struct RenamerAdapter<'a> {
    table: Cow<'a, RenamingTable>,
    source: Namespace,
    target: Namespace,
    remap_locals: bool,
}

impl<'a> RenamerAdapter<'a> {
    /// Orient `table` for the requested pair.
    ///
    /// Missing namespaces default to the table's own. The pair must match the
    /// table in either direction, or name the same namespace twice.
    pub fn new(
        table: &'a RenamingTable,
        source: Option<&Namespace>,
        target: Option<&Namespace>,
        remap_locals: bool,
    ) -> Result<Self> {
        let source = source.unwrap_or(table.source_namespace()).clone();
        let target = target.unwrap_or(table.target_namespace()).clone();
        let known = [table.source_namespace(), table.target_namespace()];
        for namespace in [&source, &target] {
            if !known.contains(&namespace) {
                return Err(BobbinError::argument(format!(
                    "namespace '{namespace}' is not in the mappings ({} -> {})",
                    table.source_namespace(),
                    table.target_namespace()
                )));
            }
        }

        let oriented = if source == target {
            debug!("Source and target are both '{}', nothing to rename", source);
            Cow::Owned(RenamingTable::new(source.clone(), target.clone()))
        } else if &source == table.source_namespace() {
            Cow::Borrowed(table)
        } else {
            if remap_locals && table.has_local_names() {
                warn!(
                    "Parameter and local variable names are unavailable when remapping {} -> {}",
                    source, target
                );
            }
            Cow::Owned(reverse(table)?)
        };

        Ok(Self {
            table: oriented,
            source,
            target,
            remap_locals,
        })
    }

    /// Namespace names are read in
    pub fn source(&self) -> &Namespace {
        &self.source
    }

    /// Namespace names are written in
    pub fn target(&self) -> &Namespace {
        &self.target
    }

    /// Report every rename to `acceptor`
    pub fn apply(&self, acceptor: &mut dyn MappingAcceptor) {
        for (class_name, class) in self.table.classes() {
            acceptor.accept_class(class_name, class.target.as_deref().unwrap_or(class_name));

            for (key, field) in &class.fields {
                acceptor.accept_field(
                    MemberRef::new(class_name, &key.name, &key.descriptor),
                    field.target.as_deref().unwrap_or(key.name.as_str()),
                );
            }

            for (key, method) in &class.methods {
                let member = MemberRef::new(class_name, &key.name, &key.descriptor);
                acceptor.accept_method(member.clone(), method.target.as_deref().unwrap_or(key.name.as_str()));
                if !self.remap_locals {
                    continue;
                }
                for (lv_index, parameter) in &method.parameters {
                    if let Some(name) = parameter.target.as_deref().filter(|name| is_valid_local_name(name)) {
                        acceptor.accept_parameter(&member, *lv_index, name);
                    }
                }
                for local in &method.locals {
                    if let Some(name) = local.target.as_deref().filter(|name| is_valid_local_name(name)) {
                        let slot = LocalSlot {
                            lv_index: local.lv_index,
                            start_offset: local.start_offset,
                            lvt_row_index: local.lvt_row_index,
                        };
                        acceptor.accept_local(&member, slot, name);
                    }
                }
            }
        }
    }

    /// Collect every rename into a [`RemapPlan`]
    pub fn plan(&self) -> RemapPlan {
        let mut plan = RemapPlan::default();
        self.apply(&mut plan);
        plan
    }
}

/// Names of the form `$$<digits>` are placeholders generated by decompilers
pub fn is_valid_local_name(name: &str) -> bool {
    match name.strip_prefix("$$") {
        Some(rest) => rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()),
        None => !name.is_empty(),
    }
}

/// Every rename of one remap, collected in deterministic order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapPlan {
    /// Class renames
    pub classes: BTreeMap<String, String>,
    /// Field renames
    pub fields: BTreeMap<MemberRef, String>,
    /// Method renames
    pub methods: BTreeMap<MemberRef, String>,
    /// Parameter renames
    pub parameters: BTreeMap<(MemberRef, u16), String>,
    /// Local-variable renames
    pub locals: BTreeMap<(MemberRef, LocalSlot), String>,
}

impl RemapPlan {
    /// Target name of a class, or the name itself
    pub fn map_class<'a>(&'a self, name: &'a str) -> &'a str {
        self.classes.get(name).map_or(name, String::as_str)
    }

    /// Number of classes whose name changes
    pub fn renamed_classes(&self) -> usize {
        self.classes
            .iter()
            .filter(|(source, target)| source != target)
            .count()
    }
}

impl MappingAcceptor for RemapPlan {
    fn accept_class(&mut self, source_name: &str, target_name: &str) {
        self.classes
            .insert(source_name.to_string(), target_name.to_string());
    }

    fn accept_field(&mut self, field: MemberRef, target_name: &str) {
        self.fields.insert(field, target_name.to_string());
    }

    fn accept_method(&mut self, method: MemberRef, target_name: &str) {
        self.methods.insert(method, target_name.to_string());
    }

    fn accept_parameter(&mut self, method: &MemberRef, lv_index: u16, target_name: &str) {
        self.parameters
            .insert((method.clone(), lv_index), target_name.to_string());
    }

    fn accept_local(&mut self, method: &MemberRef, slot: LocalSlot, target_name: &str) {
        self.locals
            .insert((method.clone(), slot), target_name.to_string());
    }
}
