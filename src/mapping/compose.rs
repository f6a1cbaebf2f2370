//! Composition algebra over renaming tables.
//!
//! All operations take their inputs by reference and build a new table.
//! Missing entries mean "keeps its current name", so chaining tolerates
//! partial tables at every stage.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::core::errors::{BobbinError, Result};
use crate::mapping::table::{
    remap_descriptor, ClassEntry, LocalEntry, MemberKey, MethodEntry, RenamingTable,
};

/// Compose two tables: `first` renames X to Y, `second` renames Y to Z.
///
/// The result renames X to Z. Symbols known to only one of the tables pass
/// through the other unchanged.
pub fn chain(first: &RenamingTable, second: &RenamingTable) -> RenamingTable {
    if first.target_namespace() != second.source_namespace() {
        warn!(
            "Chaining mappings whose namespaces do not line up: {} -> {} followed by {} -> {}",
            first.source_namespace(),
            first.target_namespace(),
            second.source_namespace(),
            second.target_namespace()
        );
    }

    let mut out = RenamingTable::new(
        first.source_namespace().clone(),
        second.target_namespace().clone(),
    );

    // Y-namespace class name -> X-namespace class name, for renames `first` performs
    let back: HashMap<&str, &str> = first
        .classes()
        .filter_map(|(name, class)| class.target.as_deref().map(|target| (target, name)))
        .collect();
    let to_first_source = |descriptor: &str| {
        remap_descriptor(descriptor, |name| {
            back.get(name).copied().unwrap_or(name).to_string()
        })
    };

    let mut reached: HashSet<&str> = HashSet::new();
    for (name, class) in first.classes() {
        let middle = class.target.as_deref().unwrap_or(name);
        let later = second.class(middle);
        if later.is_some() {
            reached.insert(middle);
        }
        let entry = out.insert_class(
            name,
            later
                .and_then(|next| next.target.clone())
                .or_else(|| class.target.clone()),
        );
        chain_members(first, class, later, entry, &to_first_source);
    }

    for (middle, class) in second.classes() {
        if reached.contains(middle) {
            continue;
        }
        if first.class(middle).is_some() {
            debug!(
                "Dropping '{}' from chained mappings: its name is taken by a renamed class",
                middle
            );
            continue;
        }
        let entry = out.insert_class(middle, class.target.clone());
        for (key, field) in &class.fields {
            entry.insert_field(
                MemberKey::new(key.name.clone(), to_first_source(&key.descriptor)),
                field.target.clone(),
            );
        }
        for (key, method) in &class.methods {
            entry.methods.insert(
                MemberKey::new(key.name.clone(), to_first_source(&key.descriptor)),
                method.clone(),
            );
        }
    }

    out
}

fn chain_members(
    first: &RenamingTable,
    class: &ClassEntry,
    later: Option<&ClassEntry>,
    entry: &mut ClassEntry,
    to_first_source: &dyn Fn(&str) -> String,
) {
    let mut reached_fields: HashSet<MemberKey> = HashSet::new();
    for (key, field) in &class.fields {
        let middle = MemberKey::new(
            field.target.as_deref().unwrap_or(key.name.as_str()),
            first.map_descriptor(&key.descriptor),
        );
        let next = later.and_then(|next| next.fields.get(&middle));
        let target = next
            .and_then(|next| next.target.clone())
            .or_else(|| field.target.clone());
        entry.insert_field(key.clone(), target);
        reached_fields.insert(middle);
    }

    let mut reached_methods: HashSet<MemberKey> = HashSet::new();
    for (key, method) in &class.methods {
        let middle = MemberKey::new(
            method.target.as_deref().unwrap_or(key.name.as_str()),
            first.map_descriptor(&key.descriptor),
        );
        let next = later.and_then(|next| next.methods.get(&middle));
        let mut combined = method.clone();
        if let Some(next) = next {
            combined.target = next.target.clone().or_else(|| method.target.clone());
            chain_local_names(&mut combined, next);
        }
        entry.methods.insert(key.clone(), combined);
        reached_methods.insert(middle);
    }

    let Some(later) = later else {
        return;
    };
    for (key, field) in &later.fields {
        if reached_fields.contains(key) {
            continue;
        }
        entry
            .fields
            .entry(MemberKey::new(key.name.clone(), to_first_source(&key.descriptor)))
            .or_default()
            .target = field.target.clone();
    }
    for (key, method) in &later.methods {
        if reached_methods.contains(key) {
            continue;
        }
        entry
            .methods
            .entry(MemberKey::new(key.name.clone(), to_first_source(&key.descriptor)))
            .or_insert_with(|| method.clone());
    }
}

/// Later-stage parameter and local names win; earlier ones fill the gaps.
fn chain_local_names(combined: &mut MethodEntry, next: &MethodEntry) {
    for (lv_index, parameter) in &next.parameters {
        let slot = combined.parameters.entry(*lv_index).or_default();
        if parameter.target.is_some() {
            slot.target = parameter.target.clone();
        }
        if slot.source.is_none() {
            slot.source = parameter.source.clone();
        }
    }
    for local in &next.locals {
        let existing = combined.locals.iter_mut().find(|current| {
            current.lv_index == local.lv_index && current.start_offset == local.start_offset
        });
        match existing {
            Some(current) => {
                if local.target.is_some() {
                    current.target = local.target.clone();
                }
            }
            None => {
                combined.push_local(local.clone());
            }
        }
    }
}

/// Union tables that share a namespace pair.
///
/// Each table comes with a label used in diagnostics. Two tables giving the
/// same symbol different names is a [`BobbinError::MergeConflict`]; a table
/// that lists a symbol without renaming it never conflicts.
pub fn merge(tables: &[(String, &RenamingTable)]) -> Result<RenamingTable> {
    let Some((_, head)) = tables.first() else {
        return Ok(RenamingTable::identity());
    };

    let mut out = RenamingTable::new(
        head.source_namespace().clone(),
        head.target_namespace().clone(),
    );
    let mut merger = Merger {
        labels: tables.iter().map(|(label, _)| label.as_str()).collect(),
        owners: HashMap::new(),
    };

    for (index, (label, table)) in tables.iter().enumerate() {
        if table.source_namespace() != head.source_namespace()
            || table.target_namespace() != head.target_namespace()
        {
            return Err(BobbinError::composition(format!(
                "cannot merge '{label}' ({} -> {}) with '{}' ({} -> {})",
                table.source_namespace(),
                table.target_namespace(),
                tables[0].0,
                head.source_namespace(),
                head.target_namespace()
            )));
        }
        for (name, class) in table.classes() {
            let entry = out.class_entry_mut(name);
            merger.settle(format!("class {name}"), &mut entry.target, &class.target, index)?;

            for (key, field) in &class.fields {
                let slot = entry.fields.entry(key.clone()).or_default();
                merger.settle(
                    format!("field {name}.{}:{}", key.name, key.descriptor),
                    &mut slot.target,
                    &field.target,
                    index,
                )?;
            }

            for (key, method) in &class.methods {
                let symbol = format!("method {name}.{key}");
                let slot = entry.methods.entry(key.clone()).or_default();
                merger.settle(symbol.clone(), &mut slot.target, &method.target, index)?;
                for (lv_index, parameter) in &method.parameters {
                    let current = slot.parameters.entry(*lv_index).or_default();
                    if current.source.is_none() {
                        current.source = parameter.source.clone();
                    }
                    merger.settle(
                        format!("parameter {lv_index} of {symbol}"),
                        &mut current.target,
                        &parameter.target,
                        index,
                    )?;
                }
                for local in &method.locals {
                    merge_local(&mut merger, &symbol, slot, local, index)?;
                }
            }
        }
    }

    Ok(out)
}

fn merge_local(
    merger: &mut Merger<'_>,
    method: &str,
    slot: &mut MethodEntry,
    local: &LocalEntry,
    index: usize,
) -> Result<()> {
    let symbol = format!(
        "local {}@{} of {method}",
        local.lv_index, local.start_offset
    );
    let existing = slot.locals.iter_mut().find(|current| {
        current.lv_index == local.lv_index
            && current.start_offset == local.start_offset
            && current.lvt_row_index == local.lvt_row_index
    });
    match existing {
        Some(current) => merger.settle(symbol, &mut current.target, &local.target, index),
        None => {
            if local.target.is_some() {
                merger.owners.insert(symbol, index);
            }
            slot.push_local(local.clone());
            Ok(())
        }
    }
}

struct Merger<'a> {
    labels: Vec<&'a str>,
    owners: HashMap<String, usize>,
}

impl Merger<'_> {
    fn settle(
        &mut self,
        symbol: String,
        slot: &mut Option<String>,
        incoming: &Option<String>,
        index: usize,
    ) -> Result<()> {
        match (slot.as_deref(), incoming.as_deref()) {
            (_, None) => Ok(()),
            (None, Some(name)) => {
                *slot = Some(name.to_string());
                self.owners.insert(symbol, index);
                Ok(())
            }
            (Some(current), Some(name)) if current == name => Ok(()),
            (Some(current), Some(name)) => {
                let owner = self.owners.get(&symbol).copied().unwrap_or(index);
                Err(BobbinError::MergeConflict {
                    first_source: self.labels[owner].to_string(),
                    first_target: current.to_string(),
                    second_source: self.labels[index].to_string(),
                    second_target: name.to_string(),
                    symbol,
                })
            }
        }
    }
}

/// Swap source and target of every class, field and method entry.
///
/// Parameter and local-variable entries are tied to a method body in the
/// original direction and are dropped. Tables that give two symbols the same
/// target name cannot be reversed.
pub fn reverse(table: &RenamingTable) -> Result<RenamingTable> {
    if table.has_local_names() {
        debug!(
            "Dropping parameter and local variable names while reversing {} -> {}",
            table.source_namespace(),
            table.target_namespace()
        );
    }

    let mut out = RenamingTable::new(
        table.target_namespace().clone(),
        table.source_namespace().clone(),
    );
    let mut claimed: HashMap<String, &str> = HashMap::new();

    for (name, class) in table.classes() {
        let reversed_name = class.target.as_deref().unwrap_or(name);
        if let Some(previous) = claimed.insert(reversed_name.to_string(), name) {
            return Err(non_injective(
                &format!("classes '{previous}' and '{name}'"),
                reversed_name,
            ));
        }
        let entry = out.insert_class(reversed_name, class.target.as_ref().map(|_| name.to_string()));

        for (key, field) in &class.fields {
            let reversed = MemberKey::new(
                field.target.as_deref().unwrap_or(key.name.as_str()),
                table.map_descriptor(&key.descriptor),
            );
            if entry.fields.contains_key(&reversed) {
                return Err(non_injective(&format!("fields of class '{name}'"), &reversed.to_string()));
            }
            entry.insert_field(reversed, field.target.as_ref().map(|_| key.name.clone()));
        }

        for (key, method) in &class.methods {
            let reversed = MemberKey::new(
                method.target.as_deref().unwrap_or(key.name.as_str()),
                table.map_descriptor(&key.descriptor),
            );
            if entry.methods.contains_key(&reversed) {
                return Err(non_injective(&format!("methods of class '{name}'"), &reversed.to_string()));
            }
            entry.insert_method(reversed, method.target.as_ref().map(|_| key.name.clone()));
        }
    }

    Ok(out)
}

fn non_injective(what: &str, target: &str) -> BobbinError {
    BobbinError::composition(format!(
        "cannot reverse mappings: {what} are both named '{target}' in the target namespace"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn x_to_y() -> RenamingTable {
        let mut table = RenamingTable::new("x", "y");
        let class = table.insert_class("a", Some("pkg/class_1".to_string()));
        class.insert_field(MemberKey::new("f", "La;"), Some("field_1".to_string()));
        class
            .insert_method(MemberKey::new("m", "(La;)V"), Some("method_1".to_string()))
            .insert_parameter(1, None, Some("arg1".to_string()));
        table.insert_class("b", Some("pkg/class_2".to_string()));
        table.insert_class("only_x", Some("pkg/class_3".to_string()));
        table
    }

    fn y_to_z() -> RenamingTable {
        let mut table = RenamingTable::new("y", "z");
        let class = table.insert_class("pkg/class_1", Some("pkg/Widget".to_string()));
        class.insert_field(
            MemberKey::new("field_1", "Lpkg/class_1;"),
            Some("parent".to_string()),
        );
        class
            .insert_method(
                MemberKey::new("method_1", "(Lpkg/class_1;)V"),
                Some("attach".to_string()),
            )
            .insert_parameter(1, None, Some("other".to_string()));
        class.insert_method(MemberKey::new("method_9", "()Lpkg/class_1;"), Some("self".to_string()));
        table.insert_class("pkg/class_2", None);
        table.insert_class("only_y", Some("pkg/Lonely".to_string()));
        table
    }

    #[test]
    fn test_chain_composes_through_middle_namespace() {
        let chained = chain(&x_to_y(), &y_to_z());
        assert_eq!(chained.source_namespace().as_str(), "x");
        assert_eq!(chained.target_namespace().as_str(), "z");

        assert_eq!(chained.map_class("a"), "pkg/Widget");
        assert_eq!(chained.map_field("a", "f", "La;"), "parent");
        assert_eq!(chained.map_method("a", "m", "(La;)V"), "attach");
        let method = &chained.class("a").unwrap().methods[&MemberKey::new("m", "(La;)V")];
        assert_eq!(method.parameters[&1].target.as_deref(), Some("other"));
    }

    #[test]
    fn test_chain_passes_partial_symbols_through() {
        let chained = chain(&x_to_y(), &y_to_z());
        // renamed by the first stage only
        assert_eq!(chained.map_class("b"), "pkg/class_2");
        assert_eq!(chained.map_class("only_x"), "pkg/class_3");
        // renamed by the second stage only
        assert_eq!(chained.map_class("only_y"), "pkg/Lonely");
        // member only the second stage knows, with its descriptor translated back
        assert_eq!(chained.map_method("a", "method_9", "()La;"), "self");
    }

    #[test]
    fn test_chain_with_identity_is_neutral() {
        let table = x_to_y();
        let identity = RenamingTable::new(table.target_namespace().clone(), "z");
        let chained = chain(&table, &identity);
        assert_eq!(chained.map_class("a"), "pkg/class_1");
        assert_eq!(chained.map_field("a", "f", "La;"), "field_1");
        assert_eq!(chained.stats(), table.stats());
    }

    #[test]
    fn test_merge_disjoint_tables_is_union() {
        let mut left = RenamingTable::new("x", "y");
        left.insert_class("a", Some("A".to_string()));
        let mut right = RenamingTable::new("x", "y");
        right.insert_class("b", Some("B".to_string()));

        let merged = merge(&[("left".to_string(), &left), ("right".to_string(), &right)]).unwrap();
        assert_eq!(merged.map_class("a"), "A");
        assert_eq!(merged.map_class("b"), "B");
        assert_eq!(merged.stats().classes, 2);
    }

    #[test]
    fn test_merge_fills_unrenamed_entries() {
        let mut left = RenamingTable::new("x", "y");
        left.insert_class("a", None)
            .insert_field(MemberKey::new("f", "I"), Some("count".to_string()));
        let mut right = RenamingTable::new("x", "y");
        right.insert_class("a", Some("A".to_string()));

        let merged = merge(&[("left".to_string(), &left), ("right".to_string(), &right)]).unwrap();
        assert_eq!(merged.map_class("a"), "A");
        assert_eq!(merged.map_field("a", "f", "I"), "count");
    }

    #[test]
    fn test_merge_conflict_names_symbol_and_sources() {
        let mut left = RenamingTable::new("x", "y");
        left.insert_class("a", None)
            .insert_method(MemberKey::new("m", "()V"), Some("run".to_string()));
        let mut right = RenamingTable::new("x", "y");
        right
            .insert_class("a", None)
            .insert_method(MemberKey::new("m", "()V"), Some("execute".to_string()));

        let err = merge(&[("left.tiny".to_string(), &left), ("right.tiny".to_string(), &right)])
            .unwrap_err();
        match err {
            BobbinError::MergeConflict {
                symbol,
                first_source,
                first_target,
                second_source,
                second_target,
            } => {
                assert_eq!(symbol, "method a.m()V");
                assert_eq!(first_source, "left.tiny");
                assert_eq!(first_target, "run");
                assert_eq!(second_source, "right.tiny");
                assert_eq!(second_target, "execute");
            }
            other => panic!("Expected MergeConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_rejects_mismatched_namespaces() {
        let left = RenamingTable::new("x", "y");
        let right = RenamingTable::new("y", "x");
        let err = merge(&[("l".to_string(), &left), ("r".to_string(), &right)]).unwrap_err();
        assert!(matches!(err, BobbinError::Composition { .. }));
    }

    #[test]
    fn test_merge_of_nothing_is_identity() {
        assert!(merge(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_reverse_swaps_names_and_descriptors() {
        let reversed = reverse(&x_to_y()).unwrap();
        assert_eq!(reversed.source_namespace().as_str(), "y");
        assert_eq!(reversed.target_namespace().as_str(), "x");
        assert_eq!(reversed.map_class("pkg/class_1"), "a");
        assert_eq!(reversed.map_field("pkg/class_1", "field_1", "Lpkg/class_1;"), "f");
        assert_eq!(reversed.map_method("pkg/class_1", "method_1", "(Lpkg/class_1;)V"), "m");
        assert!(!reversed.has_local_names());
    }

    #[test]
    fn test_reverse_rejects_non_injective_tables() {
        let mut table = RenamingTable::new("x", "y");
        table.insert_class("a", Some("Same".to_string()));
        table.insert_class("b", Some("Same".to_string()));
        assert!(matches!(
            reverse(&table).unwrap_err(),
            BobbinError::Composition { .. }
        ));

        let mut table = RenamingTable::new("x", "y");
        let class = table.insert_class("a", None);
        class.insert_field(MemberKey::new("f", "I"), Some("g".to_string()));
        class.insert_field(MemberKey::new("g", "I"), None);
        assert!(reverse(&table).is_err());
    }

    #[test]
    fn test_reverse_twice_restores_table_without_local_names() {
        let table = x_to_y();
        let twice = reverse(&reverse(&table).unwrap()).unwrap();
        assert_eq!(twice, table.without_local_names());
    }

    fn arbitrary_table() -> impl Strategy<Value = RenamingTable> {
        let member = (0u8..6, prop::bool::ANY, prop::sample::select(vec!["I", "()V", "(Lc1;)Lc2;"]));
        let class = (
            0u8..8,
            prop::bool::ANY,
            prop::collection::vec(member.clone(), 0..4),
            prop::collection::vec(member, 0..4),
        );
        prop::collection::vec(class, 0..8).prop_map(|classes| {
            let mut table = RenamingTable::new("left", "right");
            for (id, renamed, fields, methods) in classes {
                let name = format!("c{id}");
                let entry = table.insert_class(name.clone(), renamed.then(|| format!("Renamed{name}")));
                for (member, renamed, descriptor) in fields {
                    let member_name = format!("f{member}");
                    entry.insert_field(
                        MemberKey::new(member_name.clone(), descriptor),
                        renamed.then(|| format!("field_{member_name}")),
                    );
                }
                for (member, renamed, descriptor) in methods {
                    let member_name = format!("m{member}");
                    entry
                        .insert_method(
                            MemberKey::new(member_name.clone(), descriptor),
                            renamed.then(|| format!("method_{member_name}")),
                        )
                        .insert_parameter(0, None, Some("p".to_string()));
                }
            }
            table
        })
    }

    proptest! {
        #[test]
        fn prop_reverse_is_an_involution(table in arbitrary_table()) {
            let twice = reverse(&reverse(&table).unwrap()).unwrap();
            prop_assert_eq!(twice, table.without_local_names());
        }

        #[test]
        fn prop_merge_with_itself_is_stable(table in arbitrary_table()) {
            let merged = merge(&[("a".to_string(), &table), ("b".to_string(), &table)]).unwrap();
            prop_assert_eq!(merged, table);
        }
    }
}
