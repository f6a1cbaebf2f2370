//! Reader and writer for the persisted mapping-table format (tiny v2).
//!
//! ```text
//! tiny	2	0	official	named
//! 	escaped-names
//! c	a	com/example/Foo
//! 	f	I	b	counter
//! 	m	(La;)V	c	update
//! 		p	1		other
//! 		v	2	4	-1		tmp
//! ```
//!
//! Lines are tab separated, nesting is expressed by leading tabs and every
//! entry is tagged by kind (`c` class, `f` field, `m` method, `p` parameter,
//! `v` local variable). Descriptors are written in the first namespace.
//! Comments are accepted and dropped; unknown entry kinds are skipped together
//! with everything nested below them.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::core::errors::{BobbinError, Result};
use crate::io::staging;
use crate::mapping::namespace::Namespace;
use crate::mapping::table::{remap_descriptor, LocalEntry, MemberKey, RenamingTable};

const HEADER_MAGIC: &str = "tiny";
const MAJOR_VERSION: &str = "2";
const ESCAPED_NAMES: &str = "escaped-names";

/// A parsed tiny file with all of its namespace columns
#[derive(Debug, Clone)]
pub struct TinyDocument {
    namespaces: Vec<Namespace>,
    classes: Vec<RawClass>,
}

#[derive(Debug, Clone)]
struct RawClass {
    names: Vec<String>,
    fields: Vec<RawMember>,
    methods: Vec<RawMember>,
}

#[derive(Debug, Clone)]
struct RawMember {
    descriptor: String,
    names: Vec<String>,
    parameters: Vec<(u16, Vec<String>)>,
    locals: Vec<RawLocal>,
}

#[derive(Debug, Clone)]
struct RawLocal {
    lv_index: u16,
    start_offset: u32,
    lvt_row_index: Option<u32>,
    names: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum LastMember {
    Field,
    Method,
}

struct LineParser<'a> {
    origin: &'a str,
    line: usize,
}

impl LineParser<'_> {
    fn error(&self, message: impl Into<String>) -> BobbinError {
        BobbinError::mapping_load_at(message, self.origin, Some(self.line))
    }

    fn column<'c>(&self, columns: &[&'c str], index: usize, what: &str) -> Result<&'c str> {
        columns
            .get(index)
            .copied()
            .ok_or_else(|| self.error(format!("missing {what}")))
    }

    fn number<T: std::str::FromStr>(&self, columns: &[&str], index: usize, what: &str) -> Result<T> {
        let raw = self.column(columns, index, what)?;
        raw.parse()
            .map_err(|_| self.error(format!("invalid {what} '{raw}'")))
    }
}

impl TinyDocument {
    /// Parse a tiny v2 document. `origin` names the source in diagnostics.
    pub fn parse(reader: impl BufRead, origin: &str) -> Result<Self> {
        let mut lines = reader.lines().enumerate();
        let mut cursor = LineParser { origin, line: 0 };

        let header = loop {
            match lines.next() {
                Some((index, line)) => {
                    cursor.line = index + 1;
                    let line = line.map_err(|e| cursor.error(format!("unreadable: {e}")))?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(cursor.error("empty mapping file")),
            }
        };

        let header_columns: Vec<&str> = header.trim_end_matches('\r').split('\t').collect();
        if header_columns.first() != Some(&HEADER_MAGIC) || header_columns.get(1) != Some(&MAJOR_VERSION)
        {
            return Err(cursor.error("not a tiny v2 mapping file"));
        }
        let namespaces: Vec<Namespace> = header_columns
            .iter()
            .skip(3)
            .map(|name| Namespace::new(name))
            .collect();
        if namespaces.len() < 2 {
            return Err(cursor.error("header must declare at least two namespaces"));
        }

        let width = namespaces.len();
        let mut escaped = false;
        let mut in_header = true;
        let mut skip_below: Option<usize> = None;
        let mut classes: Vec<RawClass> = Vec::new();
        let mut last_member: Option<LastMember> = None;

        for (index, line) in lines {
            cursor.line = index + 1;
            let line = line.map_err(|e| cursor.error(format!("unreadable: {e}")))?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let indent = line.chars().take_while(|c| *c == '\t').count();
            if let Some(depth) = skip_below {
                if indent > depth {
                    continue;
                }
                skip_below = None;
            }
            let columns: Vec<&str> = line[indent..].split('\t').collect();
            let kind = columns[0];

            if in_header && indent == 1 && !matches!(kind, "f" | "m") {
                if kind == ESCAPED_NAMES {
                    escaped = true;
                }
                continue;
            }
            in_header = false;

            let names_from = |start: usize| -> Vec<String> {
                (0..width)
                    .map(|i| {
                        let raw = columns.get(start + i).copied().unwrap_or("");
                        if escaped {
                            unescape(raw)
                        } else {
                            raw.to_string()
                        }
                    })
                    .collect()
            };

            match (indent, kind) {
                (0, "c") => {
                    let names = names_from(1);
                    if names[0].is_empty() {
                        return Err(cursor.error("class entry without a name"));
                    }
                    classes.push(RawClass {
                        names,
                        fields: Vec::new(),
                        methods: Vec::new(),
                    });
                    last_member = None;
                }
                (1, "f" | "m") => {
                    let class = classes
                        .last_mut()
                        .ok_or_else(|| cursor.error("member entry outside of a class"))?;
                    let raw = cursor.column(&columns, 1, "descriptor")?;
                    let descriptor = if escaped { unescape(raw) } else { raw.to_string() };
                    let member = RawMember {
                        descriptor,
                        names: names_from(2),
                        parameters: Vec::new(),
                        locals: Vec::new(),
                    };
                    if member.names[0].is_empty() {
                        return Err(cursor.error("member entry without a name"));
                    }
                    if kind == "f" {
                        class.fields.push(member);
                        last_member = Some(LastMember::Field);
                    } else {
                        class.methods.push(member);
                        last_member = Some(LastMember::Method);
                    }
                }
                (2, "p" | "v") => {
                    let method = match last_member {
                        Some(LastMember::Method) => classes
                            .last_mut()
                            .and_then(|class| class.methods.last_mut()),
                        _ => None,
                    }
                    .ok_or_else(|| cursor.error(format!("'{kind}' entry outside of a method")))?;
                    let lv_index = cursor.number(&columns, 1, "local variable index")?;
                    if kind == "p" {
                        method.parameters.push((lv_index, names_from(2)));
                    } else {
                        let start_offset = cursor.number(&columns, 2, "local variable start offset")?;
                        let row: i64 = cursor.number(&columns, 3, "local variable table index")?;
                        method.locals.push(RawLocal {
                            lv_index,
                            start_offset,
                            lvt_row_index: u32::try_from(row).ok(),
                            names: names_from(4),
                        });
                    }
                }
                (_, "c") if indent > 0 => {}
                _ => {
                    debug!(
                        "Skipping unknown tiny entry '{}' at {}:{}",
                        kind, origin, cursor.line
                    );
                    skip_below = Some(indent);
                }
            }
        }

        Ok(Self { namespaces, classes })
    }

    /// Declared namespaces, in column order
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    fn column_of(&self, namespace: &Namespace) -> Result<usize> {
        self.namespaces
            .iter()
            .position(|candidate| candidate == namespace)
            .ok_or_else(|| {
                BobbinError::mapping_load(format!(
                    "namespace '{namespace}' is not declared (available: {})",
                    join_namespaces(&self.namespaces)
                ))
            })
    }

    /// Build the table renaming `source` names into `target` names
    pub fn project(&self, source: &Namespace, target: &Namespace) -> Result<RenamingTable> {
        let src = self.column_of(source)?;
        let dst = self.column_of(target)?;

        let to_source: HashMap<&str, &str> = if src == 0 {
            HashMap::new()
        } else {
            self.classes
                .iter()
                .map(|class| (class.names[0].as_str(), pick(&class.names, src)))
                .collect()
        };
        let convert = |descriptor: &str| -> String {
            if src == 0 {
                descriptor.to_string()
            } else {
                remap_descriptor(descriptor, |name| {
                    to_source.get(name).copied().unwrap_or(name).to_string()
                })
            }
        };

        let mut table = RenamingTable::new(source.clone(), target.clone());
        for class in &self.classes {
            let entry = table.insert_class(pick(&class.names, src), present(&class.names, dst));
            for field in &class.fields {
                entry.insert_field(
                    MemberKey::new(pick(&field.names, src), convert(&field.descriptor)),
                    present(&field.names, dst),
                );
            }
            for method in &class.methods {
                let mapped = entry.insert_method(
                    MemberKey::new(pick(&method.names, src), convert(&method.descriptor)),
                    present(&method.names, dst),
                );
                for (lv_index, names) in &method.parameters {
                    mapped.insert_parameter(*lv_index, present(names, src), present(names, dst));
                }
                for local in &method.locals {
                    mapped.push_local(LocalEntry {
                        lv_index: local.lv_index,
                        start_offset: local.start_offset,
                        lvt_row_index: local.lvt_row_index,
                        source: present(&local.names, src),
                        target: present(&local.names, dst),
                    });
                }
            }
        }
        Ok(table)
    }

    /// Build the table between the two declared namespaces.
    ///
    /// Files with more than two namespaces must be projected explicitly.
    pub fn into_table(self) -> Result<RenamingTable> {
        if self.namespaces.len() != 2 {
            return Err(BobbinError::mapping_load(format!(
                "expected exactly two namespaces, found {} ({}); select a source and target namespace",
                self.namespaces.len(),
                join_namespaces(&self.namespaces)
            )));
        }
        self.project(&self.namespaces[0], &self.namespaces[1])
    }
}

fn join_namespaces(namespaces: &[Namespace]) -> String {
    namespaces
        .iter()
        .map(Namespace::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name in `column`, falling back to the first column when it is empty
fn pick(names: &[String], column: usize) -> &str {
    match names[column].as_str() {
        "" => names[0].as_str(),
        name => name,
    }
}

fn present(names: &[String], column: usize) -> Option<String> {
    Some(names[column].as_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Parse a two-namespace tiny table from a reader
pub fn read_tiny(reader: impl BufRead, origin: &str) -> Result<RenamingTable> {
    TinyDocument::parse(reader, origin)?
        .into_table()
        .map_err(|e| e.with_mapping_path(origin))
}

/// Parse a two-namespace tiny table from a string
pub fn parse_tiny_str(text: &str, origin: &str) -> Result<RenamingTable> {
    read_tiny(text.as_bytes(), origin)
}

/// Load a two-namespace tiny table from disk
pub fn read_tiny_file(path: &Path) -> Result<RenamingTable> {
    open_document(path)?
        .into_table()
        .map_err(|e| e.with_mapping_path(path.display().to_string()))
}

/// Load a tiny table from disk, projected onto a namespace pair
pub fn read_tiny_file_projected(
    path: &Path,
    source: &Namespace,
    target: &Namespace,
) -> Result<RenamingTable> {
    open_document(path)?
        .project(source, target)
        .map_err(|e| e.with_mapping_path(path.display().to_string()))
}

fn open_document(path: &Path) -> Result<TinyDocument> {
    let origin = path.display().to_string();
    let file = fs::File::open(path)
        .map_err(|e| BobbinError::mapping_load_at(format!("cannot open file: {e}"), &origin, None))?;
    TinyDocument::parse(BufReader::new(file), &origin)
}

/// Serialize a table in tiny v2 form
pub fn write_tiny(table: &RenamingTable, writer: impl Write) -> Result<()> {
    let mut out = BufWriter::new(writer);
    let escaped = needs_escaping(table);
    let name = |value: &str| -> String {
        if escaped {
            escape(value)
        } else {
            value.to_string()
        }
    };
    let target = |value: &Option<String>| -> String { value.as_deref().map(&name).unwrap_or_default() };

    writeln!(
        out,
        "{HEADER_MAGIC}\t{MAJOR_VERSION}\t0\t{}\t{}",
        table.source_namespace(),
        table.target_namespace()
    )?;
    if escaped {
        writeln!(out, "\t{ESCAPED_NAMES}")?;
    }
    for (class_name, class) in table.classes() {
        writeln!(out, "c\t{}\t{}", name(class_name), target(&class.target))?;
        for (key, field) in &class.fields {
            writeln!(
                out,
                "\tf\t{}\t{}\t{}",
                name(&key.descriptor),
                name(&key.name),
                target(&field.target)
            )?;
        }
        for (key, method) in &class.methods {
            writeln!(
                out,
                "\tm\t{}\t{}\t{}",
                name(&key.descriptor),
                name(&key.name),
                target(&method.target)
            )?;
            for (lv_index, parameter) in &method.parameters {
                writeln!(
                    out,
                    "\t\tp\t{lv_index}\t{}\t{}",
                    target(&parameter.source),
                    target(&parameter.target)
                )?;
            }
            for local in &method.locals {
                let row = local.lvt_row_index.map_or(-1, i64::from);
                writeln!(
                    out,
                    "\t\tv\t{}\t{}\t{row}\t{}\t{}",
                    local.lv_index,
                    local.start_offset,
                    target(&local.source),
                    target(&local.target)
                )?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Write a table to disk, replacing the destination atomically
pub fn write_tiny_file(table: &RenamingTable, path: &Path) -> Result<()> {
    let mut staged = staging::stage_for(path)?;
    write_tiny(table, staged.as_file_mut())?;
    staging::publish(staged, path)
}

fn needs_escaping(table: &RenamingTable) -> bool {
    let special = |value: &str| value.contains(['\\', '\n', '\r', '\t', '\0']);
    let special_opt = |value: &Option<String>| value.as_deref().is_some_and(special);
    table.classes().any(|(name, class)| {
        special(name)
            || special_opt(&class.target)
            || class
                .fields
                .iter()
                .any(|(key, field)| special(&key.name) || special(&key.descriptor) || special_opt(&field.target))
            || class.methods.iter().any(|(key, method)| {
                special(&key.name)
                    || special(&key.descriptor)
                    || special_opt(&method.target)
                    || method
                        .parameters
                        .values()
                        .any(|p| special_opt(&p.source) || special_opt(&p.target))
                    || method
                        .locals
                        .iter()
                        .any(|l| special_opt(&l.source) || special_opt(&l.target))
            })
    })
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
