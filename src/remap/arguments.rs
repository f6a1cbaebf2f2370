//! The argument file passed to the renamer process.
//!
//! One token per line: a `--flag` followed by its value on the next line.
//! `--classpath` takes every following token up to the next flag and may
//! repeat; every other flag may appear at most once.
//!
//! ```text
//! --mappings
//! /scratch/bobbin-1a2b/mappings.tiny
//! --input
//! client.jar
//! --output
//! /scratch/bobbin-1a2b/output.jar
//! --classpath
//! libs/core.jar
//! libs/extra.jar
//! --remap-locals
//! true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::errors::{BobbinError, Result};
use crate::mapping::namespace::Namespace;

/// Flag naming the mapping table file
pub const MAPPINGS_FLAG: &str = "--mappings";
/// Flag naming the artifact to write
pub const OUTPUT_FLAG: &str = "--output";
/// Flag naming the artifact to read
pub const INPUT_FLAG: &str = "--input";
/// Repeatable flag adding a classpath entry
pub const CLASSPATH_FLAG: &str = "--classpath";
/// Flag naming the source namespace
pub const SOURCE_FLAG: &str = "--source";
/// Flag naming the target namespace
pub const TARGET_FLAG: &str = "--target";
/// Flag toggling parameter and local-variable renaming
pub const REMAP_LOCALS_FLAG: &str = "--remap-locals";
/// Flag naming a scratch directory for the renamer
pub const TMPDIR_FLAG: &str = "--tmpdir";

/// Parsed contents of an argument file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapArguments {
    /// Mapping table, a tiny file or an archive embedding one
    pub mappings: PathBuf,
    /// Artifact to write
    pub output: PathBuf,
    /// Artifact to read
    pub input: PathBuf,
    /// Libraries the input is compiled against
    pub classpath: Vec<PathBuf>,
    /// Source namespace; the table's own when absent
    pub source: Option<Namespace>,
    /// Target namespace; the table's own when absent
    pub target: Option<Namespace>,
    /// Whether parameters and locals are renamed
    pub remap_locals: bool,
    /// Scratch directory for the renamer
    pub tmpdir: Option<PathBuf>,
}

impl RemapArguments {
    /// Arguments with the required paths and default options
    pub fn new(
        mappings: impl Into<PathBuf>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mappings: mappings.into(),
            output: output.into(),
            input: input.into(),
            classpath: Vec::new(),
            source: None,
            target: None,
            remap_locals: true,
            tmpdir: None,
        }
    }

    /// Classpath without the input itself
    pub fn effective_classpath(&self) -> Vec<&Path> {
        self.classpath
            .iter()
            .filter(|entry| entry.as_path() != self.input.as_path())
            .map(PathBuf::as_path)
            .collect()
    }

    /// Serialize to argument-file tokens
    pub fn to_lines(&self) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(14 + self.classpath.len());
        push_flag(&mut lines, MAPPINGS_FLAG, &[path_token(&self.mappings)?])?;
        push_flag(&mut lines, INPUT_FLAG, &[path_token(&self.input)?])?;
        push_flag(&mut lines, OUTPUT_FLAG, &[path_token(&self.output)?])?;
        let classpath = self
            .effective_classpath()
            .into_iter()
            .map(path_token)
            .collect::<Result<Vec<_>>>()?;
        if !classpath.is_empty() {
            push_flag(&mut lines, CLASSPATH_FLAG, &classpath)?;
        }
        if let Some(source) = &self.source {
            push_flag(&mut lines, SOURCE_FLAG, &[source.as_str()])?;
        }
        if let Some(target) = &self.target {
            push_flag(&mut lines, TARGET_FLAG, &[target.as_str()])?;
        }
        let remap_locals = if self.remap_locals { "true" } else { "false" };
        push_flag(&mut lines, REMAP_LOCALS_FLAG, &[remap_locals])?;
        if let Some(tmpdir) = &self.tmpdir {
            push_flag(&mut lines, TMPDIR_FLAG, &[path_token(tmpdir)?])?;
        }
        Ok(lines)
    }

    /// Write the argument file
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut content = self.to_lines()?.join("\n");
        content.push('\n');
        fs::write(path, content).map_err(|e| {
            BobbinError::io(format!("Failed to write argument file: {}", path.display()), e)
        })
    }

    /// Read and parse an argument file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BobbinError::argument(format!(
                "cannot read argument file {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(content.lines())
    }

    /// Parse argument-file tokens.
    ///
    /// Only the tokens are inspected; none of the named paths are touched.
    pub fn parse<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mappings = None;
        let mut output = None;
        let mut input = None;
        let mut classpath = Vec::new();
        let mut source = None;
        let mut target = None;
        let mut remap_locals = None;
        let mut tmpdir = None;

        let mut collecting_classpath = false;
        let mut tokens = tokens.into_iter();
        while let Some(token) = tokens.next() {
            let token = token.as_ref().trim_end_matches('\r');
            if token.trim().is_empty() {
                continue;
            }
            if !token.starts_with("--") {
                if collecting_classpath {
                    classpath.push(PathBuf::from(token));
                    continue;
                }
                return Err(BobbinError::argument(format!(
                    "unexpected token '{token}' without a preceding flag"
                )));
            }
            collecting_classpath = token == CLASSPATH_FLAG;
            let value = tokens
                .next()
                .map(|value| value.as_ref().trim_end_matches('\r').to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| BobbinError::argument(format!("missing value for {token}")))?;

            match token {
                MAPPINGS_FLAG => set_once(&mut mappings, token, PathBuf::from(value))?,
                OUTPUT_FLAG => set_once(&mut output, token, PathBuf::from(value))?,
                INPUT_FLAG => set_once(&mut input, token, PathBuf::from(value))?,
                CLASSPATH_FLAG => classpath.push(PathBuf::from(value)),
                SOURCE_FLAG => set_once(&mut source, token, Namespace::from(value))?,
                TARGET_FLAG => set_once(&mut target, token, Namespace::from(value))?,
                REMAP_LOCALS_FLAG => set_once(&mut remap_locals, token, parse_bool(&value)?)?,
                TMPDIR_FLAG => set_once(&mut tmpdir, token, PathBuf::from(value))?,
                unknown => {
                    return Err(BobbinError::argument(format!("unknown flag '{unknown}'")));
                }
            }
        }

        let missing: Vec<&str> = [
            (mappings.is_none(), MAPPINGS_FLAG),
            (output.is_none(), OUTPUT_FLAG),
            (input.is_none(), INPUT_FLAG),
        ]
        .into_iter()
        .filter_map(|(absent, flag)| absent.then_some(flag))
        .collect();
        let (Some(mappings), Some(output), Some(input)) = (mappings, output, input) else {
            return Err(BobbinError::argument(format!(
                "missing required {}",
                missing.join(", ")
            )));
        };

        let mut arguments = Self {
            mappings,
            output,
            input,
            classpath,
            source,
            target,
            remap_locals: remap_locals.unwrap_or(true),
            tmpdir,
        };
        let before = arguments.classpath.len();
        let input = arguments.input.clone();
        arguments.classpath.retain(|entry| *entry != input);
        if arguments.classpath.len() != before {
            debug!(
                "Removed the input {} from the classpath",
                arguments.input.display()
            );
        }
        Ok(arguments)
    }
}

/// A flag followed by its values, each on its own line
fn push_flag(lines: &mut Vec<String>, flag: &str, values: &[&str]) -> Result<()> {
    for value in values {
        if value.is_empty() || value.contains(['\n', '\r']) || value.starts_with("--") {
            return Err(BobbinError::argument(format!(
                "value {value:?} for {flag} cannot be written to an argument file"
            )));
        }
    }
    lines.push(flag.to_string());
    lines.extend(values.iter().map(|value| (*value).to_string()));
    Ok(())
}

fn set_once<T>(slot: &mut Option<T>, flag: &str, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(BobbinError::argument(format!("{flag} given more than once")));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(BobbinError::argument(format!(
            "{REMAP_LOCALS_FLAG} expects true or false, got '{value}'"
        )))
    }
}

fn path_token(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        BobbinError::argument(format!("path is not valid UTF-8: {}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> RemapArguments {
        let mut arguments = RemapArguments::new("maps.tiny", "in.jar", "out.jar");
        arguments.classpath = vec![PathBuf::from("lib/a.jar"), PathBuf::from("lib/b.jar")];
        arguments.source = Some(Namespace::from("official"));
        arguments.target = Some(Namespace::from("named"));
        arguments.remap_locals = false;
        arguments.tmpdir = Some(PathBuf::from("/tmp/scratch"));
        arguments
    }

    #[test]
    fn test_lines_parse_back() {
        let arguments = full();
        let lines = arguments.to_lines().unwrap();
        assert_eq!(&lines[..2], ["--mappings", "maps.tiny"]);
        assert_eq!(RemapArguments::parse(&lines).unwrap(), arguments);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.txt");
        full().write_file(&path).unwrap();
        assert_eq!(RemapArguments::from_file(&path).unwrap(), full());
    }

    #[test]
    fn test_missing_mappings_is_an_argument_error() {
        // in.jar does not exist; the error must come from the tokens alone
        let err = RemapArguments::parse(["--output", "out.jar", "--input", "in.jar"]).unwrap_err();
        assert!(err.is_argument_error());
        assert!(err.to_string().contains("--mappings"));
    }

    #[test]
    fn test_defaults() {
        let arguments =
            RemapArguments::parse(["--mappings", "m.tiny", "--input", "i.jar", "--output", "o.jar"])
                .unwrap();
        assert!(arguments.remap_locals);
        assert!(arguments.source.is_none());
        assert!(arguments.target.is_none());
        assert!(arguments.classpath.is_empty());
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        let base = ["--mappings", "m.tiny", "--input", "i.jar", "--output", "o.jar"];
        let with = |extra: &[&str]| {
            let tokens: Vec<&str> = base.iter().chain(extra).copied().collect();
            RemapArguments::parse(tokens)
        };
        assert!(with(&["--verbose", "yes"]).unwrap_err().is_argument_error());
        assert!(with(&["stray"]).unwrap_err().is_argument_error());
        assert!(with(&["--source"]).unwrap_err().is_argument_error());
        assert!(with(&["--input", "again.jar"]).unwrap_err().is_argument_error());
        assert!(with(&["--remap-locals", "maybe"]).unwrap_err().is_argument_error());
        assert!(!with(&["--remap-locals", "FALSE"]).unwrap().remap_locals);
    }

    #[test]
    fn test_classpath_self_reference_is_removed() {
        let arguments = RemapArguments::parse([
            "--mappings", "m.tiny",
            "--input", "game.jar",
            "--output", "o.jar",
            "--classpath", "lib/x.jar",
            "--classpath", "game.jar",
            "--classpath", "lib/y.jar",
        ])
        .unwrap();
        assert_eq!(
            arguments.classpath,
            vec![PathBuf::from("lib/x.jar"), PathBuf::from("lib/y.jar")]
        );

        let mut host = RemapArguments::new("m.tiny", "game.jar", "o.jar");
        host.classpath = vec![PathBuf::from("game.jar"), PathBuf::from("lib/x.jar")];
        let lines = host.to_lines().unwrap();
        assert_eq!(lines.iter().filter(|line| *line == "game.jar").count(), 1);
        assert!(lines.contains(&"lib/x.jar".to_string()));
    }

    #[test]
    fn test_classpath_takes_every_value_up_to_the_next_flag() {
        let arguments = RemapArguments::parse([
            "--mappings", "m.tiny",
            "--classpath", "lib/a.jar", "lib/b.jar", "",
            "lib/c.jar",
            "--input", "i.jar",
            "--classpath", "lib/d.jar",
            "--output", "o.jar",
        ])
        .unwrap();
        assert_eq!(
            arguments.classpath,
            vec![
                PathBuf::from("lib/a.jar"),
                PathBuf::from("lib/b.jar"),
                PathBuf::from("lib/c.jar"),
                PathBuf::from("lib/d.jar"),
            ]
        );

        let lines = full().to_lines().unwrap();
        let at = lines.iter().position(|line| line == "--classpath").unwrap();
        assert_eq!(&lines[at..at + 3], ["--classpath", "lib/a.jar", "lib/b.jar"]);
        assert_eq!(lines.iter().filter(|line| *line == "--classpath").count(), 1);

        let stray = RemapArguments::parse(["--mappings", "m.tiny", "extra.jar"]).unwrap_err();
        assert!(stray.is_argument_error());
    }

    #[test]
    fn test_line_breaks_in_values_are_rejected() {
        let mut arguments = RemapArguments::new("m.tiny", "i.jar", "o.jar");
        arguments.source = Some(Namespace::from("bad\nname"));
        assert!(arguments.to_lines().unwrap_err().is_argument_error());
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let arguments = RemapArguments::parse([
            "", "--mappings", "m.tiny", "", "--input", "i.jar", "--output", "o.jar", "",
        ])
        .unwrap();
        assert_eq!(arguments.output, PathBuf::from("o.jar"));
    }
}
