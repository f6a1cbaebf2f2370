//! Integration tests for the `bobbin` and `bobbin-remap` binaries.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

use bobbin_rs::io::archive::{read_entries, write_archive, ArchiveEntry};

const MAPPINGS: &str = "tiny\t2\t0\tofficial\tnamed\n\
c\ta\tnet/Widget\n\
\tf\tI\tb\tcount\n\
c\tc\t\n";

fn bobbin_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bobbin").unwrap();
    cmd.current_dir(dir);
    cmd
}

fn remap_cmd() -> Command {
    Command::cargo_bin("bobbin-remap").unwrap()
}

fn write_input(dir: &Path) {
    fs::write(dir.join("mappings.tiny"), MAPPINGS).unwrap();
    write_archive(
        &dir.join("in.jar"),
        vec![
            ArchiveEntry::new("a.class", vec![0xCA, 0xFE, 0xBA, 0xBE]),
            ArchiveEntry::new("c.class", vec![0xCA, 0xFE]),
            ArchiveEntry::new("assets/lang.json", b"{}".to_vec()),
            ArchiveEntry::new("META-INF/SIGNER.RSA", vec![1]),
        ],
    )
    .unwrap();
}

fn entry_names(path: &Path) -> Vec<String> {
    read_entries(path)
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}

#[test]
fn test_renamer_requires_mappings_argument() {
    let dir = tempdir().unwrap();
    let args = dir.path().join("args.txt");
    fs::write(&args, "--output\nout.jar\n--input\nin.jar\n").unwrap();

    remap_cmd()
        .arg(&args)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--mappings"));
}

#[test]
fn test_renamer_rejects_unknown_flag() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    let args = dir.path().join("args.txt");
    fs::write(
        &args,
        format!(
            "--mappings\n{}\n--input\n{}\n--output\n{}\n--frobnicate\nyes\n",
            dir.path().join("mappings.tiny").display(),
            dir.path().join("in.jar").display(),
            dir.path().join("out.jar").display()
        ),
    )
    .unwrap();

    remap_cmd()
        .arg(&args)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--frobnicate"));
    assert!(!dir.path().join("out.jar").exists());
}

#[test]
fn test_renamer_missing_input_fails() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    let args = dir.path().join("args.txt");
    fs::write(
        &args,
        format!(
            "--mappings\n{}\n--input\n{}\n--output\n{}\n",
            dir.path().join("mappings.tiny").display(),
            dir.path().join("absent.jar").display(),
            dir.path().join("out.jar").display()
        ),
    )
    .unwrap();

    remap_cmd().arg(&args).assert().code(1);
}

#[test]
fn test_renamer_writes_relocated_archive() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    let args = dir.path().join("args.txt");
    fs::write(
        &args,
        format!(
            "--mappings\n{}\n--input\n{}\n--output\n{}\n--remap-locals\nFALSE\n",
            dir.path().join("mappings.tiny").display(),
            dir.path().join("in.jar").display(),
            dir.path().join("out.jar").display()
        ),
    )
    .unwrap();

    remap_cmd().arg(&args).assert().success();
    assert_eq!(
        entry_names(&dir.path().join("out.jar")),
        vec!["assets/lang.json", "c.class", "net/Widget.class"]
    );
}

#[test]
fn test_print_default_config() {
    let dir = tempdir().unwrap();
    bobbin_cmd(dir.path())
        .arg("print-default-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("renamer:"))
        .stdout(predicate::str::contains("remap_locals: true"));
}

#[test]
fn test_init_config_refuses_to_overwrite() {
    let dir = tempdir().unwrap();
    bobbin_cmd(dir.path())
        .args(["init-config", "--output", "bobbin.yml"])
        .assert()
        .success();
    assert!(dir.path().join("bobbin.yml").is_file());

    bobbin_cmd(dir.path())
        .args(["init-config", "--output", "bobbin.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    bobbin_cmd(dir.path())
        .args(["init-config", "--output", "bobbin.yml", "--force"])
        .assert()
        .success();
}

#[test]
fn test_validate_config_reports_bad_field() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("bad.yml"),
        "execution:\n  max_concurrency: 0\n",
    )
    .unwrap();

    bobbin_cmd(dir.path())
        .args(["validate-config", "bad.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrency"));

    fs::write(dir.path().join("good.yml"), "cache:\n  enabled: false\n").unwrap();
    bobbin_cmd(dir.path())
        .args(["validate-config", "good.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));
}

#[test]
fn test_inspect_json() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    bobbin_cmd(dir.path())
        .args(["inspect", "--mappings", "mappings.tiny", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"source\": \"official\""))
        .stdout(predicate::str::contains("\"classes\": 2"))
        .stdout(predicate::str::contains("\"fields\": 1"));
}

#[test]
fn test_resolve_reversed_to_stdout() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    bobbin_cmd(dir.path())
        .args([
            "resolve",
            "--mappings",
            "mappings.tiny",
            "--source",
            "named",
            "--target",
            "official",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("tiny\t2\t0\tnamed\tofficial\n"))
        .stdout(predicate::str::contains("c\tnet/Widget\ta\n"));
}

#[test]
fn test_resolve_rejects_unrelated_namespace() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    bobbin_cmd(dir.path())
        .args(["resolve", "--mappings", "mappings.tiny", "--target", "intermediary"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("intermediary"));
}

#[test]
fn test_resolve_structure_document_to_file() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    fs::write(
        dir.path().join("structure.yml"),
        "definitions:\n  base:\n    file: mappings.tiny\nroot:\n  reverse:\n    ref: base\n",
    )
    .unwrap();

    bobbin_cmd(dir.path())
        .args(["resolve", "--structure", "structure.yml", "-o", "out.tiny"])
        .assert()
        .success();
    let written = fs::read_to_string(dir.path().join("out.tiny")).unwrap();
    assert!(written.starts_with("tiny\t2\t0\tnamed\tofficial\n"));
}

#[test]
fn test_remap_end_to_end_with_bundled_renamer() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    let renamer = env!("CARGO_BIN_EXE_bobbin-remap");

    bobbin_cmd(dir.path())
        .args([
            "remap",
            "--mappings",
            "mappings.tiny",
            "--output",
            "out/named.jar",
            "--renamer",
            renamer,
            "--scratch-dir",
            "scratch",
            "--no-cache",
            "in.jar",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("remapped"));

    assert_eq!(
        entry_names(&dir.path().join("out/named.jar")),
        vec!["assets/lang.json", "c.class", "net/Widget.class"]
    );
    assert_eq!(fs::read_dir(dir.path().join("scratch")).unwrap().count(), 0);
}

#[test]
fn test_remap_missing_input_is_skipped() {
    let dir = tempdir().unwrap();
    write_input(dir.path());
    bobbin_cmd(dir.path())
        .args([
            "remap",
            "--mappings",
            "mappings.tiny",
            "--spec",
            "official->named",
            "--output",
            "out.jar",
            "--no-cache",
            "not-built.jar",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));
    assert!(!dir.path().join("out.jar").exists());
}
