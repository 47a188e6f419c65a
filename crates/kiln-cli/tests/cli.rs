//! End-to-end runs of the kiln command-line binary.

use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Output};

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

/// Test context with an isolated kiln home, a fake dependency prefix and a
/// fixture source archive.
struct TestContext {
    temp_dir: TempDir,
    kiln_home: PathBuf,
    dep: PathBuf,
    archive: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let kiln_home = temp_dir.path().join(".kiln");
        let dep = temp_dir.path().join("dep");
        std::fs::create_dir_all(dep.join("lib")).unwrap();
        std::fs::create_dir_all(&kiln_home).unwrap();
        std::fs::write(
            kiln_home.join("config.toml"),
            format!(
                "jobs = 2\n\n[dependencies.dep]\nprefix = \"{}\"\nversion = \"2.0.0\"\n",
                dep.display()
            ),
        )
        .unwrap();

        let archive = temp_dir.path().join("widget-1.0.tar.gz");
        let gz = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        let body = b"hello\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "widget-1.0/README", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        Self {
            temp_dir,
            kiln_home,
            dep,
            archive,
        }
    }

    fn kiln(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kiln"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("KILN_HOME", &self.kiln_home);
        cmd.env_remove("KILN_JOBS");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.kiln().args(args).output().expect("failed to run kiln")
    }

    fn sha256(&self) -> String {
        let out = self.run(&["hash", self.archive.to_str().unwrap()]);
        assert!(out.status.success());
        String::from_utf8_lossy(&out.stdout)
            .split_whitespace()
            .next()
            .unwrap()
            .to_string()
    }

    fn write_recipe(&self, sha256: &str) -> PathBuf {
        let path = self.temp_dir.path().join("widget.toml");
        std::fs::write(
            &path,
            format!(
                r#"
[package]
name = "widget"
version = "1.0"
description = "A test widget"

[source]
url = "file://{}"
sha256 = "{sha256}"

[[dependencies]]
name = "dep"
version = ">=2"

[[steps]]
phase = "install"
program = "sh"
args = ["-c", "cp README {{dep:dep:lib}}/X"]

[[relocations]]
from = "{{dep:dep:lib}}/X"
to = "{{lib}}/X"
"#,
                self.archive.display()
            ),
        )
        .unwrap();
        path
    }

    fn prefix(&self) -> PathBuf {
        self.kiln_home.join("cellar/widget/1.0")
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let out = ctx.run(&["--help"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let out = ctx.run(&["--version"]);
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("kiln "));
}

#[test]
fn test_hash_matches_sha256sum_format() {
    let ctx = TestContext::new();
    let file = ctx.temp_dir.path().join("abc.txt");
    std::fs::write(&file, "abc").unwrap();
    let out = ctx.run(&["hash", file.to_str().unwrap()]);
    assert!(out.status.success());
    assert_eq!(
        stdout(&out),
        format!(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  {}\n",
            file.display()
        )
    );
}

#[test]
fn test_install_relocates_from_dependency() {
    let ctx = TestContext::new();
    let recipe = ctx.write_recipe(&ctx.sha256());

    let out = ctx.run(&["install", recipe.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    assert_eq!(
        std::fs::read_to_string(ctx.prefix().join("lib/X")).unwrap(),
        "hello\n"
    );
    assert!(!ctx.dep.join("lib/X").exists());
    assert!(ctx.kiln_home.join("opt/widget/INSTALL_RECEIPT.json").is_file());

    let info = ctx.run(&["info", recipe.to_str().unwrap()]);
    assert!(info.status.success());
    assert!(stdout(&info).contains("A test widget"));
    assert!(stdout(&info).contains("dep >=2"));
}

#[test]
fn test_wrong_checksum_fails_without_side_effects() {
    let ctx = TestContext::new();
    let recipe = ctx.write_recipe(&"0".repeat(64));

    let out = ctx.run(&["install", recipe.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("checksum mismatch"));
    assert!(!ctx.prefix().exists());
    assert!(!ctx.kiln_home.join("opt").exists());
}

#[test]
fn test_dry_run_changes_nothing() {
    let ctx = TestContext::new();
    let recipe = ctx.write_recipe(&ctx.sha256());

    let out = ctx.run(&["--dry-run", "install", recipe.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("install"));
    assert!(text.contains(&format!("sh -c 'cp README {}/lib/X'", ctx.dep.display())));
    assert!(!ctx.kiln_home.join("cellar").exists());
    assert!(!ctx.kiln_home.join("cache").exists());
}

#[test]
fn test_check_reports_missing_dependency() {
    let ctx = TestContext::new();
    let recipe = ctx.write_recipe(&ctx.sha256());
    std::fs::remove_file(ctx.kiln_home.join("config.toml")).unwrap();

    let out = ctx.run(&["check", recipe.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("missing dependency: dep"));
}

#[test]
fn test_invalid_recipe_is_rejected() {
    let ctx = TestContext::new();
    let path = ctx.temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[package]\nname = \"x\"\n").unwrap();
    let out = ctx.run(&["check", path.to_str().unwrap()]);
    assert!(!out.status.success());
}

#[test]
fn test_completions() {
    let ctx = TestContext::new();
    let out = ctx.run(&["completions", "bash"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("kiln"));
}

