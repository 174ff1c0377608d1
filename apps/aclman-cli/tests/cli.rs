// cli.rs - Runs the aclman binary in dry-run mode against temporary trees.
//
// `true` stands in for getfacl/setfacl, so nothing here needs root or an
// ACL-capable filesystem.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn settings(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("aclman.toml");
    std::fs::write(&path, "getfacl = \"true\"\nsetfacl = \"true\"\nworkers = 2\n").unwrap();
    path
}

fn aclman(args: &[&str], settings: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_aclman"))
        .arg("--config")
        .arg(settings)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn dry_run_prints_would_lines() {
    let etc = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();
    std::fs::write(
        tree.path().join("..aclman"),
        "[/data/*]\nGROUP=3999999002\n",
    )
    .unwrap();
    std::fs::create_dir(tree.path().join("data")).unwrap();
    std::fs::write(tree.path().join("data/report.csv"), "").unwrap();

    let out = aclman(
        &["-Rn", tree.path().to_str().unwrap()],
        &settings(etc.path()),
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    let file = tree.path().join("data/report.csv");
    assert!(
        stdout.contains(&format!("would chown :3999999002 {}", file.display())),
        "{}",
        stdout
    );
    assert!(tree.path().join("data/report.csv").exists());
}

#[test]
fn dry_run_fails_on_unknown_group() {
    let etc = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();
    std::fs::write(
        tree.path().join("..aclman"),
        "[/data/*]\nGROUP=aclman-no-such-group\n",
    )
    .unwrap();
    std::fs::create_dir(tree.path().join("data")).unwrap();
    std::fs::write(tree.path().join("data/report.csv"), "").unwrap();

    let out = aclman(
        &["-Rn", tree.path().to_str().unwrap()],
        &settings(etc.path()),
    );
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(!stdout.contains("aclman-no-such-group"), "{}", stdout);
}

#[test]
fn json_output_has_one_line_per_object() {
    let etc = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();
    std::fs::write(tree.path().join("a"), "").unwrap();
    std::fs::write(tree.path().join("b"), "").unwrap();

    let out = aclman(
        &["-R", "--dry-run", "--json", tree.path().to_str().unwrap()],
        &settings(etc.path()),
    );
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    // the directory itself plus two files
    assert_eq!(lines.len(), 3);
    assert!(lines
        .iter()
        .all(|line| line["outcome"]["status"] == "unchanged"));
}

#[test]
fn missing_start_path_fails_the_run() {
    let etc = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();
    let out = aclman(
        &["-n", tree.path().join("gone").to_str().unwrap()],
        &settings(etc.path()),
    );
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn broken_settings_file_is_a_startup_error() {
    let etc = TempDir::new().unwrap();
    let path = etc.path().join("aclman.toml");
    std::fs::write(&path, "workers = \"many\"\n").unwrap();
    let out = aclman(&["-n", "."], &path);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("aclman.toml"));
}
