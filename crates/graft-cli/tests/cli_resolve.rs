use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn manifest(name: &str, deps: &[(&str, &str)]) -> String {
    let mut toml = format!("[package]\nname = \"{name}\"\n");
    for (dep, req) in deps {
        toml.push_str(&format!(
            "\n[[dependencies]]\nurl = \"https://example.com/{dep}\"\nversion = \"{req}\"\n"
        ));
    }
    toml.push_str(&format!("\n[[targets]]\nname = \"{name}\"\n"));
    if let Some((dep, _)) = deps.first() {
        toml.push_str(&format!(
            "products = [{{ package = \"{dep}\", product = \"{dep}\" }}]\n"
        ));
    }
    toml.push_str(&format!(
        "\n[[products]]\nname = \"{name}\"\ntargets = [\"{name}\"]\n"
    ));
    toml
}

/// A registry with `json` 1.0.0 / 1.2.0 / 2.0.0 and a project requiring `json` 1.x.
fn setup() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let registry = tmp.path().join("registry");
    let project = tmp.path().join("app");
    for version in ["1.0.0", "1.2.0", "2.0.0"] {
        write(
            &registry.join("json").join(version).join("Graft.toml"),
            &manifest("json", &[]),
        );
    }
    write(
        &project.join("Graft.toml"),
        &manifest("app", &[("json", "1.0.0..<2.0.0")]),
    );
    (tmp, registry, project)
}

fn graft_cmd(home: &Path, registry: &Path) -> Command {
    let mut cmd = Command::cargo_bin("graft").unwrap();
    cmd.env("HOME", home)
        .env_remove("GRAFT_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--registry")
        .arg(registry);
    cmd
}

#[test]
fn test_resolve_writes_pin_file() {
    let (tmp, registry, project) = setup();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .arg("resolve")
        .assert()
        .success()
        .stderr(predicate::str::contains("Resolved"));

    let pins = fs::read_to_string(project.join("Graft.resolved")).unwrap();
    assert!(pins.contains("version = 1"));
    assert!(pins.contains("example.com/json"));
    assert!(pins.contains("1.2.0"));
}

#[test]
fn test_resolve_from_subdirectory() {
    let (tmp, registry, project) = setup();
    let nested = project.join("src").join("deep");
    fs::create_dir_all(&nested).unwrap();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&nested)
        .arg("resolve")
        .assert()
        .success();

    assert!(project.join("Graft.resolved").is_file());
}

#[test]
fn test_resolve_finds_version_specific_manifest() {
    let (tmp, registry, project) = setup();
    fs::rename(project.join("Graft.toml"), project.join("Graft@0.1.0.toml")).unwrap();
    let nested = project.join("src");
    fs::create_dir_all(&nested).unwrap();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&nested)
        .arg("resolve")
        .assert()
        .success();

    let pins = fs::read_to_string(project.join("Graft.resolved")).unwrap();
    assert!(pins.contains("1.2.0"));
}

#[test]
fn test_show_dependencies_text_and_json() {
    let (tmp, registry, project) = setup();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .arg("show-dependencies")
        .assert()
        .success()
        .stdout(predicate::str::contains("└── json 1.2.0"));

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .args(["show-dependencies", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": \"1.2.0\""));
}

#[test]
fn test_show_dependencies_rejects_unknown_format() {
    let (tmp, registry, project) = setup();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .args(["show-dependencies", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("yaml"));
}

#[test]
fn test_describe_lists_modules() {
    let (tmp, registry, project) = setup();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .arg("describe")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. json [library] json 1.2.0"))
        .stdout(predicate::str::contains("2. app [executable]").not())
        .stdout(predicate::str::contains("2. app [library] app"));
}

#[test]
fn test_update_after_new_release() {
    let (tmp, registry, project) = setup();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .arg("resolve")
        .assert()
        .success();

    write(
        &registry.join("json").join("1.3.0").join("Graft.toml"),
        &manifest("json", &[]),
    );

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .arg("resolve")
        .assert()
        .success();
    let pins = fs::read_to_string(project.join("Graft.resolved")).unwrap();
    assert!(pins.contains("1.2.0"));

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .arg("update")
        .assert()
        .success()
        .stderr(predicate::str::contains("1.2.0 -> 1.3.0"));
    let pins = fs::read_to_string(project.join("Graft.resolved")).unwrap();
    assert!(pins.contains("1.3.0"));
}

#[test]
fn test_locked_without_pins_fails() {
    let (tmp, registry, project) = setup();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .args(["--locked", "resolve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no pin recorded"));

    assert!(!project.join("Graft.resolved").exists());
}

#[test]
fn test_unsatisfiable_requirement_fails() {
    let (tmp, registry, project) = setup();
    write(
        &project.join("Graft.toml"),
        &manifest("app", &[("json", ">=3.0.0")]),
    );

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("satisfies all requirements"));
}

#[test]
fn test_resolve_without_manifest_fails() {
    let tmp = TempDir::new().unwrap();

    graft_cmd(tmp.path(), tmp.path())
        .current_dir(tmp.path())
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No Graft.toml"));
}

#[test]
fn test_missing_config_file_fails() {
    let (tmp, registry, project) = setup();

    graft_cmd(tmp.path(), &registry)
        .current_dir(&project)
        .args(["--config", "does-not-exist.toml", "resolve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
