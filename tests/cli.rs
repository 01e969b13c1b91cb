use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

const PROJECT_JSON: &str = r#"{
    "project": {
        "name": "my-app",
        "version": "1.0.0",
        "description": "A tiny application",
        "readme": {"text": "Read me.", "content-type": "text/plain", "path": "README.txt"},
        "keywords": ["tiny", "app"]
    },
    "target": {"install-name": "org.example.app"}
}"#;

fn entry_names(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

fn setup_project(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(root.join("project.json"), PROJECT_JSON)?;
    fs::write(root.join("README.txt"), "Read me.")?;
    fs::create_dir_all(root.join("src/nested"))?;
    fs::write(root.join("src/main.py"), "print('hi')")?;
    fs::write(root.join("src/nested/data.bin"), [0u8, 1, 2, 3])?;
    fs::write(root.join(".hidden"), "secret")?;
    Ok(())
}

#[test]
fn test_cli_build_clean_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempdir()?;
    setup_project(root.path())?;
    let artifact = root.path().join("dist").join("my_app-1.0.0.zip");

    // 1. Build from the project root
    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.arg("build")
        .arg("--project")
        .arg(root.path().join("project.json"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("my_app-1.0.0.zip"));

    assert_eq!(
        entry_names(&artifact),
        [
            "org.example.app/METADATA.json",
            "org.example.app/README.txt",
            "org.example.app/src/main.py",
            "org.example.app/src/nested/data.bin",
        ]
    );

    // 2. A second build skips the output directory it wrote to
    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.arg("build")
        .arg("--project")
        .arg(root.path().join("project.json"));
    cmd.assert().success();
    assert_eq!(entry_names(&artifact).len(), 4);

    // 3. Clean removes the archive
    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.arg("clean").arg("--out-dir").arg(root.path().join("dist"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("my_app-1.0.0.zip"));
    assert!(!artifact.exists());
    Ok(())
}

#[test]
fn test_cli_clean_resolves_out_dir_against_project_root() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempdir()?;
    setup_project(root.path())?;
    let elsewhere = tempdir()?;
    let project = root.path().join("project.json");
    let artifact = root.path().join("dist").join("my_app-1.0.0.zip");

    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.current_dir(elsewhere.path())
        .arg("build")
        .arg("--project")
        .arg(&project);
    cmd.assert().success();
    assert!(artifact.exists());

    // Same relative --out-dir, run from another directory
    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.current_dir(elsewhere.path())
        .arg("clean")
        .arg("--project")
        .arg(&project);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("my_app-1.0.0.zip"));
    assert!(!artifact.exists());
    assert!(!elsewhere.path().join("dist").exists());
    Ok(())
}

#[test]
fn test_cli_build_with_sources_and_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempdir()?;
    setup_project(root.path())?;

    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.arg("build")
        .arg("--project")
        .arg(root.path().join("project.json"))
        .arg("--source")
        .arg("src")
        .arg("--install-name")
        .arg("")
        .arg("--core-metadata-version")
        .arg("2.2");
    cmd.assert().success();

    let artifact = root.path().join("dist").join("my_app-1.0.0.zip");
    assert_eq!(
        entry_names(&artifact),
        ["METADATA.json", "README.txt", "main.py", "nested/data.bin"]
    );
    Ok(())
}

#[test]
fn test_cli_build_rejects_bad_metadata_version() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempdir()?;
    setup_project(root.path())?;

    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.arg("build")
        .arg("--project")
        .arg(root.path().join("project.json"))
        .arg("--core-metadata-version")
        .arg("42.203");
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Unknown metadata version"));

    assert!(!root.path().join("dist").exists());
    Ok(())
}

#[test]
fn test_cli_build_rejects_bad_source_date_epoch() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempdir()?;
    setup_project(root.path())?;

    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.env("SOURCE_DATE_EPOCH", "yesterday")
        .arg("build")
        .arg("--project")
        .arg(root.path().join("project.json"));
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("SOURCE_DATE_EPOCH"));
    Ok(())
}

#[test]
fn test_cli_metadata_conversion() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("METADATA");
    fs::write(
        &path,
        "Metadata-Version: 2.4\nName: my-app\nVersion: 1.0.0\nClassifier: A\nClassifier: B\nKeywords: a,b\n\nLong description.\n",
    )?;

    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.arg("metadata").arg(&path);
    cmd.assert().success().stdout(
        predicate::str::contains(r#""metadata_version": "2.4""#)
            .and(predicate::str::contains(r#""classifier": ["#))
            .and(predicate::str::contains(r#""description": "Long description.\n""#)),
    );
    Ok(())
}

#[test]
fn test_cli_metadata_reports_malformed_input() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("METADATA");
    fs::write(&path, "Name: ok\nnot a header\n")?;

    let mut cmd = Command::cargo_bin("zipdir")?;
    cmd.arg("metadata").arg(&path);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("line 2"));
    Ok(())
}
