use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn runner() -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("workflow-runner"));
    command.env_remove("RUST_LOG");
    command
}

const SPEC: &str = r#"
document: {dsl: "1.0.0", namespace: orders, name: fulfil, version: "1.0.0"}
tasks:
  - name: seed
    kind: SET
    task_config:
      variables: {count: 1}
"#;

const DSL: &str = r#"
document: {dsl: "1.0.0", namespace: orders, name: fulfil, version: "1.0.0"}
do:
  - seed: {set: {count: "${ $input.start }"}}
  - bump: {set: {count: "${ $data.count + 1 }", region: "${ $env.REGION }"}}
"#;

#[test]
fn version_flag_prints_the_package_version() {
    runner()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_workflow_commands() {
    runner()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("WORKFLOW COMMANDS"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn validate_accepts_a_good_spec() {
    let dir = TempDir::new().unwrap();
    let spec = dir.path().join("order.yaml");
    fs::write(&spec, SPEC).unwrap();

    runner()
        .arg("validate")
        .arg(&spec)
        .assert()
        .success()
        .stdout(predicate::str::contains("state: VALID"));
}

#[test]
fn validate_rejects_a_spec_without_tasks() {
    let dir = TempDir::new().unwrap();
    let spec = dir.path().join("empty.yaml");
    fs::write(
        &spec,
        "document: {dsl: \"1.0.0\", namespace: a, name: b, version: \"1.0.0\"}\ntasks: []\n",
    )
    .unwrap();

    runner()
        .args(["validate", "--format", "json"])
        .arg(&spec)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"INVALID\""));
}

#[test]
fn validate_reports_unreadable_spec_as_failed() {
    let dir = TempDir::new().unwrap();
    runner()
        .arg("validate")
        .arg(dir.path().join("missing.yaml"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("state: FAILED"));
}

#[test]
fn validate_reports_undecodable_spec_as_invalid() {
    let dir = TempDir::new().unwrap();
    let spec = dir.path().join("typo.yaml");
    fs::write(&spec, SPEC.replace("kind: SET", "kind: HTTP_CAL")).unwrap();

    runner()
        .arg("validate")
        .arg(&spec)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("state: INVALID"))
        .stdout(predicate::str::contains("unknown variant `HTTP_CAL`"))
        .stdout(predicate::str::contains("cannot be nil").not());
}

#[test]
fn validate_dsl_mode_reads_documents() {
    let dir = TempDir::new().unwrap();
    let workflow = dir.path().join("flow.yaml");
    fs::write(&workflow, DSL).unwrap();

    runner()
        .args(["validate", "--dsl"])
        .arg(&workflow)
        .assert()
        .success();
}

#[test]
fn convert_writes_canonical_dsl() {
    let dir = TempDir::new().unwrap();
    let spec = dir.path().join("order.yaml");
    let output = dir.path().join("order.dsl.yaml");
    fs::write(&spec, SPEC).unwrap();

    runner()
        .arg("convert")
        .arg(&spec)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("dsl: 1.0.0"));
    assert!(written.contains("- seed:"));
}

#[test]
fn run_prints_the_final_output() {
    let dir = TempDir::new().unwrap();
    let workflow = dir.path().join("flow.yaml");
    fs::write(&workflow, DSL).unwrap();

    runner()
        .arg("run")
        .arg(&workflow)
        .args(["--input", r#"{"start": 41}"#, "--env", "REGION=eu"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 42"))
        .stdout(predicate::str::contains("\"region\": \"eu\""));
}

#[test]
fn run_fails_on_raise() {
    let dir = TempDir::new().unwrap();
    let workflow = dir.path().join("fail.yaml");
    fs::write(
        &workflow,
        "document: {dsl: \"1.0.0\", namespace: a, name: b, version: \"1.0.0\"}\ndo:\n  - stop: {raise: {error: runtime, message: halted}}\n",
    )
    .unwrap();

    runner().arg("run").arg(&workflow).assert().failure();
}

#[test]
fn run_rejects_malformed_input() {
    let dir = TempDir::new().unwrap();
    let workflow = dir.path().join("flow.yaml");
    fs::write(&workflow, DSL).unwrap();

    runner()
        .arg("run")
        .arg(&workflow)
        .args(["--input", "{not json"])
        .assert()
        .failure();
}
