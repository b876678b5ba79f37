use std::{
    io::Write,
    process::{Command, Output, Stdio},
    thread,
};

use assert_cmd::cargo::CommandCargoExt;
use pretty_assertions::assert_eq;

fn run(args: &[&str]) -> Output {
    Command::cargo_bin("s3lab")
        .unwrap()
        .args(args)
        .env("LOG_FILTER", "warn")
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

fn run_with_input(args: &[&str], input: &'static [u8]) -> Output {
    let mut child_process = Command::cargo_bin("s3lab")
        .unwrap()
        .args(args)
        .env("LOG_FILTER", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdin = child_process.stdin.take().expect("failed to open stdin");
    thread::spawn(move || {
        stdin
            .write_all(input)
            .expect("cannot write confirmation msg to stdin");
    });

    child_process.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().into()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().into()
}

#[test_log::test]
fn no_command_prints_hint() {
    let output = run(&[]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "command required, -h/--help for help");
}

#[test_log::test]
fn demo_runs_every_action_against_memory_store() {
    let dir = tempfile::tempdir().unwrap();
    let work_dir = dir.path().join("work");
    let output = run(&[
        "demo",
        "--store",
        "memory",
        "--no-pause",
        "--work-dir",
        work_dir.to_str().unwrap(),
    ]);

    let out = stdout(&output);
    assert!(output.status.success(), "{}", stderr(&output));
    for step in 1..=12 {
        assert!(out.contains(&format!("ACTION ({step})")), "missing action {step}:\n{out}");
    }
    assert!(out.contains("Purged 3 object versions and 0 delete markers"), "{out}");
    assert!(!out.contains("Press enter to continue..."));
    assert!(work_dir.join("downloads").is_dir());
}

#[test_log::test]
fn demo_pauses_between_actions() {
    let dir = tempfile::tempdir().unwrap();
    let work_dir = dir.path().join("work");
    let output = run_with_input(
        &[
            "demo",
            "--store",
            "memory",
            "--work-dir",
            work_dir.to_str().unwrap(),
        ],
        b"\n\n\n\n\n\n\n\n\n\n\n",
    );

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).matches("Press enter to continue...").count(), 11);
}

#[test_log::test]
fn purge_requires_confirmation() {
    let output = run_with_input(&["purge", "--store", "memory", "--bucket", "b1"], b"no\n");

    assert!(!output.status.success());
    assert!(stdout(&output).contains("Enter 'yes' to confirm"));
    let err = stderr(&output);
    assert!(err.contains("Purge command failed"), "{err}");
    assert!(err.contains("was not confirmed"), "{err}");
}

#[test_log::test]
fn purge_of_missing_bucket_fails() {
    let output = run(&["purge", "--store", "memory", "--bucket", "missing", "--yes"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("bucket 'missing' does not exist"), "{err}");
}

#[test_log::test]
fn bucket_create_rejects_bad_prefix() {
    let output = run(&["bucket", "create", "--store", "memory", "--prefix", "Bad_"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Bucket command failed"), "{err}");
    assert!(err.contains("invalid bucket name"), "{err}");
}

#[test_log::test]
fn bucket_create_prints_generated_name() {
    let output = run(&["bucket", "create", "--store", "memory", "--prefix", "lab-"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let name = stdout(&output);
    assert!(name.starts_with("lab-"), "{name}");
    assert_eq!(name.len(), "lab-".len() + 36);
}

#[test_log::test]
fn invalid_acl_is_a_usage_error() {
    let output = run(&[
        "acl", "set", "--store", "memory", "--bucket", "b1", "--key", "k", "--acl", "public",
    ]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("is not a valid canned ACL"));
}
