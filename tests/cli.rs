//! Runs the `rowscatter` binary end to end, launching real process groups.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn rowscatter(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rowscatter"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("ROWSCATTER_SPAWNED")
        .env_remove("ROWSCATTER_SEGMENT")
        .output()
        .unwrap()
}

fn write_matrix(dir: &Path, contents: &str) -> String {
    let path = dir.join("matrix.txt");
    fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_owned()
}

#[test]
fn test_two_processes_reverse_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = write_matrix(dir.path(), "1 2 3\n4 5 6\n7 8 9\n10 11 12\n");
    let out = dir.path().join("out.txt");

    let output = rowscatter(&[&matrix, "4", "3", "-n", "2", "--output", out.to_str().unwrap()]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {}", stderr);

    assert_eq!(fs::read_to_string(&out).unwrap(), "3 2 1\n6 5 4\n9 8 7\n12 11 10\n");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("total time = "));
    assert!(stdout.contains("communication overhead = "));
    // Both members announce their share of the rows.
    assert_eq!(stderr.matches("working on 2 rows").count(), 2, "stderr: {}", stderr);
}

#[test]
fn test_zero_rows_is_rejected_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = write_matrix(dir.path(), "1 2 3\n");

    let output = rowscatter(&[&matrix, "0", "3", "-n", "2"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("joined the group"), "stderr: {}", stderr);
}

#[test]
fn test_oversized_group_is_rejected_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = write_matrix(dir.path(), "1 2 3\n");

    let output = rowscatter(&[&matrix, "1", "3", "-n", "33"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("joined the group"), "stderr: {}", stderr);
}

#[test]
fn test_short_input_fails_in_the_load_phase_on_the_coordinator_only() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = write_matrix(dir.path(), "1 2 3\n4 5\n");
    let out = dir.path().join("out.txt");

    let output = rowscatter(&[&matrix, "4", "3", "-n", "2", "--output", out.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rank 0 failed"), "stderr: {}", stderr);
    assert!(stderr.contains("load phase failed"), "stderr: {}", stderr);
    assert!(!stderr.contains("rank 1 failed"), "stderr: {}", stderr);
    assert!(!out.exists());
}
