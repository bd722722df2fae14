#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

pub use dagrun_test_utils::init_tracing;

/// Write `contents` as `Dagrun.toml` into a fresh temp dir.
///
/// Keep the returned `TempDir` alive for as long as the path is used.
pub fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("Dagrun.toml");
    let mut file = std::fs::File::create(&path).expect("create config file");
    file.write_all(contents.as_bytes()).expect("write config");
    (dir, path)
}

/// Path of the `dagrun` binary built for this test run.
pub fn dagrun_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dagrun"))
}
