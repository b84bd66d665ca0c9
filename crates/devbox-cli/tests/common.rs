#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::assert::Assert;
use serde_json::Value;
use tempfile::TempDir;

/// A devbox home holding a registry with a single `web` project whose
/// workspace is `<home>/web`.
pub fn prepare_home(prefix: &str) -> (TempDir, PathBuf) {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("tempdir");
    let workspace = temp.path().join("web");
    fs::create_dir_all(&workspace).expect("workspace dir");
    fs::write(
        temp.path().join("config.json"),
        r#"{"projects":{"web":{"box_name":"devbox_web","base_image":"debian:12","workspace_path":"web"}}}"#,
    )
    .expect("write registry");
    (temp, workspace)
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}
