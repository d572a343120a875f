//! Shared test utilities for integration tests
//!
//! Provides proposal fixtures and workspace scaffolding used across
//! multiple test files.

use std::path::PathBuf;

use assert_fs::prelude::*;
use stagehand::core::proposal::{FileOp, ProposedOperation};

/// Fresh workspace directory for a review session.
pub fn workspace() -> assert_fs::TempDir {
    assert_fs::TempDir::new().expect("tempdir")
}

/// A create operation with inline content.
pub fn create_op(path: &str, content: &str) -> ProposedOperation {
    ProposedOperation {
        path: PathBuf::from(path),
        op: FileOp::Create,
        content: content.to_string(),
        base_cid: None,
    }
}

/// An overwrite operation with inline content.
pub fn overwrite_op(path: &str, content: &str) -> ProposedOperation {
    ProposedOperation {
        path: PathBuf::from(path),
        op: FileOp::Overwrite,
        content: content.to_string(),
        base_cid: None,
    }
}

/// Write a proposal document JSON file into the given directory and return
/// its path. The document mirrors `ops` one-to-one.
pub fn write_doc(
    dir: &assert_fs::TempDir,
    name: &str,
    description: &str,
    ops: &[(&str, &str, &str)], // (path, "create"|"overwrite", content)
) -> PathBuf {
    let operations: Vec<serde_json::Value> = ops
        .iter()
        .map(|(path, op, content)| {
            serde_json::json!({ "path": path, "op": op, "content": content })
        })
        .collect();
    let doc = serde_json::json!({
        "description": description,
        "operations": operations,
    });
    let child = dir.child(name);
    child
        .write_str(&serde_json::to_string_pretty(&doc).expect("serialize doc"))
        .expect("write doc");
    child.path().to_path_buf()
}
