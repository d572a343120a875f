//! CLI-level tests: argument parsing plus end-to-end binary runs.

mod util;

use assert_cmd::Command;
use assert_fs::prelude::*;
use clap::Parser;
use predicates::prelude::*;
use stagehand::cli::{ApplyArgs, Cli, Commands};
use util::{workspace, write_doc};

#[test]
fn apply_flag_parsing() {
    // Given
    let argv = vec![
        "shd",
        "apply",
        "proposal.json",
        "--workspace-root",
        "/tmp/ws",
        "--skip",
        "a.txt",
        "--no-backup",
        "--json",
    ];

    // When
    let cmd = Cli::parse_from(argv);

    // Then
    match cmd.command {
        Commands::Apply(ApplyArgs {
            proposal,
            workspace_root,
            skip,
            json,
            ..
        }) => {
            assert!(proposal.unwrap().ends_with("proposal.json"));
            assert_eq!(workspace_root.unwrap().to_str(), Some("/tmp/ws"));
            assert_eq!(skip.len(), 1);
            assert!(json);
        }
        _ => panic!("expected Apply command"),
    }
}

#[test]
fn backup_flag_pair_resolves_against_default() {
    let base = Cli::parse_from(["shd", "apply", "p.json"]);
    let Commands::Apply(args) = base.command else {
        panic!("expected Apply")
    };
    assert!(args.backup_enabled(true));
    assert!(!args.backup_enabled(false));

    let forced = Cli::parse_from(["shd", "apply", "p.json", "--backup"]);
    let Commands::Apply(args) = forced.command else {
        panic!("expected Apply")
    };
    assert!(args.backup_enabled(false));

    let disabled = Cli::parse_from(["shd", "apply", "p.json", "--no-backup"]);
    let Commands::Apply(args) = disabled.command else {
        panic!("expected Apply")
    };
    assert!(!args.backup_enabled(true));
}

fn shd() -> Command {
    Command::cargo_bin("shd").expect("binary built")
}

#[test]
fn validate_then_apply_happy_path() {
    let ws = workspace();
    let doc = write_doc(
        &ws,
        "proposal.json",
        "two creates",
        &[("a.txt", "create", "alpha\n"), ("b/c.txt", "create", "charlie\n")],
    );

    shd()
        .arg("validate")
        .arg(&doc)
        .arg("--workspace-root")
        .arg(ws.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found"));

    shd()
        .arg("apply")
        .arg(&doc)
        .arg("--workspace-root")
        .arg(ws.path())
        .arg("--no-backup")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success_count\":2"));

    ws.child("a.txt").assert("alpha\n");
    ws.child("b/c.txt").assert("charlie\n");
}

#[test]
fn conflicting_create_warns_but_applies() {
    let ws = workspace();
    ws.child("a.txt").write_str("old").unwrap();
    let doc = write_doc(
        &ws,
        "proposal.json",
        "conflict",
        &[("a.txt", "create", "new\n")],
    );

    shd()
        .arg("apply")
        .arg(&doc)
        .arg("--workspace-root")
        .arg(ws.path())
        .arg("--no-backup")
        .assert()
        .success()
        .stdout(predicate::str::contains("file exists"));

    ws.child("a.txt").assert("new\n");
}

#[test]
fn escaping_path_blocks_apply() {
    let ws = workspace();
    let doc = write_doc(
        &ws,
        "proposal.json",
        "escape",
        &[("../outside.txt", "create", "nope")],
    );

    shd()
        .arg("apply")
        .arg(&doc)
        .arg("--workspace-root")
        .arg(ws.path())
        .arg("--no-backup")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("validation reported errors"));
}

#[test]
fn malformed_document_exits_with_input_error() {
    let ws = workspace();
    let bad = ws.child("bad.json");
    bad.write_str("{ not json").unwrap();

    shd()
        .arg("apply")
        .arg(bad.path())
        .arg("--workspace-root")
        .arg(ws.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("invalid proposal document"));
}

#[test]
fn dry_run_lists_without_writing() {
    let ws = workspace();
    let doc = write_doc(
        &ws,
        "proposal.json",
        "dry",
        &[("a.txt", "create", "alpha")],
    );

    shd()
        .arg("apply")
        .arg(&doc)
        .arg("--workspace-root")
        .arg(ws.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"));

    ws.child("a.txt").assert(predicate::path::missing());
}

#[test]
fn only_filter_narrows_the_selection() {
    let ws = workspace();
    let doc = write_doc(
        &ws,
        "proposal.json",
        "narrow",
        &[("a.txt", "create", "1"), ("b.txt", "create", "2")],
    );

    shd()
        .arg("apply")
        .arg(&doc)
        .arg("--workspace-root")
        .arg(ws.path())
        .arg("--only")
        .arg("a.txt")
        .arg("--no-backup")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success_count\":1"));

    ws.child("a.txt").assert(predicate::path::exists());
    ws.child("b.txt").assert(predicate::path::missing());
}

#[test]
fn preview_tree_shows_proposed_files() {
    let ws = workspace();
    let doc = write_doc(
        &ws,
        "proposal.json",
        "preview me",
        &[("src/new.rs", "create", "fn f() {}\n")],
    );

    shd()
        .arg("preview")
        .arg(&doc)
        .arg("--workspace-root")
        .arg(ws.path())
        .arg("--tree-only")
        .assert()
        .success()
        .stdout(predicate::str::contains("new.rs"))
        .stdout(predicate::str::contains("preview me"));
}

#[test]
fn backup_list_and_restore_round_trip() {
    let ws = workspace();
    ws.child("f.txt").write_str("original").unwrap();
    let doc = write_doc(
        &ws,
        "proposal.json",
        "with backup",
        &[("f.txt", "overwrite", "replaced")],
    );

    shd()
        .arg("apply")
        .arg(&doc)
        .arg("--workspace-root")
        .arg(ws.path())
        .arg("--backup")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup session:"));
    ws.child("f.txt").assert("replaced");

    shd()
        .arg("backup")
        .arg("list")
        .arg("--workspace-root")
        .arg(ws.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("files=1"));

    shd()
        .arg("backup")
        .arg("restore")
        .arg("latest")
        .arg("--workspace-root")
        .arg(ws.path())
        .arg("--force")
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored 1 file(s)"));
    ws.child("f.txt").assert("original");
}
