//! Session-scoped backups with a mirrored directory layout.
//!
//! Every apply pass that wants backups opens one session. Files are copied
//! into `.shd/backups/tmp/<ID>` preserving their workspace-relative paths,
//! and the whole session is atomically renamed to `.shd/backups/<ID>` on
//! finalize, together with a manifest and a DONE marker for crash safety.
//! A lightweight append-only `index.jsonl` makes listing cheap.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Read, Write},
    path::{Component, Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result, bail};
use blake3::Hasher as Blake3;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

const STORE_DIR: &str = ".shd";

/// Per-file metadata recorded in the session manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBackupMeta {
    /// Workspace-relative source path; the backup copy mirrors it.
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Secs since UNIX_EPOCH of the source file at backup time.
    pub last_modified: u64,
    /// blake3:<hex> of the backed-up content.
    pub checksum: String,
}

/// Manifest describing a completed or in-progress session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub id: String,
    /// RFC3339 creation time.
    pub timestamp: String,
    /// Free-form description of the proposal this session belongs to.
    pub description: String,
    /// Set on finalize.
    pub success: bool,
    pub last_updated: String,
    pub files: Vec<FileBackupMeta>,
}

/// Lightweight index record for quick session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    pub id: String,
    pub timestamp: String,
    pub success: bool,
    pub files: usize,
}

/// Manager for a single session; stage in tmp, then finalize.
#[derive(Debug)]
pub struct BackupManager {
    workspace_root: PathBuf,
    sessions_dir: PathBuf,
    locks_dir: PathBuf,
    session_id: String,
    session_tmp_dir: PathBuf,
    session_final_dir: PathBuf,
    manifest: SessionManifest,
    finalized: bool,
}

impl BackupManager {
    /// Start a new session under `.shd/backups/tmp/<ID>`.
    pub fn begin(workspace_root: &Path, description: &str) -> Result<Self> {
        let store_root = workspace_root.join(STORE_DIR);
        let sessions_dir = store_root.join("backups");
        let tmp_sessions_dir = sessions_dir.join("tmp");
        let locks_dir = store_root.join("locks");

        fs::create_dir_all(&tmp_sessions_dir)
            .with_context(|| format!("create tmp dir: {}", tmp_sessions_dir.display()))?;
        fs::create_dir_all(&locks_dir)
            .with_context(|| format!("create locks dir: {}", locks_dir.display()))?;

        let session_id = generate_session_id();
        let session_tmp_dir = tmp_sessions_dir.join(&session_id);
        let session_final_dir = sessions_dir.join(&session_id);

        fs::create_dir_all(&session_tmp_dir)
            .with_context(|| format!("create session tmp: {}", session_tmp_dir.display()))?;

        let now = Utc::now().to_rfc3339();
        let manifest = SessionManifest {
            id: session_id.clone(),
            timestamp: now.clone(),
            description: description.to_string(),
            success: false,
            last_updated: now,
            files: Vec::new(),
        };

        Ok(Self {
            workspace_root: workspace_root.to_path_buf(),
            sessions_dir,
            locks_dir,
            session_id,
            session_tmp_dir,
            session_final_dir,
            manifest,
            finalized: false,
        })
    }

    /// Back up a single workspace-relative file into the session.
    pub fn backup_file(&mut self, rel_path: &Path) -> Result<()> {
        let rel = validate_workspace_rel(rel_path)?;
        let source_path = self.workspace_root.join(&rel);
        let backup_path = self.session_tmp_dir.join(&rel);

        if let Some(parent) = backup_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create backup parent: {}", parent.display()))?;
        }

        let meta = fs::metadata(&source_path)
            .with_context(|| format!("stat source: {}", source_path.display()))?;
        if !meta.is_file() {
            bail!("only regular files can be backed up: {}", rel.display());
        }

        fs::copy(&source_path, &backup_path)
            .with_context(|| format!("copy into backup: {}", backup_path.display()))?;

        let size_bytes = fs::metadata(&backup_path)
            .with_context(|| format!("stat backup: {}", backup_path.display()))?
            .len();
        let last_modified = meta
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        self.manifest.files.push(FileBackupMeta {
            path: rel,
            size_bytes,
            last_modified,
            checksum: stream_blake3(&backup_path)?,
        });
        self.manifest.last_updated = Utc::now().to_rfc3339();
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Session directory (tmp while unfinalized; final after finalize).
    pub fn session_dir(&self) -> &Path {
        if self.finalized {
            &self.session_final_dir
        } else {
            &self.session_tmp_dir
        }
    }

    pub fn file_count(&self) -> usize {
        self.manifest.files.len()
    }

    /// Write the manifest, atomically rename tmp→final, create DONE, append
    /// to the index.
    pub fn finalize(&mut self, success: bool) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        self.manifest.success = success;
        self.manifest.last_updated = Utc::now().to_rfc3339();

        let manifest_path = self.session_tmp_dir.join("manifest.json");
        let manifest_tmp = self.session_tmp_dir.join("manifest.json.tmp");
        let manifest_text =
            serde_json::to_string_pretty(&self.manifest).context("serialize manifest")?;
        fs::write(&manifest_tmp, &manifest_text)
            .with_context(|| format!("write manifest tmp: {}", manifest_tmp.display()))?;
        File::open(&manifest_tmp)?.sync_all().ok();
        fs::rename(&manifest_tmp, &manifest_path)?;
        let _ = sync_dir(&self.session_tmp_dir);

        fs::rename(&self.session_tmp_dir, &self.session_final_dir).with_context(|| {
            format!(
                "rename {} → {}",
                self.session_tmp_dir.display(),
                self.session_final_dir.display()
            )
        })?;
        let _ = sync_dir(&self.sessions_dir);

        let done_path = self.session_final_dir.join("DONE");
        fs::write(&done_path, "")
            .with_context(|| format!("create DONE: {}", done_path.display()))?;
        File::open(&done_path)?.sync_all().ok();
        let _ = sync_dir(&self.session_final_dir);

        // Only after the rename and marker are durable.
        self.finalized = true;

        self.append_to_index()?;
        Ok(())
    }

    fn append_to_index(&self) -> Result<()> {
        let index_path = self.sessions_dir.join("index.jsonl");
        let lock_path = self.locks_dir.join("backups.lock");
        let _guard = acquire_lock(&lock_path)?;

        let entry = SessionIndexEntry {
            id: self.manifest.id.clone(),
            timestamp: self.manifest.timestamp.clone(),
            success: self.manifest.success,
            files: self.manifest.files.len(),
        };
        let line = serde_json::to_string(&entry).context("serialize index entry")?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .with_context(|| format!("open index: {}", index_path.display()))?;
        writeln!(f, "{line}").context("append index")?;
        f.sync_all().ok();
        Ok(())
    }
}

impl Drop for BackupManager {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self.finalize(false); // best-effort failure finalize
        }
    }
}

/// Cross-platform directory fsync helper.
#[cfg(unix)]
fn sync_dir(p: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let f = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(p)?;
    f.sync_all()
}

#[cfg(windows)]
fn sync_dir(_p: &Path) -> std::io::Result<()> {
    // Windows does not expose a reliable directory fsync; best-effort no-op.
    Ok(())
}

/// Generate a sortable, filesystem-safe session ID.
fn generate_session_id() -> String {
    let ts = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let alphabet = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..10)
        .map(|_| {
            let idx = rng.random_range(0..alphabet.len());
            alphabet[idx] as char
        })
        .collect();
    format!("{ts}_{suffix}")
}

/// Stream a file into a blake3 digest as `blake3:<hex>`.
fn stream_blake3(path: &Path) -> Result<String> {
    let mut f =
        File::open(path).with_context(|| format!("open for checksum: {}", path.display()))?;
    let mut hasher = Blake3::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Simple exclusive file lock; the guard deletes the lock on drop.
struct LockGuard {
    path: PathBuf,
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.sync_all();
        let _ = fs::remove_file(&self.path);
    }
}

fn acquire_lock(lock_path: &Path) -> Result<LockGuard> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            writeln!(file, "pid={}", std::process::id()).ok();
            file.sync_all().ok();
            Ok(LockGuard {
                path: lock_path.to_path_buf(),
                file,
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            // Stale locks (> 60s) from crashed processes are reclaimed once.
            if let Ok(meta) = fs::metadata(lock_path)
                && let Ok(modified) = meta.modified()
                && let Ok(elapsed) = modified.elapsed()
                && elapsed.as_secs() > 60
                && fs::remove_file(lock_path).is_ok()
            {
                let mut file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(lock_path)
                    .with_context(|| {
                        format!("acquire lock after stale cleanup: {}", lock_path.display())
                    })?;
                writeln!(file, "pid={}", std::process::id()).ok();
                file.sync_all().ok();
                return Ok(LockGuard {
                    path: lock_path.to_path_buf(),
                    file,
                });
            }
            Err(anyhow::Error::new(e).context(format!("acquire lock: {}", lock_path.display())))
        }
        Err(e) => {
            Err(anyhow::Error::new(e).context(format!("acquire lock: {}", lock_path.display())))
        }
    }
}

/// Read the append-only index; ignores malformed lines.
pub fn list_sessions(workspace_root: &Path) -> Result<Vec<SessionIndexEntry>> {
    let index_path = workspace_root
        .join(STORE_DIR)
        .join("backups")
        .join("index.jsonl");
    if !index_path.exists() {
        return Ok(Vec::new());
    }

    let file =
        File::open(&index_path).with_context(|| format!("open index: {}", index_path.display()))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read index line {}", i + 1))?;
        let t = line.trim();
        if t.is_empty() {
            continue;
        }
        match serde_json::from_str::<SessionIndexEntry>(t) {
            Ok(e) => out.push(e),
            Err(_) => continue, // tolerate partial/corrupt lines
        }
    }
    Ok(out)
}

/// Load a session manifest; requires DONE to be present.
pub fn read_session_manifest(workspace_root: &Path, session_id: &str) -> Result<SessionManifest> {
    let base = session_path(workspace_root, session_id);
    if !base.join("DONE").exists() {
        bail!("session {} is incomplete (missing DONE)", session_id);
    }
    let manifest_path = base.join("manifest.json");
    let s = fs::read_to_string(&manifest_path)
        .with_context(|| format!("read manifest: {}", manifest_path.display()))?;
    serde_json::from_str(&s)
        .with_context(|| format!("parse manifest: {}", manifest_path.display()))
}

fn session_path(workspace_root: &Path, session_id: &str) -> PathBuf {
    workspace_root
        .join(STORE_DIR)
        .join("backups")
        .join(session_id)
}

/// Resolve a session query: an exact id, or the `latest` alias for the
/// newest completed session.
pub fn resolve_session_id(workspace_root: &Path, query: &str) -> Result<String> {
    let entries = list_sessions(workspace_root)?;
    if query == "latest" {
        let mut completed: Vec<&SessionIndexEntry> = entries
            .iter()
            .filter(|e| session_path(workspace_root, &e.id).join("DONE").exists())
            .collect();
        completed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        return completed
            .first()
            .map(|e| e.id.clone())
            .ok_or_else(|| anyhow::anyhow!("no completed backup sessions found"));
    }
    if entries.iter().any(|e| e.id == query) {
        return Ok(query.to_string());
    }
    bail!("no session found matching '{query}'")
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Restore only this workspace-relative path.
    pub path: Option<PathBuf>,
    /// Plan only; write nothing.
    pub dry_run: bool,
    /// Overwrite targets whose current content differs from the backup.
    pub force: bool,
    /// Verify backup copies against manifest checksums before restoring.
    pub verify_checksum: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub session_id: String,
    pub restored: Vec<PathBuf>,
    /// Targets skipped because their current content diverged (use force).
    pub conflicts: Vec<PathBuf>,
}

/// Copy files from a completed session back into the workspace.
pub fn restore_session(
    workspace_root: &Path,
    query: &str,
    opts: &RestoreOptions,
) -> Result<RestoreOutcome> {
    let session_id = resolve_session_id(workspace_root, query)?;
    let manifest = read_session_manifest(workspace_root, &session_id)?;
    let base = session_path(workspace_root, &session_id);

    let mut restored = Vec::new();
    let mut conflicts = Vec::new();

    for meta in &manifest.files {
        if let Some(filter) = &opts.path
            && &meta.path != filter
        {
            continue;
        }

        let backup_copy = base.join(&meta.path);
        if opts.verify_checksum {
            let actual = stream_blake3(&backup_copy)?;
            if actual != meta.checksum {
                bail!(
                    "backup copy corrupted for {} (checksum mismatch)",
                    meta.path.display()
                );
            }
        }

        let target = workspace_root.join(&meta.path);
        if target.exists() && !opts.force {
            // Restoring over unrelated edits needs an explicit opt-in.
            let current = stream_blake3(&target)?;
            if current != meta.checksum {
                conflicts.push(meta.path.clone());
                continue;
            }
        }

        if !opts.dry_run {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create parent: {}", parent.display()))?;
            }
            fs::copy(&backup_copy, &target)
                .with_context(|| format!("restore {}", meta.path.display()))?;
        }
        restored.push(meta.path.clone());
    }

    Ok(RestoreOutcome {
        session_id,
        restored,
        conflicts,
    })
}

/// CLI entry for the backup subcommands: list, show, restore.
pub fn run(args: crate::cli::BackupArgs, ctx: &crate::cli::AppContext) -> Result<()> {
    use crate::cli::BackupSubcommand;
    use crate::infra::config::{load_config, resolve_workspace_root};

    let config = load_config().unwrap_or_default();

    match args.command {
        BackupSubcommand::List(list) => {
            let root = resolve_workspace_root(list.workspace_root.as_deref(), &config)?;
            let mut entries = list_sessions(&root)?;
            entries.reverse(); // newest first; the index is append-only
            entries.truncate(list.limit);

            if list.json {
                println!("{}", serde_json::to_string(&entries)?);
            } else if !ctx.quiet {
                if entries.is_empty() {
                    println!("No backup sessions");
                }
                for e in entries {
                    let status = if e.success { "ok" } else { "failed" };
                    println!("{}  files={}  {}", e.id, e.files, status);
                }
            }
            Ok(())
        }
        BackupSubcommand::Show(show) => {
            let root = resolve_workspace_root(show.workspace_root.as_deref(), &config)?;
            let session_id = resolve_session_id(&root, &show.id)?;
            let manifest = read_session_manifest(&root, &session_id)?;

            if show.json {
                println!("{}", serde_json::to_string(&manifest)?);
            } else if !ctx.quiet {
                println!("Session: {}", manifest.id);
                println!("Created: {}", manifest.timestamp);
                println!("Proposal: {}", manifest.description);
                println!("Success: {}", manifest.success);
                for f in &manifest.files {
                    println!("  {}  {} bytes", f.path.display(), f.size_bytes);
                }
            }
            Ok(())
        }
        BackupSubcommand::Restore(restore) => {
            let root = resolve_workspace_root(restore.workspace_root.as_deref(), &config)?;
            let opts = RestoreOptions {
                path: restore.path,
                dry_run: ctx.dry_run,
                force: restore.force,
                verify_checksum: restore.verify_checksum,
            };
            let outcome = restore_session(&root, &restore.session, &opts)?;

            if restore.json {
                println!("{}", serde_json::to_string(&outcome)?);
            } else if !ctx.quiet {
                let verb = if ctx.dry_run { "Would restore" } else { "Restored" };
                println!(
                    "{verb} {} file(s) from session {}",
                    outcome.restored.len(),
                    outcome.session_id
                );
                for path in &outcome.conflicts {
                    eprintln!(
                        "  skipped {} (changed since backup; use --force)",
                        path.display()
                    );
                }
            }
            Ok(())
        }
    }
}

/// Validate that the given path is workspace-relative and non-escaping.
fn validate_workspace_rel(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        bail!("path must be workspace-relative: {}", p.display());
    }
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::ParentDir => bail!("path escapes workspace: {}", p.display()),
            Component::CurDir => {}
            Component::Prefix(_) | Component::RootDir => {
                bail!("path must be workspace-relative: {}", p.display())
            }
            _ => out.push(c.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        bail!("empty path");
    }
    Ok(out)
}
