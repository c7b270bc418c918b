//! Export directory watcher.
//!
//! Polls the export tree and runs one full rebuild whenever it changes.
//! A change is any difference in the fingerprint of the files the export
//! loader would read: SHA-256 over their sorted relative paths, sizes and
//! modification times. Rebuilds run one at a time; a failed rebuild is
//! logged and watching continues.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::connector_export::discover_files;
use crate::ingest::Ingestor;

/// Tracks the last seen fingerprint of an export tree.
pub struct ExportWatcher {
    root: PathBuf,
    last: Option<String>,
}

impl ExportWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last: None,
        }
    }

    /// Re-fingerprint the tree. Returns `true` if it changed since the
    /// previous poll; the first poll only records a baseline.
    pub fn poll(&mut self) -> Result<bool> {
        let current = fingerprint(&self.root)?;
        let changed = matches!(&self.last, Some(prev) if *prev != current);
        self.last = Some(current);
        Ok(changed)
    }
}

/// Hash the paths, sizes and mtimes of the export files under `root`.
pub fn fingerprint(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();

    for path in discover_files(root)? {
        let meta = std::fs::metadata(&path)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let relative = path.strip_prefix(root).unwrap_or(&path);

        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(meta.len().to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Watch `export_dir` until Ctrl-C, rebuilding on every change.
pub async fn run_watch(ingestor: &Ingestor, export_dir: &Path, poll_secs: u64) -> Result<()> {
    let mut watcher = ExportWatcher::new(export_dir);
    watcher.poll()?;

    let mut interval = tokio::time::interval(Duration::from_secs(poll_secs));
    info!(
        path = %export_dir.display(),
        poll_secs,
        "watching export for changes; Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("stopping watcher");
                return Ok(());
            }
        }

        match watcher.poll() {
            Ok(false) => continue,
            Ok(true) => {
                info!("export changed; rebuilding index");
                match ingestor.rebuild_index().await {
                    Ok(report) => info!(entries = report.entries, "rebuild after change complete"),
                    Err(e) => error!("rebuild after change failed: {}", e),
                }
            }
            Err(e) => error!("could not scan export: {:#}", e),
        }
    }
}
