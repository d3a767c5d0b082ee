//! Filesystem watcher turning data directory edits into schedule signals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::coalescer::Coalescer;
use crate::error::Result;
use crate::sources::FilterDirRepository;

/// File names inside the data directory that feed the pipeline.
pub const FILTERS_DIR: &str = "filters";
pub const ALLOWLIST_FILE: &str = "allowlist.txt";
pub const SETTINGS_FILE: &str = "settings.json";

/// Whether a changed path is one of the pipeline inputs under `data_dir`.
///
/// Temp files, dotfiles and anything else (including bundle output that
/// may live inside the data directory) are ignored.
pub fn is_pipeline_input(path: &Path, data_dir: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(data_dir) else {
        return false;
    };
    let parts: Vec<_> = rel.components().collect();
    match parts.as_slice() {
        [file] => {
            let name = file.as_os_str();
            name == ALLOWLIST_FILE || name == SETTINGS_FILE
        }
        [dir, _] if dir.as_os_str() == FILTERS_DIR => FilterDirRepository::filter_id(path).is_some(),
        _ => false,
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Remove(RemoveKind::File)
            | EventKind::Remove(RemoveKind::Any)
    )
}

/// Handle a single filesystem event from the notify watcher.
pub(crate) fn handle_fs_event(event: &Event, roots: &[PathBuf], coalescer: &Coalescer) {
    if !is_change(&event.kind) {
        return;
    }
    let relevant = event
        .paths
        .iter()
        .find(|p| roots.iter().any(|root| is_pipeline_input(p, root)));
    if let Some(path) = relevant {
        debug!(path = %path.display(), kind = ?event.kind, "pipeline input changed");
        coalescer.schedule();
    }
}

/// Watch `data_dir` recursively and schedule a reload on input changes.
///
/// The returned watcher must be kept alive for events to keep flowing.
pub fn watch_data_dir(data_dir: &Path, coalescer: Arc<Coalescer>) -> Result<RecommendedWatcher> {
    std::fs::create_dir_all(data_dir.join(FILTERS_DIR))?;
    // notify reports canonical paths on some platforms
    let mut roots = vec![data_dir.to_path_buf()];
    if let Ok(canonical) = data_dir.canonicalize() {
        if canonical != data_dir {
            roots.push(canonical);
        }
    }

    let mut watcher = notify::recommended_watcher(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => handle_fs_event(&event, &roots, &coalescer),
            Err(e) => warn!(error = %e, "filesystem watcher error"),
        },
    )?;
    watcher.watch(data_dir, RecursiveMode::Recursive)?;

    info!(path = %data_dir.display(), "watching data directory for rule changes");
    Ok(watcher)
}
