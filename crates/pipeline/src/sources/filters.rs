//! Filter lists stored as `<filter_id>.txt` files in one directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rulecast_core::rule::ALLOWLIST_SOURCE_ID;
use rulecast_core::RuleRecord;
use tracing::{debug, info, warn};

use super::RuleRepository;
use crate::error::Result;

/// Reads every `<id>.txt` filter list in a directory.
///
/// Files are read in ascending filter id order so repeated reads of the same
/// directory produce the same rule sequence. Dotfiles, non-`.txt` files,
/// non-numeric stems and the reserved allow-list id are skipped.
#[derive(Debug, Clone)]
pub struct FilterDirRepository {
    dir: PathBuf,
}

impl FilterDirRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Filter id encoded in a list file name, if the file is a filter list.
    pub fn filter_id(path: &Path) -> Option<i64> {
        let name = path.file_name()?.to_str()?;
        if name.starts_with('.') {
            return None;
        }
        if path.extension()?.to_str()? != "txt" {
            return None;
        }
        path.file_stem()?.to_str()?.parse().ok()
    }

    async fn list_files(&self) -> Result<Vec<(i64, PathBuf)>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.dir.display(), "filters directory missing, no rules loaded");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match Self::filter_id(&path) {
                Some(ALLOWLIST_SOURCE_ID) => {
                    warn!(path = %path.display(), "filter id 0 is reserved for the allow-list, skipping");
                }
                Some(id) => files.push((id, path)),
                None => debug!(path = %path.display(), "not a filter list, skipping"),
            }
        }
        files.sort_by_key(|(id, _)| *id);
        Ok(files)
    }
}

#[async_trait]
impl RuleRepository for FilterDirRepository {
    async fn get_rules(&self) -> Result<Vec<RuleRecord>> {
        let mut rules = Vec::new();
        for (id, path) in self.list_files().await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            let before = rules.len();
            rules.extend(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(|l| RuleRecord::new(id, l)),
            );
            debug!(filter_id = id, rules = rules.len() - before, "read filter list");
        }
        info!(rules = rules.len(), path = %self.dir.display(), "rules loaded");
        Ok(rules)
    }
}
