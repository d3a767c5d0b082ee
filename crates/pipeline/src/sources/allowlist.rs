//! Allow-list backed by a plain text file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::AllowListRepository;
use crate::error::Result;

/// Reads allow-listed domains from a file, one domain per line.
///
/// Blank lines and `#` comments are ignored. A missing file is an empty list.
#[derive(Debug, Clone)]
pub struct AllowListFile {
    path: PathBuf,
}

impl AllowListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allow rule exempting a single domain.
    pub fn allow_rule(domain: &str) -> String {
        format!("@@//{domain}$document")
    }
}

#[async_trait]
impl AllowListRepository for AllowListFile {
    async fn get_rules(&self) -> Result<Vec<String>> {
        let domains = self.get_white_list_domains().await?;
        Ok(domains.iter().map(|d| Self::allow_rule(d)).collect())
    }

    async fn get_white_list_domains(&self) -> Result<Vec<String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "allow-list file missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect())
    }
}
