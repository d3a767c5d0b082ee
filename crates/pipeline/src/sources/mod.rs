//! Rule, allow-list and settings collaborators consumed by the assembler.
//!
//! The traits are the pipeline's only view of its inputs. File-backed
//! implementations are provided for the worker binary:
//! - [`FilterDirRepository`] reads `filters/<id>.txt` filter lists
//! - [`AllowListFile`] reads one allow-listed domain per line
//! - [`StoreSettings`] reads flags from a JSON [`KeyValueStore`]

mod allowlist;
mod filters;
mod store;

use async_trait::async_trait;
use rulecast_core::RuleRecord;

use crate::error::Result;

pub use self::allowlist::AllowListFile;
pub use self::filters::FilterDirRepository;
pub use self::store::{KeyValueStore, StoreSettings};

/// Supplies the filtering rules of all enabled filter lists.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn get_rules(&self) -> Result<Vec<RuleRecord>>;
}

/// Supplies the allow-list, both as ready rules and as bare domains.
#[async_trait]
pub trait AllowListRepository: Send + Sync {
    /// Allow rules, one per allow-listed domain, in list order.
    async fn get_rules(&self) -> Result<Vec<String>>;

    /// Allow-listed domains in list order.
    async fn get_white_list_domains(&self) -> Result<Vec<String>>;
}

/// Runtime switches read at the start of every assembly.
pub trait SettingsProvider: Send + Sync {
    fn is_filtering_disabled(&self) -> bool;

    /// `true` when listed domains are exempted; `false` when every domain
    /// except the listed ones is exempted (inverted mode).
    fn is_default_white_list_mode(&self) -> bool;
}
