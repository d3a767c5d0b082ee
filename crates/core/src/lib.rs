pub mod catalog;
pub mod config;
pub mod error;
pub mod publication;
pub mod rule;

pub use catalog::{BundleCatalog, GroupTarget};
pub use config::Config;
pub use error::*;
pub use publication::{OverviewSummary, PublicationInfo};
pub use rule::{RuleGroup, RuleRecord};
