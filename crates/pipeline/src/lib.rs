//! Content blocker rule distribution pipeline.
//!
//! Rule change signals are coalesced, the effective rule set is assembled,
//! split into per-bundle groups, checked against the per-bundle ceiling and
//! published as JSON payloads on an event bus. Consumer acknowledgements
//! feed a publication cache that backs the status query.

pub mod assembler;
pub mod cache;
pub mod coalescer;
pub mod consumer;
pub mod error;
pub mod events;
pub mod limit;
pub mod partition;
pub mod pipeline;
pub mod publisher;
pub mod service;
pub mod sources;
pub mod watcher;

pub use assembler::RuleAssembler;
pub use cache::{BundleStatus, ContentBlockerInfo, PublicationCache};
pub use coalescer::{Coalescer, ReloadTask};
pub use consumer::{spawn_consumer, BundleApplier, FileApplier};
pub use error::{PipelineError, PublishError, Result};
pub use events::{BundleEvent, BundleUpdate, EventBus, EventKind, EventSink, ExtensionUpdated};
pub use limit::LimitEnforcer;
pub use partition::{CatalogPartitioner, Partitioner};
pub use pipeline::{BundlePipeline, RunReport};
pub use publisher::{encode_bundle, BundlePublisher, PublishOutcome};
pub use service::{ContentBlockerService, Sources};
pub use watcher::watch_data_dir;
