//! Keeps search artifacts in step with the rows they are derived from.
//!
//! The host calls the [`CatalogSynchronizer`] hooks from its row-mutation path and applies
//! the returned [`ChangeSet`] inside the same transaction as the row write.

pub mod extract;

mod artifact;
mod change;
mod error;
mod memory;
mod registry;
mod row;
mod spec;
mod stats;
mod synchronizer;
mod time_serde;

pub use artifact::{ArtifactKey, Pipeline, SearchArtifact};
pub use change::{ArtifactChange, ArtifactWriter, ChangeSet};
pub use error::{Error, Result};
pub use memory::{CatalogTransaction, MemoryCatalog, SearchHit};
pub use registry::{Registry, Unregistered};
pub use row::SourceRow;
pub use spec::{
	IndexOptions, IndexSpec, LanguageOption, LanguageSource, SourceExpression, TableSchema,
};
pub use stats::SyncStats;
pub use synchronizer::CatalogSynchronizer;
