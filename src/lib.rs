// searchpipe - bulk, scan and reindex helpers for OpenSearch
//
// This crate re-exports the member crates behind features so that
// applications can depend on a single crate.

// Re-export the helpers
#[cfg(feature = "opensearch")]
pub use searchpipe_opensearch::*;

// Re-export optional crates
#[cfg(feature = "opensearch")]
pub use searchpipe_opensearch;

#[cfg(feature = "log")]
pub use searchpipe_log;

// Prelude for common imports
#[cfg(feature = "opensearch")]
pub mod prelude {
    pub use searchpipe_opensearch::prelude::*;
}
