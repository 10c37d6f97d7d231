//! Repository layer
//!
//! Repositories abstract where runs are stored and where the pipelines they
//! reference come from. They carry no reconciliation logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod pipelines;
mod runs;

// Re-export traits
pub use pipelines::{CLUSTER_RESOLVER, PipelineResolver, ResolveError, ResolvedPipeline};
pub use runs::RunRepository;

// Re-export implementations
pub use pipelines::{ApiPipelineResolver, InMemoryPipelineResolver};
pub use runs::{ApiRunRepository, InMemoryRunRepository};
