//! Observability plumbing shared by the binaries: tracing initialisation
//! and the global metrics registry.

pub mod metrics;
pub mod tracing;
