//! Service layer
//!
//! Services wrap the pipeline with the per-job resources it needs: the
//! compile log, the working directory and the publish location.
//!
//! Services are trait-based so the dispatcher and the queue worker can be
//! tested against stand-ins.

mod compile;

// Re-export traits
pub use compile::CompileService;

// Re-export implementations
pub use compile::StandardCompileService;
