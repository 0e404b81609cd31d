//! Rewrite commit path and run context
//!
//! Matching proposes, this module disposes: [`commit_replacement`] turns a
//! validated [`Binding`](crate::pattern::Binding) plus a freshly built
//! replacement node into the actual graph surgery — positional rewiring,
//! provenance recording, and cascading detach of the orphaned match
//! interior. [`PassContext`] carries the run-scoped hooks callbacks may
//! consult while deciding whether to commit.

pub mod commit;
pub mod context;

pub use commit::commit_replacement;
pub use context::{PassContext, SkipHook};
