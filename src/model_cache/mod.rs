//! Model cache: the out-of-scope model collaborator's contract (§6), plus a
//! concrete filesystem-backed implementation.

pub mod fs_cache;
pub mod types;

pub use fs_cache::FsModelCache;
pub use types::{ModelCache, ModelCacheError, ModelFile, ModelInfo, ModelKind, ProgressCallback};
