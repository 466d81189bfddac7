//! Target path handling: environment expansion and glob resolution.
pub mod expand;
pub mod glob;

pub use expand::expand;
pub use glob::{FsGlobResolver, GlobResolver};
