//! Display Caching
//!
//! Rendering-side consumer of the field graph: display caches turn the
//! graph's stale/up-to-date bookkeeping into rebuild-or-reuse decisions for
//! an expensive backend resource, a recorded command list.
//!
//! # Overview
//!
//! - [`RenderTarget`] and [`CommandList`] are the backend seam.
//! - [`DisplayList`] names a cache; all operations on it live on
//!   [`FieldGraph`](crate::FieldGraph).
//! - [`CachePolicy`] holds the scene-wide defaults that caches in
//!   [`CacheMode::Options`] follow.
//!
//! Rebuilds are debounced: a cache that keeps getting invalidated keeps
//! drawing uncached until its inputs have been quiet for a number of
//! frames.

mod backend;
mod display;
mod state;

pub use backend::{CommandList, RenderTarget};
pub use display::DisplayList;
pub use state::{CacheMode, CacheOutcome, CachePolicy, CacheState, CacheStats};

pub(crate) use state::DisplayCache;
