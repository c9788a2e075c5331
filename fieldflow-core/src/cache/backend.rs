//! Render backend seam.
//!
//! The cache layer never talks to a GPU API itself. A [`RenderTarget`]
//! knows how to draw its node immediately and how to record the same
//! drawing into a [`CommandList`]; the cache decides which of the two to
//! use each frame.

use crate::error::RenderError;
use crate::graph::FieldGraph;

/// A recorded, replayable set of drawing commands.
///
/// The list owns its backend resource. Dropping the box releases it, so a
/// list is released exactly once whether it is replaced, invalidated,
/// discarded with its node, or abandoned by an early return.
pub trait CommandList {
    /// Replay the recorded commands.
    fn call(&self) -> Result<(), RenderError>;
}

/// Something that draws through a display cache.
///
/// Both methods get the graph so they can read the fields they draw from.
pub trait RenderTarget {
    /// Draw immediately, without caching.
    fn render(&mut self, graph: &mut FieldGraph) -> Result<(), RenderError>;

    /// Record the drawing into a new command list without executing it.
    fn compile(&mut self, graph: &mut FieldGraph) -> Result<Box<dyn CommandList>, RenderError>;
}
