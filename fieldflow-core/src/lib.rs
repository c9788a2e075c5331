//! FieldFlow Core
//!
//! This crate provides the reactive field engine of a scene graph:
//!
//! - Fields: typed reactive cells owned by scene nodes
//! - Routes: explicit data-flow edges between fields
//! - Lazy push/pull propagation of changes
//! - Display caches that reuse or rebuild recorded drawing commands
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `field`: ids, access kinds, typed handles and recompute inputs
//! - `graph`: the field graph, routes, propagation, nodes and event sink
//! - `cache`: display-list caching on top of the graph
//! - `scene`: the per-frame clock driver
//! - `handoff`: values shared with worker threads
//!
//! # Example
//!
//! ```rust,ignore
//! use fieldflow_core::FieldGraph;
//!
//! let mut graph = FieldGraph::new();
//! let x = graph.sfield("x", 0).build()?;
//! let doubled = graph
//!     .sfield("doubled", 0)
//!     .compute(|inputs| inputs.value::<i32>(0).copied().unwrap_or(0) * 2)
//!     .build()?;
//! graph.route(x, doubled)?;
//!
//! graph.set_value(x, 21)?;
//! // Nothing has recomputed yet; reading pulls the new value through.
//! assert_eq!(graph.get(doubled)?, 42);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod field;
pub mod graph;
pub mod handoff;
pub mod scene;

pub use cache::{
    CacheMode, CacheOutcome, CachePolicy, CacheState, CacheStats, CommandList, DisplayList,
    RenderTarget,
};
pub use config::EngineConfig;
pub use error::{ConfigError, FieldError, RenderError, Result};
pub use field::{
    AccessType, FanIn, FieldBuilder, FieldHandle, FieldId, FieldType, FieldValue, InputRule,
    Inputs, MField, NodeId, SField, Shape, TypedField, ValueType,
};
pub use graph::{FieldGraph, PeriodicUpdate, RouteKind};
pub use handoff::SharedField;
pub use scene::{Scene, TickReport};
