//! Field Graph
//!
//! This module implements the data-flow graph between fields.
//!
//! # Overview
//!
//! - Fields are the nodes of the graph; each holds one value plus the
//!   bookkeeping that says whether that value is up-to-date.
//! - Routes are the edges: "destination recomputes when source changes".
//!
//! Changing a field pushes an event along its routes, marking everything
//! downstream stale. Stale fields recompute when they are read, pulling
//! their own sources up-to-date first.
//!
//! # Design Decisions
//!
//! 1. The graph is one arena owning every field, indexed by id. Handles
//!    are plain ids, so there are no reference cycles between fields and
//!    removing a field is a single map removal once it is unrouted.
//!
//! 2. Both ends of a route are recorded: the source's ordered outgoing
//!    set drives event order, the destination's incoming list gives the
//!    positions recompute functions read by.
//!
//! 3. Recompute is an injected function per field, not a trait object per
//!    field type, so every field kind shares one cell layout.

pub(crate) mod cell;
mod field_graph;
mod multi;
mod node;
mod propagate;
mod routes;
mod sink;

pub use field_graph::FieldGraph;
pub use routes::RouteKind;
pub use sink::PeriodicUpdate;
