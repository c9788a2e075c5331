//! Recompute inputs.
//!
//! A recompute function never names its upstream fields. It receives an
//! [`Inputs`] snapshot of the incoming routes in connection order and
//! reads them by position, the index each route got when it was made.
//! Every source is already up-to-date when the snapshot is taken.

use crate::graph::FieldGraph;

use super::FieldId;

/// Read-only view of a field's incoming routes during recompute.
pub struct Inputs<'g> {
    graph: &'g FieldGraph,
    routes: &'g [FieldId],
    event_source: Option<FieldId>,
}

impl<'g> Inputs<'g> {
    pub(crate) fn new(
        graph: &'g FieldGraph,
        routes: &'g [FieldId],
        event_source: Option<FieldId>,
    ) -> Self {
        Self {
            graph,
            routes,
            event_source,
        }
    }

    /// Number of incoming routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Id of the source at position `index`.
    pub fn field(&self, index: usize) -> Option<FieldId> {
        self.routes.get(index).copied()
    }

    /// Position of `field` among the incoming routes.
    pub fn index_of(&self, field: FieldId) -> Option<usize> {
        self.routes.iter().position(|&f| f == field)
    }

    /// The field that delivered the event being handled, if it came in
    /// through a route. A freshly built field reports itself.
    pub fn event_source(&self) -> Option<FieldId> {
        self.event_source
    }

    /// Position of the event source among the incoming routes.
    pub fn event_index(&self) -> Option<usize> {
        self.event_source.and_then(|s| self.index_of(s))
    }

    /// Value of the single-valued source at `index`.
    ///
    /// `None` if there is no such route or it holds another type.
    pub fn value<T: 'static>(&self, index: usize) -> Option<&'g T> {
        let id = self.field(index)?;
        let cell = self.graph.cells.get(&id)?;
        cell.value.as_any().downcast_ref::<T>()
    }

    /// Values of every source holding a `T`, in connection order.
    pub fn values<T: 'static>(&self) -> impl Iterator<Item = &'g T> + 'g {
        let graph = self.graph;
        let routes = self.routes;
        routes.iter().filter_map(move |id| {
            graph
                .cells
                .get(id)
                .and_then(|cell| cell.value.as_any().downcast_ref::<T>())
        })
    }

    /// Elements of the multi-valued source at `index`.
    pub fn multi<T: 'static>(&self, index: usize) -> Option<&'g [T]> {
        self.value::<Vec<T>>(index).map(Vec::as_slice)
    }

    /// Debug rendering of the source at `index`.
    pub fn describe(&self, index: usize) -> Option<String> {
        let id = self.field(index)?;
        self.graph.cells.get(&id).map(|cell| cell.value.describe())
    }
}
