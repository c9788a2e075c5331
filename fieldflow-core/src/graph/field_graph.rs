//! The field graph.
//!
//! [`FieldGraph`] is the engine's top-level context object. It owns every
//! field, the route bookkeeping between them, the nodes that own fields,
//! and the few scene-wide fields everything else hangs off: the frame
//! clock, the "break all caches" broadcast and the event sink.
//!
//! # Thread Safety
//!
//! None. A graph is driven from one scene-update thread; values produced
//! on other threads come in through [`SharedField`](crate::SharedField).

use std::any::type_name;
use std::collections::HashMap;

use tracing::trace;

use crate::cache::CachePolicy;
use crate::config::EngineConfig;
use crate::error::{FieldError, Result};
use crate::field::{FieldHandle, FieldId, FieldType, InputRule, NodeId, SField, TypedField};

use super::cell::{Cell, Update};
use super::node::NodeEntry;
use super::routes::RouteKind;

/// Owner of all fields, routes and nodes of one scene.
pub struct FieldGraph {
    pub(crate) cells: HashMap<FieldId, Cell>,
    pub(crate) nodes: HashMap<NodeId, NodeEntry>,
    pub(crate) policy: CachePolicy,
    pub(crate) access_checks: bool,
    stamp: u64,
    frame: u64,
    time: SField<f64>,
    pub(crate) break_caches: FieldId,
    pub(crate) event_sink: FieldId,
}

impl FieldGraph {
    /// Create an empty graph with default settings.
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Create an empty graph configured by `config`.
    pub fn with_config(config: &EngineConfig) -> Self {
        let time = FieldId::next();
        let break_caches = FieldId::next();
        let event_sink = FieldId::next();

        let mut graph = Self {
            cells: HashMap::new(),
            nodes: HashMap::new(),
            policy: config.cache_policy(),
            access_checks: config.access_checks,
            stamp: 0,
            frame: 0,
            time: SField::from_id(time),
            break_caches,
            event_sink,
        };

        graph.cells.insert(
            time,
            Cell::new("Scene.time".into(), FieldType::single::<f64>(), Box::new(0.0_f64)),
        );
        graph.cells.insert(
            break_caches,
            Cell::new("Scene.breakCaches".into(), FieldType::single::<()>(), Box::new(())),
        );
        let mut sink = Cell::new("Scene.eventSink".into(), FieldType::opaque(), Box::new(()));
        sink.input_rule = InputRule::Unchecked;
        sink.update = Update::Sink;
        graph.cells.insert(event_sink, sink);

        graph
    }

    // ------------------------------------------------------------------
    // Cell access
    // ------------------------------------------------------------------

    pub(crate) fn cell(&self, id: FieldId) -> Result<&Cell> {
        self.cells.get(&id).ok_or(FieldError::UnknownField(id))
    }

    pub(crate) fn cell_mut(&mut self, id: FieldId) -> Result<&mut Cell> {
        self.cells.get_mut(&id).ok_or(FieldError::UnknownField(id))
    }

    /// Register a new cell, attaching it to its owner if it has one.
    pub(crate) fn insert_cell(&mut self, id: FieldId, mut cell: Cell) -> Result<FieldId> {
        if let Some(owner) = cell.owner {
            let node = self
                .nodes
                .get_mut(&owner)
                .ok_or(FieldError::UnknownNode(owner))?;
            node.fields.push(id);
        }
        cell.access_check &= self.access_checks;
        trace!(field = %id, name = %cell.name, "field created");
        self.cells.insert(id, cell);
        Ok(id)
    }

    pub(crate) fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    pub(crate) fn is_builtin(&self, id: FieldId) -> bool {
        id == self.time.id() || id == self.break_caches || id == self.event_sink
    }

    // ------------------------------------------------------------------
    // Naming and introspection
    // ------------------------------------------------------------------

    /// `node.field` when the field has an owner, else the field's name.
    pub fn full_name(&self, field: impl FieldHandle) -> String {
        let id = field.id();
        match self.cells.get(&id) {
            Some(cell) => match cell.owner.and_then(|n| self.nodes.get(&n)) {
                Some(node) => format!("{}.{}", node.name, cell.name),
                None => cell.name.clone(),
            },
            None => id.to_string(),
        }
    }

    pub fn name(&self, field: impl FieldHandle) -> Result<&str> {
        Ok(self.cell(field.id())?.name.as_str())
    }

    pub fn field_type(&self, field: impl FieldHandle) -> Result<FieldType> {
        Ok(self.cell(field.id())?.field_type)
    }

    pub fn access_type(&self, field: impl FieldHandle) -> Result<crate::field::AccessType> {
        Ok(self.cell(field.id())?.access)
    }

    /// Enable or disable access checks for one field.
    pub fn set_access_check(&mut self, field: impl FieldHandle, on: bool) -> Result<()> {
        self.cell_mut(field.id())?.access_check = on;
        Ok(())
    }

    pub fn contains(&self, field: impl FieldHandle) -> bool {
        self.cells.contains_key(&field.id())
    }

    /// Number of live fields, scene-wide fields included.
    pub fn field_count(&self) -> usize {
        self.cells.len()
    }

    /// Whether the field holds a value consistent with its inputs.
    pub fn is_up_to_date(&self, field: impl FieldHandle) -> Result<bool> {
        Ok(self.cell(field.id())?.is_up_to_date())
    }

    /// The field that delivered the pending event, if any.
    pub fn latest_event_source(&self, field: impl FieldHandle) -> Result<Option<FieldId>> {
        Ok(self.cell(field.id())?.event.source)
    }

    /// Whether `cause` is among the fields behind the most recent
    /// invalidation of `field`.
    ///
    /// Display caches always record causes; value fields only when built
    /// with `collect_events()`, and forget them once recomputed.
    pub fn caused_by(&self, field: impl FieldHandle, cause: impl FieldHandle) -> Result<bool> {
        let cell = self.cell(field.id())?;
        if let Some(cache) = &cell.cache {
            return Ok(cache.causes.contains(&cause.id()));
        }
        Ok(cell
            .causes
            .as_ref()
            .map(|c| c.contains(&cause.id()))
            .unwrap_or(false))
    }

    /// Debug rendering of the field's current value.
    pub fn value_string(&mut self, field: impl FieldHandle) -> Result<String> {
        let id = field.id();
        self.refresh(id);
        Ok(self.cell(id)?.value.describe())
    }

    // ------------------------------------------------------------------
    // Frame clock
    // ------------------------------------------------------------------

    /// The root time field, set once per frame.
    pub fn time(&self) -> SField<f64> {
        self.time
    }

    /// Number of frames since the graph was created.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Start a new frame at scene time `now`.
    ///
    /// Pushes `now` into the time field, which seeds all time-dependent
    /// recomputation and re-arms every cache's activity probe.
    pub fn advance_frame(&mut self, now: f64) -> Result<()> {
        self.frame += 1;
        let time = self.time;
        self.set_value(time, now)
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Read a field, recomputing it first if it is stale.
    pub fn get<H: TypedField>(&mut self, field: H) -> Result<H::Value> {
        self.read(field.id(), None, |v: &H::Value| v.clone())
    }

    /// Read a field acting as node `caller`.
    pub fn get_as<H: TypedField>(&mut self, caller: NodeId, field: H) -> Result<H::Value> {
        self.read(field.id(), Some(caller), |v: &H::Value| v.clone())
    }

    /// Borrow a field's up-to-date value without cloning it.
    pub fn with_value<H, R>(&mut self, field: H, f: impl FnOnce(&H::Value) -> R) -> Result<R>
    where
        H: TypedField,
    {
        self.read(field.id(), None, f)
    }

    /// Set a value and send an event to every destination.
    ///
    /// Always propagates, even when `value` equals the current value.
    pub fn set_value<H: TypedField>(&mut self, field: H, value: H::Value) -> Result<()> {
        self.write(field.id(), None, true, false, move |slot: &mut H::Value| *slot = value)
    }

    /// Set a value acting as node `caller`.
    pub fn set_value_as<H: TypedField>(
        &mut self,
        caller: NodeId,
        field: H,
        value: H::Value,
    ) -> Result<()> {
        self.write(field.id(), Some(caller), true, false, move |slot: &mut H::Value| {
            *slot = value
        })
    }

    /// Set a value without notifying any destination.
    pub fn set_value_no_event<H: TypedField>(&mut self, field: H, value: H::Value) -> Result<()> {
        self.write(field.id(), None, false, false, move |slot: &mut H::Value| *slot = value)
    }

    /// Send an event to every destination without changing the value.
    pub fn touch(&mut self, field: impl FieldHandle) -> Result<()> {
        let id = field.id();
        self.cell(id)?;
        self.start_event(id, false);
        Ok(())
    }

    /// Bring a field up-to-date without reading it.
    pub fn up_to_date(&mut self, field: impl FieldHandle) -> Result<()> {
        let id = field.id();
        self.cell(id)?;
        self.refresh(id);
        Ok(())
    }

    pub(crate) fn read<V: 'static, R>(
        &mut self,
        id: FieldId,
        caller: Option<NodeId>,
        f: impl FnOnce(&V) -> R,
    ) -> Result<R> {
        let cell = self.cell(id)?;
        if cell.checks_apply(caller) {
            if let Some(reason) = cell.access.get_denied(!cell.routes_out.is_empty()) {
                return Err(self.access_violation(id, reason));
            }
        }

        self.refresh(id);

        let cell = self.cell(id)?;
        match cell.value.as_any().downcast_ref::<V>() {
            Some(v) => Ok(f(v)),
            None => Err(self.wrong_type::<V>(id)),
        }
    }

    pub(crate) fn write<V: 'static, R>(
        &mut self,
        id: FieldId,
        caller: Option<NodeId>,
        fire: bool,
        refresh_first: bool,
        f: impl FnOnce(&mut V) -> R,
    ) -> Result<R> {
        self.check_set(id, caller)?;
        if !self.cell(id)?.value.as_any().is::<V>() {
            return Err(self.wrong_type::<V>(id));
        }
        if refresh_first {
            self.refresh(id);
        }

        let cell = self.cell_mut(id)?;
        let out = match cell.value.as_any_mut().downcast_mut::<V>() {
            Some(slot) => f(slot),
            None => return Err(FieldError::UnknownField(id)),
        };
        cell.event.source = None;
        cell.silent = None;
        if let Some(causes) = &mut cell.causes {
            causes.clear();
        }

        if fire {
            self.start_event(id, true);
        }
        Ok(out)
    }

    fn check_set(&self, id: FieldId, caller: Option<NodeId>) -> Result<()> {
        let cell = self.cell(id)?;
        if cell.checks_apply(caller) {
            let initialized = cell
                .owner
                .and_then(|n| self.nodes.get(&n))
                .map(|n| n.initialized)
                .unwrap_or(false);
            if let Some(reason) = cell.access.set_denied(initialized) {
                return Err(self.access_violation(id, reason));
            }
        }
        Ok(())
    }

    pub(crate) fn access_violation(&self, id: FieldId, reason: &'static str) -> FieldError {
        FieldError::AccessViolation {
            field: self.full_name(id),
            access: self
                .cells
                .get(&id)
                .map(|c| c.access)
                .unwrap_or_default(),
            reason,
        }
    }

    fn wrong_type<V: 'static>(&self, id: FieldId) -> FieldError {
        FieldError::WrongValueType {
            field: self.full_name(id),
            actual: self
                .cells
                .get(&id)
                .map(|c| c.field_type.to_string())
                .unwrap_or_default(),
            requested: type_name::<V>(),
        }
    }

    /// Check that every route is recorded on both endpoints and that both
    /// endpoints exist.
    pub fn validate(&self) -> Result<()> {
        for (&id, cell) in &self.cells {
            for &to in cell.routes_out.keys() {
                let ok = self
                    .cells
                    .get(&to)
                    .map(|dst| dst.routes_in.contains(&id))
                    .unwrap_or(false);
                if !ok {
                    return Err(FieldError::DanglingRoute { from: id, to });
                }
            }
            for &from in &cell.routes_in {
                let ok = self
                    .cells
                    .get(&from)
                    .map(|src| src.routes_out.get(&id).is_some())
                    .unwrap_or(false);
                if !ok {
                    return Err(FieldError::DanglingRoute { from, to: id });
                }
            }
        }
        Ok(())
    }

    /// Kind of the route from `from` to `to`, if one exists.
    pub fn route_kind(&self, from: impl FieldHandle, to: impl FieldHandle) -> Option<RouteKind> {
        self.cells
            .get(&from.id())
            .and_then(|c| c.routes_out.get(&to.id()).copied())
    }
}

impl Default for FieldGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::AccessType;

    #[test]
    fn set_and_get() {
        let mut graph = FieldGraph::new();
        let f = graph.sfield("f", 1).build().unwrap();

        assert_eq!(graph.get(f).unwrap(), 1);
        graph.set_value(f, 42).unwrap();
        assert_eq!(graph.get(f).unwrap(), 42);
    }

    #[test]
    fn set_value_marks_up_to_date() {
        let mut graph = FieldGraph::new();
        let a = graph.sfield("a", 0).build().unwrap();
        let b = graph.sfield("b", 0).build().unwrap();
        graph.route(a, b).unwrap();
        graph.set_value(a, 3).unwrap();
        assert!(!graph.is_up_to_date(b).unwrap());

        // Overwriting discards the pending event.
        graph.set_value(b, 9).unwrap();
        assert!(graph.is_up_to_date(b).unwrap());
        assert_eq!(graph.get(b).unwrap(), 9);
    }

    #[test]
    fn no_event_write_does_not_notify() {
        let mut graph = FieldGraph::new();
        let a = graph.sfield("a", 0).build().unwrap();
        let b = graph.sfield("b", 0).build().unwrap();
        graph.route(a, b).unwrap();
        graph.get(b).unwrap();

        graph.set_value_no_event(a, 5).unwrap();
        assert!(graph.is_up_to_date(b).unwrap());
        assert_eq!(graph.get(b).unwrap(), 0);
    }

    #[test]
    fn output_field_is_owner_writable_only() {
        let mut graph = FieldGraph::new();
        let node = graph.create_node("Shape");
        let out = graph
            .sfield("bound", 0.0_f32)
            .owner(node)
            .access(AccessType::Output)
            .build()
            .unwrap();

        let err = graph.set_value(out, 1.0).unwrap_err();
        assert!(matches!(err, FieldError::AccessViolation { .. }));
        graph.set_value_as(node, out, 1.0).unwrap();
        assert_eq!(graph.get(out).unwrap(), 1.0);
    }

    #[test]
    fn initialize_only_locks_after_node_init() {
        let mut graph = FieldGraph::new();
        let node = graph.create_node("Box");
        let size = graph
            .sfield("size", 1)
            .owner(node)
            .access(AccessType::InitializeOnly)
            .build()
            .unwrap();

        graph.set_value(size, 2).unwrap();
        graph.initialize_node(node).unwrap();
        assert!(graph.set_value(size, 3).is_err());

        graph.set_access_check(size, false).unwrap();
        graph.set_value(size, 3).unwrap();
    }

    #[test]
    fn input_field_unreadable_until_routed() {
        let mut graph = FieldGraph::new();
        let node = graph.create_node("Sensor");
        let input = graph
            .sfield("enabled", true)
            .owner(node)
            .access(AccessType::Input)
            .build()
            .unwrap();
        assert!(graph.get(input).is_err());
        assert!(graph.get_as(node, input).unwrap());
    }

    #[test]
    fn full_name_uses_owner() {
        let mut graph = FieldGraph::new();
        let node = graph.create_node("Material");
        let f = graph.sfield("diffuse", 0.8).owner(node).build().unwrap();
        assert_eq!(graph.full_name(f), "Material.diffuse");
        assert_eq!(graph.full_name(graph.time()), "Scene.time");
    }

    #[test]
    fn advance_frame_sets_time() {
        let mut graph = FieldGraph::new();
        graph.advance_frame(0.5).unwrap();
        graph.advance_frame(1.0).unwrap();
        assert_eq!(graph.frame(), 2);
        let time = graph.time();
        assert_eq!(graph.get(time).unwrap(), 1.0);
    }

    #[test]
    fn value_string_describes() {
        let mut graph = FieldGraph::new();
        let f = graph.mfield("xs", vec![1, 2]).build().unwrap();
        assert_eq!(graph.value_string(f).unwrap(), "[1, 2]");
    }
}
