//! Routes
//!
//! A route is a directed edge "destination recomputes when source
//! changes". Each route is recorded twice: in the source's ordered
//! outgoing set (notification order) and in the destination's incoming
//! list (positional order seen by recompute functions). Every operation
//! here keeps both records in step.
//!
//! # Flavors
//!
//! - Eventing routes forward every event from the source.
//! - Silent routes never forward events. A change of the source is only
//!   noted on the destination, which is still up-to-date but re-reads its
//!   sources on its next read.

use smallvec::SmallVec;
use tracing::debug;

use crate::error::{FieldError, Result};
use crate::field::{FieldHandle, FieldId, NodeId, RuleViolation};

use super::field_graph::FieldGraph;

/// Whether a route forwards events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Eventing,
    Silent,
}

impl FieldGraph {
    /// Route `from` into `to` and send `to` an event right away.
    ///
    /// The destination becomes stale and pulls the source's value on its
    /// next read. Routing to a destination that is already routed to is a
    /// no-op.
    pub fn route(&mut self, from: impl FieldHandle, to: impl FieldHandle) -> Result<()> {
        self.connect(from.id(), to.id(), RouteKind::Eventing, true, None)
    }

    /// Route `from` into `to` with a silent route.
    ///
    /// No event is sent now or when `from` changes later, so `to` stays
    /// up-to-date. Its next read still picks up the source's current
    /// value.
    pub fn route_no_event(&mut self, from: impl FieldHandle, to: impl FieldHandle) -> Result<()> {
        self.connect(from.id(), to.id(), RouteKind::Silent, false, None)
    }

    /// [`route`](Self::route) acting as node `caller`, which may route out
    /// of its own input fields.
    pub fn route_as(
        &mut self,
        caller: NodeId,
        from: impl FieldHandle,
        to: impl FieldHandle,
    ) -> Result<()> {
        self.connect(from.id(), to.id(), RouteKind::Eventing, true, Some(caller))
    }

    pub(crate) fn connect(
        &mut self,
        from: FieldId,
        to: FieldId,
        kind: RouteKind,
        fire: bool,
        caller: Option<NodeId>,
    ) -> Result<()> {
        let src = self.cell(from)?;
        let dst = self.cell(to)?;

        if src.checks_apply(caller) {
            if let Some(reason) = src.access.route_out_denied() {
                return Err(self.access_violation(from, reason));
            }
        }
        if dst.checks_apply(caller) {
            if let Some(reason) = dst.access.route_in_denied() {
                return Err(self.access_violation(to, reason));
            }
        }

        if src.routes_out.contains_key(&to) {
            return Ok(());
        }

        let index = dst.routes_in.len();
        self.check_input(from, to, index)?;

        self.cell_mut(from)?.routes_out.insert(to, kind);
        let dst = self.cell_mut(to)?;
        dst.routes_in.push(from);
        if kind == RouteKind::Silent && dst.update.is_pull() {
            dst.silent = Some(from);
        }
        debug!(
            from = %self.full_name(from),
            to = %self.full_name(to),
            ?kind,
            "route added"
        );

        if fire && kind == RouteKind::Eventing {
            self.fire_into(from, to);
        }
        Ok(())
    }

    fn check_input(&self, from: FieldId, to: FieldId, index: usize) -> Result<()> {
        let found = self.cell(from)?.field_type;
        match self.cell(to)?.input_rule.check(index, found) {
            Ok(()) => Ok(()),
            Err(RuleViolation::Mismatch { expected }) => Err(FieldError::TypeMismatch {
                from: self.full_name(from),
                to: self.full_name(to),
                index,
                expected: expected.to_string(),
                found: found.to_string(),
            }),
            Err(RuleViolation::Full { max }) => Err(FieldError::TooManyInputs {
                to: self.full_name(to),
                max,
            }),
        }
    }

    /// Send a single fresh event from `from` to `to` only.
    fn fire_into(&mut self, from: FieldId, to: FieldId) {
        let stamp = self.next_stamp();
        let Some(src) = self.cells.get_mut(&from) else {
            return;
        };
        src.event.stamp = stamp;
        src.event_lock = true;
        self.propagate_event(to, from, stamp);
        if let Some(src) = self.cells.get_mut(&from) {
            src.event_lock = false;
        }
    }

    /// Remove the route from `from` to `to`.
    ///
    /// Returns whether a route existed. If `to` was waiting on an event
    /// delivered by `from`, that event is cancelled.
    pub fn unroute(&mut self, from: impl FieldHandle, to: impl FieldHandle) -> Result<bool> {
        let (from, to) = (from.id(), to.id());
        self.cell(from)?;
        let removed = self.detach(from, to);
        if removed {
            debug!(from = %self.full_name(from), to = %self.full_name(to), "route removed");
        }
        Ok(removed)
    }

    /// Remove every outgoing route of `from`. Safe on a field with none.
    pub fn unroute_all(&mut self, from: impl FieldHandle) -> Result<usize> {
        let from = from.id();
        let outs: SmallVec<[FieldId; 8]> = self.cell(from)?.routes_out.keys().copied().collect();
        Ok(outs.into_iter().filter(|&to| self.detach(from, to)).count())
    }

    /// Remove every route into or out of `field`.
    ///
    /// Must run before a field goes away; node teardown calls it for every
    /// field the node owns.
    pub fn disconnect(&mut self, field: impl FieldHandle) -> Result<usize> {
        let id = field.id();
        let removed_out = self.unroute_all(id)?;
        let ins: SmallVec<[FieldId; 8]> = self.cell(id)?.routes_in.iter().copied().collect();
        let removed_in = ins.into_iter().filter(|&from| self.detach(from, id)).count();
        Ok(removed_out + removed_in)
    }

    /// Drop both records of a route. Tolerates a missing endpoint.
    fn detach(&mut self, from: FieldId, to: FieldId) -> bool {
        let mut removed = self
            .cells
            .get_mut(&from)
            .and_then(|src| src.routes_out.shift_remove(&to))
            .is_some();
        if let Some(dst) = self.cells.get_mut(&to) {
            if let Some(pos) = dst.routes_in.iter().position(|&s| s == from) {
                dst.routes_in.remove(pos);
                removed = true;
            }
            if dst.event.source == Some(from) {
                dst.event.source = None;
            }
            if dst.silent == Some(from) {
                dst.silent = None;
            }
        }
        removed
    }

    /// Put `from` in place of the incoming route at position `index` of
    /// `to`, keeping every other position where it is.
    ///
    /// The new route keeps the kind of the one it replaces. Returns the
    /// replaced source, or `None` if `from` already routes to `to`. An
    /// eventing replacement sends `to` an event like [`route`](Self::route).
    pub fn replace_route(
        &mut self,
        from: impl FieldHandle,
        to: impl FieldHandle,
        index: usize,
    ) -> Result<Option<FieldId>> {
        self.replace_at(from.id(), to.id(), index, true)
    }

    /// [`replace_route`](Self::replace_route) without the event.
    pub fn replace_route_no_event(
        &mut self,
        from: impl FieldHandle,
        to: impl FieldHandle,
        index: usize,
    ) -> Result<Option<FieldId>> {
        self.replace_at(from.id(), to.id(), index, false)
    }

    fn replace_at(
        &mut self,
        from: FieldId,
        to: FieldId,
        index: usize,
        fire: bool,
    ) -> Result<Option<FieldId>> {
        let src = self.cell(from)?;
        let dst = self.cell(to)?;
        if src.checks_apply(None) {
            if let Some(reason) = src.access.route_out_denied() {
                return Err(self.access_violation(from, reason));
            }
        }
        if dst.checks_apply(None) {
            if let Some(reason) = dst.access.route_in_denied() {
                return Err(self.access_violation(to, reason));
            }
        }
        if src.routes_out.contains_key(&to) {
            return Ok(None);
        }
        let len = dst.routes_in.len();
        if index >= len {
            return Err(FieldError::IndexOutOfRange {
                field: self.full_name(to),
                index,
                len,
            });
        }
        self.check_input(from, to, index)?;

        let old = {
            let dst = self.cell_mut(to)?;
            std::mem::replace(&mut dst.routes_in[index], from)
        };
        let kind = self
            .cells
            .get_mut(&old)
            .and_then(|old_src| old_src.routes_out.shift_remove(&to))
            .unwrap_or(RouteKind::Eventing);
        self.cell_mut(from)?.routes_out.insert(to, kind);
        if kind == RouteKind::Silent {
            let dst = self.cell_mut(to)?;
            if dst.update.is_pull() {
                dst.silent = Some(from);
            }
        }
        debug!(
            from = %self.full_name(from),
            to = %self.full_name(to),
            replaced = %self.full_name(old),
            index,
            ?kind,
            "route replaced"
        );

        if fire && kind == RouteKind::Eventing {
            self.fire_into(from, to);
        }
        Ok(Some(old))
    }

    /// Destinations of `field`, in notification order.
    pub fn routes_out(&self, field: impl FieldHandle) -> Result<Vec<FieldId>> {
        Ok(self.cell(field.id())?.routes_out.keys().copied().collect())
    }

    /// Sources of `field`, in connection order.
    pub fn routes_in(&self, field: impl FieldHandle) -> Result<Vec<FieldId>> {
        Ok(self.cell(field.id())?.routes_in.to_vec())
    }

    pub fn routes_to(&self, from: impl FieldHandle, to: impl FieldHandle) -> bool {
        self.route_kind(from, to).is_some()
    }

    pub fn has_route_from(&self, to: impl FieldHandle, from: impl FieldHandle) -> bool {
        self.cells
            .get(&to.id())
            .map(|c| c.routes_in.contains(&from.id()))
            .unwrap_or(false)
    }
}
