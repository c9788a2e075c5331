//! Event Propagation
//!
//! Propagation is a push/pull hybrid:
//!
//! 1. Push: a write starts an event with a fresh stamp. The event walks
//!    outgoing eventing routes depth-first, in insertion order. Each field
//!    it reaches records the event as pending (it is now stale) and
//!    forwards it, unless it already saw an event at least this new.
//!
//! 2. Pull: reading a stale field first brings the fields it depends on
//!    up-to-date, then runs its update and clears the pending event.
//!
//! Silent routes carry no events. A change behind one is only noted on the
//! destination, which stays up-to-date but re-reads its sources the next
//! time it is read.
//!
//! Nothing recomputes during the push except fields that opted in to
//! auto-update, so a field nobody reads is never recomputed no matter how
//! often its inputs change.
//!
//! Route graphs are assumed acyclic. Reaching a field that is already
//! forwarding an event, or already recomputing, means a cycle; that is a
//! wiring defect and panics in debug builds.

use smallvec::SmallVec;
use tracing::{error, trace, warn};

use crate::field::{FieldId, FieldValue, Inputs};

use super::cell::{Event, Update};
use super::field_graph::FieldGraph;

impl FieldGraph {
    /// Start a new event at `id` and push it to every destination.
    ///
    /// `reset_pending` marks `id` itself up-to-date (a write); a touch
    /// leaves any pending event of its own alone.
    pub(crate) fn start_event(&mut self, id: FieldId, reset_pending: bool) {
        let stamp = self.next_stamp();
        let outs = {
            let Some(cell) = self.cells.get_mut(&id) else {
                return;
            };
            cell.event.stamp = stamp;
            if reset_pending {
                cell.event.source = None;
            }
            cell.event_lock = true;
            cell.eventing_routes_out()
        };

        self.note_silent_change(id);
        for out in outs {
            self.propagate_event(out, id, stamp);
        }

        if let Some(cell) = self.cells.get_mut(&id) {
            cell.event_lock = false;
        }
    }

    /// Deliver the event `stamp`, sent by `from`, to `to`.
    pub(crate) fn propagate_event(&mut self, to: FieldId, from: FieldId, stamp: u64) {
        let policy_delay = self.policy.delay;
        let frame = self.frame();
        let Some(cell) = self.cells.get_mut(&to) else {
            panic!("dangling route {from} -> {to}: destination no longer exists");
        };

        if cell.event_lock {
            self.report_cycle(to, "forwarding an event");
            return;
        }
        if stamp <= cell.event.stamp {
            // Same event along another path: not forwarded again, but it is
            // one more cause of the pending change.
            if let Some(cache) = &mut cell.cache {
                cache.causes.insert(from);
            }
            if cell.event.source.is_some() {
                if let Some(causes) = &mut cell.causes {
                    causes.insert(from);
                }
            }
            return;
        }

        cell.event = Event {
            source: Some(from),
            stamp,
        };
        if let Some(causes) = &mut cell.causes {
            causes.insert(from);
        }
        if let Some(cache) = &mut cell.cache {
            cache.mark_stale(from, policy_delay, frame);
        }

        let outs: SmallVec<[FieldId; 8]> = cell.eventing_routes_out();
        let auto = cell.auto_update;
        cell.event_lock = true;
        trace!(%from, %to, stamp, "event");

        self.note_silent_change(to);
        for out in outs {
            self.propagate_event(out, to, stamp);
        }

        if let Some(cell) = self.cells.get_mut(&to) {
            cell.event_lock = false;
        }
        if auto {
            self.refresh(to);
        }
    }

    /// Bring `id` up-to-date if it has a pending event or a source behind a
    /// silent route changed.
    pub(crate) fn refresh(&mut self, id: FieldId) {
        let pulls: SmallVec<[FieldId; 4]> = {
            let Some(cell) = self.cells.get_mut(&id) else {
                return;
            };
            let Some(source) = cell.event.source.or(cell.silent) else {
                return;
            };
            if !cell.update.is_pull() {
                return;
            }
            if cell.update_lock {
                // Reached again through a silent route only: not a cycle of
                // events, the value being computed is read as it is.
                if cell.event.source.is_some() {
                    self.report_cycle(id, "recomputing");
                }
                return;
            }
            cell.update_lock = true;

            match &cell.update {
                Update::CopyEvent => std::iter::once(source).collect(),
                Update::Compute(_) => cell.routes_in.clone(),
                _ => SmallVec::new(),
            }
        };

        for source in pulls {
            if source != id {
                self.refresh(source);
            }
        }

        self.run_update(id);

        if let Some(cell) = self.cells.get_mut(&id) {
            cell.event.source = None;
            cell.silent = None;
            cell.update_lock = false;
            if let Some(causes) = &mut cell.causes {
                causes.clear();
            }
        }
    }

    fn run_update(&mut self, id: FieldId) {
        let latch = match self.cells.get(&id).map(|c| &c.update) {
            Some(Update::ActivityLatch { cache }) => Some(*cache),
            _ => None,
        };
        if let Some(cache) = latch {
            let active = self.take_activity_latch(cache);
            if let Some(cell) = self.cells.get_mut(&id) {
                cell.value = Box::new(active);
            }
            return;
        }

        let Some(cell) = self.cells.get(&id) else {
            return;
        };

        let new_value: Option<Box<dyn FieldValue>> = match &cell.update {
            Update::CopyEvent => {
                let source = cell
                    .event
                    .source
                    .or(cell.silent)
                    .and_then(|s| self.cells.get(&s));
                match source {
                    Some(src) if src.field_type == cell.field_type => Some(src.value.clone_value()),
                    Some(src) => {
                        warn!(
                            field = %self.full_name(id),
                            from = %src.field_type,
                            "event source has a different type, keeping value"
                        );
                        None
                    }
                    None => None,
                }
            }
            Update::Compute(compute) => {
                trace!(field = %self.full_name(id), "recompute");
                let source = cell.event.source.or(cell.silent);
                let inputs = Inputs::new(self, &cell.routes_in, source);
                Some(compute(&inputs))
            }
            Update::ActivityLatch { .. } | Update::Cache | Update::Sink => None,
        };

        if let Some(value) = new_value {
            if let Some(cell) = self.cells.get_mut(&id) {
                cell.value = value;
            }
        }
    }

    /// `from` changed: note it on every destination behind a silent route.
    pub(crate) fn note_silent_change(&mut self, from: FieldId) {
        let silent = match self.cells.get(&from) {
            Some(cell) if !cell.routes_out.is_empty() => cell.silent_routes_out(),
            _ => return,
        };
        for to in silent {
            if let Some(cell) = self.cells.get_mut(&to) {
                if cell.update.is_pull() {
                    cell.silent = Some(from);
                }
            }
        }
    }

    /// Report whether the cache was used since the last frame and re-arm.
    fn take_activity_latch(&mut self, cache: FieldId) -> bool {
        self.cells
            .get_mut(&cache)
            .and_then(|c| c.cache.as_mut())
            .map(|c| std::mem::take(&mut c.latch))
            .unwrap_or(false)
    }

    fn report_cycle(&self, id: FieldId, what: &str) {
        let name = self.full_name(id);
        debug_assert!(false, "cyclic route: {name} reached while {what}");
        error!(field = %name, "cyclic route reached while {what}, event dropped");
    }
}
