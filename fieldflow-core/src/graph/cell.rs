//! Field storage.
//!
//! A [`Cell`] is the engine-side record behind every typed field handle:
//! the erased value, the pending-event bookkeeping that decides whether the
//! value is up-to-date, and both halves of its route bookkeeping.

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::cache::DisplayCache;
use crate::field::{AccessType, FieldId, FieldType, FieldValue, InputRule, Inputs, NodeId};

use super::routes::RouteKind;
use super::sink::PeriodicState;

/// Injected recompute function of a value field.
pub(crate) type ComputeFn = Box<dyn Fn(&Inputs<'_>) -> Box<dyn FieldValue>>;

/// How a field brings itself up-to-date when it has a pending event.
pub(crate) enum Update {
    /// Take the value of the field that delivered the pending event.
    CopyEvent,
    /// Run an injected function over the incoming-route snapshot.
    Compute(ComputeFn),
    /// Activity probe of a display cache: report and clear its latch.
    ActivityLatch { cache: FieldId },
    /// Display caches rebuild only through `use_cache`.
    Cache,
    /// The event sink has no value of its own.
    Sink,
}

impl Update {
    /// Whether `refresh` should run this update at all.
    pub(crate) fn is_pull(&self) -> bool {
        !matches!(self, Update::Cache | Update::Sink)
    }
}

/// The most recent event a field received.
///
/// `source` is the field that delivered it while it is still pending; a
/// field with no pending source is up-to-date. `stamp` orders events so a
/// field forwards each event at most once.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Event {
    pub source: Option<FieldId>,
    pub stamp: u64,
}

pub(crate) struct Cell {
    pub name: String,
    pub owner: Option<NodeId>,
    pub access: AccessType,
    pub access_check: bool,
    pub field_type: FieldType,
    pub input_rule: InputRule,
    pub value: Box<dyn FieldValue>,
    pub update: Update,

    /// Destinations in notification order.
    pub routes_out: IndexMap<FieldId, RouteKind>,
    /// Sources in connection order; positions are what recompute sees.
    pub routes_in: SmallVec<[FieldId; 4]>,

    pub event: Event,
    /// Last source that changed behind a silent route. Re-read on the next
    /// read without making the field stale.
    pub silent: Option<FieldId>,
    /// Set while this field forwards an event to its destinations.
    pub event_lock: bool,
    /// Set while this field recomputes.
    pub update_lock: bool,
    /// Recompute as soon as an event arrives instead of on the next read.
    pub auto_update: bool,
    /// Fields that caused the pending events, when collection is enabled.
    pub causes: Option<IndexSet<FieldId>>,

    pub cache: Option<Box<DisplayCache>>,
    pub periodic: Option<PeriodicState>,
}

impl Cell {
    pub(crate) fn new(name: String, field_type: FieldType, value: Box<dyn FieldValue>) -> Self {
        Self {
            name,
            owner: None,
            access: AccessType::InputOutput,
            access_check: true,
            field_type,
            input_rule: InputRule::any_number(field_type),
            value,
            update: Update::CopyEvent,
            routes_out: IndexMap::new(),
            routes_in: SmallVec::new(),
            event: Event::default(),
            silent: None,
            event_lock: false,
            update_lock: false,
            auto_update: false,
            causes: None,
            cache: None,
            periodic: None,
        }
    }

    pub(crate) fn is_up_to_date(&self) -> bool {
        self.event.source.is_none()
    }

    /// Destinations that receive events, in notification order.
    pub(crate) fn eventing_routes_out(&self) -> SmallVec<[FieldId; 8]> {
        self.routes_out
            .iter()
            .filter(|(_, kind)| **kind == RouteKind::Eventing)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Destinations that only take the value along, never an event.
    pub(crate) fn silent_routes_out(&self) -> SmallVec<[FieldId; 8]> {
        self.routes_out
            .iter()
            .filter(|(_, kind)| **kind == RouteKind::Silent)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether access checks apply to a caller acting as `caller`.
    pub(crate) fn checks_apply(&self, caller: Option<NodeId>) -> bool {
        self.access_check && self.owner.is_some() && self.owner != caller
    }
}
