//! Event Sink
//!
//! Laziness means a field nobody reads is never recomputed. Fields whose
//! recompute has side effects that must happen anyway (device polling,
//! logging, forwarding to another system) are routed into the scene-wide
//! event sink instead. Once per tick the sink brings every stale field
//! routed into it up-to-date.
//!
//! A field can further throttle itself with a [`PeriodicUpdate`] so the
//! sink only refreshes it every N ticks or every T seconds of scene time.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::trace;

use crate::error::Result;
use crate::field::{FieldHandle, FieldId};

use super::field_graph::FieldGraph;
use super::routes::RouteKind;

/// How often the event sink refreshes a field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeriodicUpdate {
    #[default]
    EveryTick,
    /// Every n-th tick. `Count(0)` behaves like `Count(1)`.
    Count(u32),
    /// At most once per this many seconds of scene time.
    Seconds(f64),
}

#[derive(Debug, Clone)]
pub(crate) struct PeriodicState {
    period: PeriodicUpdate,
    ticks: u32,
    last: Option<f64>,
}

impl PeriodicState {
    pub(crate) fn new(period: PeriodicUpdate) -> Self {
        Self {
            period,
            ticks: 0,
            last: None,
        }
    }

    /// Advance by one tick at scene time `now`; true if the field is due.
    pub(crate) fn time_to_update(&mut self, now: f64) -> bool {
        match self.period {
            PeriodicUpdate::EveryTick => true,
            PeriodicUpdate::Count(n) => {
                self.ticks += 1;
                if self.ticks >= n.max(1) {
                    self.ticks = 0;
                    true
                } else {
                    false
                }
            }
            PeriodicUpdate::Seconds(interval) => match self.last {
                Some(last) if now - last < interval => false,
                _ => {
                    self.last = Some(now);
                    true
                }
            },
        }
    }
}

impl FieldGraph {
    /// The scene-wide event sink.
    pub fn event_sink(&self) -> FieldId {
        self.event_sink
    }

    /// Route `field` into the event sink so it is refreshed every tick
    /// even when nothing reads it.
    pub fn route_to_sink(&mut self, field: impl FieldHandle) -> Result<()> {
        let id = field.id();
        let owner = self.cell(id)?.owner;
        let sink = self.event_sink;
        self.connect(id, sink, RouteKind::Eventing, false, owner)
    }

    /// Throttle how often the event sink refreshes `field`.
    pub fn set_periodic_update(
        &mut self,
        field: impl FieldHandle,
        period: PeriodicUpdate,
    ) -> Result<()> {
        self.cell_mut(field.id())?.periodic = Some(PeriodicState::new(period));
        Ok(())
    }

    /// Refresh every due field routed into the sink.
    ///
    /// Returns how many of them were stale and got recomputed.
    pub fn flush_event_sink(&mut self, now: f64) -> usize {
        let sink = self.event_sink;
        let sources: SmallVec<[FieldId; 8]> = match self.cells.get_mut(&sink) {
            Some(cell) => {
                cell.event.source = None;
                cell.routes_in.iter().copied().collect()
            }
            None => return 0,
        };

        let mut refreshed = 0;
        for id in sources {
            let Some(cell) = self.cells.get_mut(&id) else {
                continue;
            };
            let due = cell
                .periodic
                .as_mut()
                .map(|p| p.time_to_update(now))
                .unwrap_or(true);
            if !due || cell.is_up_to_date() {
                continue;
            }
            self.refresh(id);
            refreshed += 1;
        }
        if refreshed > 0 {
            trace!(refreshed, "event sink flushed");
        }
        refreshed
    }
}
