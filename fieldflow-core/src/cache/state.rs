//! Display cache state.
//!
//! ```text
//!   Empty ──use──► Building ──ok──► Valid
//!     ▲               │               │
//!     └────failed─────┘             event
//!                                     ▼
//!   Discarded ◄──remove── Stale ──counter 0──► Building
//! ```
//!
//! Any event reaching the cache releases the command list and resets the
//! debounce counter. The counter then drops by one per later frame in
//! which the cache is used; a rebuild is attempted once it reaches zero.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::field::FieldId;

use super::backend::CommandList;

/// Whether a cache records command lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheMode {
    On,
    Off,
    /// Follow the graph's [`CachePolicy`].
    #[default]
    Options,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheState {
    /// No command list.
    Empty,
    /// A command list is being recorded.
    Building,
    /// The command list matches the current inputs.
    Valid,
    /// Inputs changed since the last build; waiting out the debounce.
    Stale,
    /// The owner is gone.
    Discarded,
}

/// What a [`use_cache`](crate::FieldGraph::use_cache) call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Replayed the existing command list.
    Cached,
    /// Recorded a new command list and replayed it.
    Rebuilt,
    /// Drew without a command list.
    Uncached,
}

/// Scene-wide caching settings followed by caches in
/// [`CacheMode::Options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub caching: bool,
    /// Frames without change before a stale cache rebuilds.
    pub delay: u32,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            caching: true,
            delay: 3,
        }
    }
}

/// Counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Successful builds.
    pub builds: u64,
    /// Builds or replays the backend refused.
    pub failures: u64,
    /// Frames in which the cache was used.
    pub activations: u64,
    /// Current debounce counter.
    pub counter: u32,
}

pub(crate) struct DisplayCache {
    pub list: Option<Box<dyn CommandList>>,
    pub state: CacheState,
    pub mode: CacheMode,
    /// Per-cache debounce; the policy delay when unset.
    pub delay: Option<u32>,
    pub counter: u32,
    /// Fields behind the current staleness.
    pub causes: IndexSet<FieldId>,
    /// Invalidated since the last build attempt.
    pub broken: bool,
    /// Used since the probe last looked.
    pub latch: bool,
    pub probe: FieldId,
    /// Frame of the last debounce step.
    pub last_tick: Option<u64>,
    pub stats: CacheStats,
}

impl DisplayCache {
    pub(crate) fn new(probe: FieldId) -> Self {
        Self {
            list: None,
            state: CacheState::Empty,
            mode: CacheMode::default(),
            delay: None,
            counter: 0,
            causes: IndexSet::new(),
            broken: false,
            latch: false,
            probe,
            last_tick: None,
            stats: CacheStats::default(),
        }
    }

    pub(crate) fn delay(&self, policy: &CachePolicy) -> u32 {
        self.delay.unwrap_or(policy.delay)
    }

    pub(crate) fn caching(&self, policy: &CachePolicy) -> bool {
        match self.mode {
            CacheMode::On => true,
            CacheMode::Off => false,
            CacheMode::Options => policy.caching,
        }
    }

    /// An event from `cause` arrived during `frame`.
    ///
    /// A run of events without a rebuild in between accumulates causes; the
    /// first event after a rebuild starts a new set. The frame of the event
    /// does not count towards the debounce.
    pub(crate) fn mark_stale(&mut self, cause: FieldId, policy_delay: u32, frame: u64) {
        self.release();
        if self.state != CacheState::Stale {
            self.causes.clear();
        }
        self.causes.insert(cause);
        if self.state != CacheState::Discarded {
            self.state = CacheState::Stale;
        }
        self.counter = self.delay.unwrap_or(policy_delay);
        self.last_tick = Some(frame);
        self.broken = true;
    }

    /// Drop the command list, releasing its resource.
    pub(crate) fn release(&mut self) {
        if self.list.take().is_some() {
            trace!("command list released");
        }
    }

    /// Release the list and leave nothing to rebuild from.
    pub(crate) fn reset(&mut self) {
        self.release();
        if self.state != CacheState::Discarded {
            self.state = CacheState::Empty;
        }
    }

    pub(crate) fn discard(&mut self) {
        self.release();
        self.state = CacheState::Discarded;
    }

    /// Step the debounce counter once per frame. True when it reached zero.
    pub(crate) fn count_down(&mut self, frame: u64) -> bool {
        if self.last_tick != Some(frame) {
            self.last_tick = Some(frame);
            self.counter = self.counter.saturating_sub(1);
        }
        self.counter == 0
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            counter: self.counter,
            ..self.stats
        }
    }
}
