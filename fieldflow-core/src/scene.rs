//! Frame clock driver.
//!
//! [`Scene`] wraps a [`FieldGraph`] with the once-per-frame work around
//! it. Each [`tick`](Scene::tick):
//!
//! 1. moves values queued by worker threads into the graph,
//! 2. pushes the new time into the time field, which re-arms cache
//!    activity probes and seeds all time-driven recomputation,
//! 3. flushes the event sink,
//! 4. mirrors shared fields back out for worker threads to read.

use std::fmt::Debug;
use std::path::Path;

use tracing::{trace, warn};

use crate::config::EngineConfig;
use crate::error::{ConfigError, Result};
use crate::field::SField;
use crate::graph::FieldGraph;
use crate::handoff::{SharedField, Transfer};

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub frame: u64,
    /// Time pushed into the graph, after clamping.
    pub time: f64,
    /// Values moved in from worker threads.
    pub transferred: usize,
    /// Fields the event sink recomputed.
    pub refreshed: usize,
}

pub struct Scene {
    graph: FieldGraph,
    config: EngineConfig,
    shared: Vec<Box<dyn Transfer>>,
    last_time: Option<f64>,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            graph: FieldGraph::with_config(&config),
            config,
            shared: Vec::new(),
            last_time: None,
        }
    }

    /// Create a scene configured from a JSON file.
    pub fn from_config_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::with_config(EngineConfig::from_path(path)?))
    }

    pub fn graph(&self) -> &FieldGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut FieldGraph {
        &mut self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Make `field` writable and readable from other threads.
    pub fn share<T>(&mut self, field: SField<T>) -> Result<SharedField<T>>
    where
        T: Clone + Debug + Send + Sync + 'static,
    {
        let initial = self.graph.get(field)?;
        let shared = SharedField::new(field, initial);
        self.shared.push(Box::new(shared.clone()));
        Ok(shared)
    }

    /// Run one frame at scene time `now`.
    ///
    /// Time never runs backwards: a `now` earlier than the previous tick
    /// is logged and replaced by the previous time.
    pub fn tick(&mut self, now: f64) -> Result<TickReport> {
        self.shared.retain(|s| self.graph.contains(s.field()));

        let mut transferred = 0;
        for shared in &self.shared {
            if shared.transfer_in(&mut self.graph)? {
                transferred += 1;
            }
        }

        let time = match self.last_time {
            Some(last) if now < last => {
                warn!(now, last, "clock went backwards, holding time");
                last
            }
            _ => now,
        };
        self.last_time = Some(time);
        self.graph.advance_frame(time)?;
        let refreshed = self.graph.flush_event_sink(time);

        for shared in &self.shared {
            shared.mirror_out(&mut self.graph)?;
        }

        let report = TickReport {
            frame: self.graph.frame(),
            time,
            transferred,
            refreshed,
        };
        trace!(?report, "tick");
        Ok(report)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
