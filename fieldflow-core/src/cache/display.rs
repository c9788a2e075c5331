//! Display-list cache cells.
//!
//! A display cache is a field that owns a recorded command list instead of
//! a value. Every field that affects its drawing is routed into it; any
//! event from them makes it stale. Each frame the drawing code calls
//! [`FieldGraph::use_cache`], which replays a valid list, rebuilds a stale
//! one once the debounce counter runs out, or draws uncached meanwhile.
//!
//! # Activity
//!
//! Each cache has an activity probe, an `SField<bool>` routed from the
//! scene time. On every tick it reports whether the cache was used since
//! the previous tick, then re-arms. Caches whose probe reads false are
//! dormant and [`FieldGraph::release_dormant_caches`] may drop their lists.
//!
//! # Children
//!
//! A cache whose drawing includes other caches (directly routed, or
//! reached through node-reference fields) builds only when those are
//! valid, otherwise it would record their uncached drawing.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::{FieldError, Result};
use crate::field::{AccessType, FieldHandle, FieldId, FieldType, InputRule, NodeId, SField};
use crate::graph::cell::{Cell, Update};
use crate::graph::{FieldGraph, RouteKind};

use super::backend::RenderTarget;
use super::state::{CacheMode, CacheOutcome, CachePolicy, CacheState, CacheStats, DisplayCache};

/// Handle to a display cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayList {
    id: FieldId,
    probe: SField<bool>,
}

impl DisplayList {
    /// The activity probe; true while the cache is in use.
    pub fn probe(&self) -> SField<bool> {
        self.probe
    }
}

impl FieldHandle for DisplayList {
    fn id(&self) -> FieldId {
        self.id
    }
}

impl From<DisplayList> for FieldId {
    fn from(list: DisplayList) -> FieldId {
        list.id
    }
}

impl FieldGraph {
    /// Create a display cache, optionally as the display cache of `owner`.
    ///
    /// The cache starts empty and builds on its first use. It accepts
    /// routes from fields of any type.
    pub fn create_display_list(
        &mut self,
        name: &str,
        owner: Option<NodeId>,
    ) -> Result<DisplayList> {
        let id = FieldId::next();
        let probe_id = FieldId::next();

        let mut cell = Cell::new(name.to_string(), FieldType::cache(), Box::new(()));
        cell.owner = owner;
        cell.input_rule = InputRule::Unchecked;
        cell.update = Update::Cache;
        cell.cache = Some(Box::new(DisplayCache::new(probe_id)));
        self.insert_cell(id, cell)?;
        if let Some(entry) = owner.and_then(|n| self.nodes.get_mut(&n)) {
            entry.display_cache = Some(id);
        }

        let mut probe = Cell::new(
            format!("{name}.isActive"),
            FieldType::single::<bool>(),
            Box::new(false),
        );
        probe.owner = owner;
        probe.access = AccessType::Output;
        probe.input_rule = InputRule::Unchecked;
        probe.update = Update::ActivityLatch { cache: id };
        probe.auto_update = true;
        self.insert_cell(probe_id, probe)?;

        let time = self.time().id();
        let broadcast = self.break_caches;
        self.connect(time, probe_id, RouteKind::Eventing, false, owner)?;
        self.connect(broadcast, id, RouteKind::Eventing, false, owner)?;

        debug!(cache = %self.full_name(id), "display cache created");
        Ok(DisplayList {
            id,
            probe: SField::from_id(probe_id),
        })
    }

    /// Draw through the cache.
    ///
    /// Replays a valid command list; otherwise rebuilds once the debounce
    /// counter is exhausted and every child cache is ready, else draws
    /// uncached. Backend failures are logged and fall back to drawing
    /// uncached; they never fail the call.
    pub fn use_cache(
        &mut self,
        list: impl FieldHandle,
        target: &mut dyn RenderTarget,
    ) -> Result<CacheOutcome> {
        let id = list.id();
        let policy = self.policy;
        let frame = self.frame();

        let (probe, caching) = {
            let cache = self.display_cache_mut(id)?;
            if !cache.latch {
                cache.latch = true;
                cache.stats.activations += 1;
            }
            (cache.probe, cache.caching(&policy))
        };
        if let Some(cell) = self.cells.get_mut(&probe) {
            cell.value = Box::new(true);
        }

        if !caching {
            self.display_cache_mut(id)?.reset();
            self.render_uncached(id, target);
            return Ok(CacheOutcome::Uncached);
        }

        let (state, broken) = {
            let cache = self.display_cache_mut(id)?;
            (cache.state, cache.broken)
        };

        match state {
            CacheState::Valid => {
                let replayed = self
                    .display_cache_mut(id)?
                    .list
                    .as_ref()
                    .map(|list| list.call());
                match replayed {
                    Some(Ok(())) => Ok(CacheOutcome::Cached),
                    Some(Err(err)) => {
                        warn!(cache = %self.full_name(id), %err, "cached draw failed, dropping list");
                        let cache = self.display_cache_mut(id)?;
                        cache.reset();
                        cache.stats.failures += 1;
                        self.render_uncached(id, target);
                        Ok(CacheOutcome::Uncached)
                    }
                    None => {
                        self.display_cache_mut(id)?.state = CacheState::Empty;
                        self.render_uncached(id, target);
                        Ok(CacheOutcome::Uncached)
                    }
                }
            }
            // Building means a recording of this cache asked to draw it again.
            CacheState::Building | CacheState::Discarded => {
                self.render_uncached(id, target);
                Ok(CacheOutcome::Uncached)
            }
            CacheState::Empty | CacheState::Stale => {
                let due = self.display_cache_mut(id)?.count_down(frame);
                if due && self.children_ready(id, broken) {
                    self.build(id, target)
                } else {
                    self.render_uncached(id, target);
                    Ok(CacheOutcome::Uncached)
                }
            }
        }
    }

    fn build(&mut self, id: FieldId, target: &mut dyn RenderTarget) -> Result<CacheOutcome> {
        {
            let cache = self.display_cache_mut(id)?;
            cache.state = CacheState::Building;
            cache.broken = false;
        }

        let compiled = target.compile(self);
        let policy = self.policy;
        let name = self.full_name(id);

        let Some(cell) = self.cells.get_mut(&id) else {
            return Err(FieldError::UnknownField(id));
        };
        let Some(cache) = cell.cache.as_mut() else {
            return Err(FieldError::NotACache(name));
        };

        match compiled {
            Ok(list) if cache.state != CacheState::Building => {
                // Invalidated while recording; the list is already out of date.
                drop(list);
                debug!(cache = %name, "command list outdated before use, discarded");
                self.render_uncached(id, target);
                Ok(CacheOutcome::Uncached)
            }
            Ok(list) => match list.call() {
                Ok(()) => {
                    cache.list = Some(list);
                    cache.state = CacheState::Valid;
                    cache.stats.builds += 1;
                    cell.event.source = None;
                    debug!(cache = %name, "command list built");
                    Ok(CacheOutcome::Rebuilt)
                }
                Err(err) => {
                    drop(list);
                    warn!(cache = %name, %err, "new command list failed to replay");
                    cache.state = CacheState::Empty;
                    cache.stats.failures += 1;
                    cache.counter = cache.delay(&policy);
                    self.render_uncached(id, target);
                    Ok(CacheOutcome::Uncached)
                }
            },
            Err(err) => {
                warn!(cache = %name, %err, "building command list failed, drawing uncached");
                cache.state = CacheState::Empty;
                cache.stats.failures += 1;
                cache.counter = cache.delay(&policy);
                self.render_uncached(id, target);
                Ok(CacheOutcome::Uncached)
            }
        }
    }

    fn render_uncached(&mut self, id: FieldId, target: &mut dyn RenderTarget) {
        if let Err(err) = target.render(self) {
            warn!(cache = %self.full_name(id), %err, "uncached draw failed");
        }
    }

    /// Whether every child cache allows building `id` now.
    ///
    /// Right after an invalidation every child must be valid. Otherwise
    /// only children in use count, so a dormant child does not hold the
    /// parent back.
    pub(crate) fn children_ready(&mut self, id: FieldId, broken: bool) -> bool {
        let sources: SmallVec<[FieldId; 8]> = match self.cells.get(&id) {
            Some(cell) => cell.routes_in.iter().copied().collect(),
            None => return false,
        };

        let mut children: SmallVec<[FieldId; 8]> = SmallVec::new();
        for source in sources {
            if source == self.break_caches {
                continue;
            }
            let is_cache = self
                .cells
                .get(&source)
                .map(|c| c.cache.is_some())
                .unwrap_or(false);
            if is_cache {
                children.push(source);
                continue;
            }

            self.refresh(source);
            let Some(cell) = self.cells.get(&source) else {
                continue;
            };
            let value = cell.value.as_any();
            let nodes: SmallVec<[NodeId; 8]> =
                if let Some(node) = value.downcast_ref::<Option<NodeId>>() {
                    node.iter().copied().collect()
                } else if let Some(nodes) = value.downcast_ref::<Vec<NodeId>>() {
                    nodes.iter().copied().collect()
                } else {
                    SmallVec::new()
                };
            children.extend(
                nodes
                    .into_iter()
                    .filter_map(|n| self.nodes.get(&n).and_then(|e| e.display_cache)),
            );
        }

        children.into_iter().all(|child| {
            let Some(cell) = self.cells.get(&child) else {
                return true;
            };
            let Some(cache) = cell.cache.as_ref() else {
                return true;
            };
            if cache.state == CacheState::Valid {
                return true;
            }
            if broken {
                return false;
            }
            let active = self
                .cells
                .get(&cache.probe)
                .and_then(|p| p.value.as_any().downcast_ref::<bool>().copied())
                .unwrap_or(false);
            !active
        })
    }

    /// Force the cache stale, as if an input had changed.
    pub fn invalidate(&mut self, list: impl FieldHandle) -> Result<()> {
        let id = list.id();
        self.display_cache_mut(id)?;
        let stamp = self.next_stamp();
        self.propagate_event(id, id, stamp);
        Ok(())
    }

    /// Frames without change a stale cache waits before rebuilding.
    pub fn set_debounce_frames(&mut self, list: impl FieldHandle, frames: u32) -> Result<()> {
        let cache = self.display_cache_mut(list.id())?;
        cache.delay = Some(frames);
        cache.counter = cache.counter.min(frames);
        Ok(())
    }

    pub fn set_cache_mode(&mut self, list: impl FieldHandle, mode: CacheMode) -> Result<()> {
        let cache = self.display_cache_mut(list.id())?;
        cache.mode = mode;
        if mode == CacheMode::Off {
            cache.reset();
        }
        Ok(())
    }

    pub fn cache_state(&self, list: impl FieldHandle) -> Result<CacheState> {
        Ok(self.display_cache(list.id())?.state)
    }

    pub fn cache_stats(&self, list: impl FieldHandle) -> Result<CacheStats> {
        Ok(self.display_cache(list.id())?.stats())
    }

    /// Whether the cache was used this frame or the one before.
    pub fn is_active(&self, list: impl FieldHandle) -> Result<bool> {
        let probe = self.display_cache(list.id())?.probe;
        Ok(self
            .cells
            .get(&probe)
            .and_then(|p| p.value.as_any().downcast_ref::<bool>().copied())
            .unwrap_or(false))
    }

    pub fn activity_probe(&self, list: impl FieldHandle) -> Result<SField<bool>> {
        Ok(SField::from_id(self.display_cache(list.id())?.probe))
    }

    /// Make every cache stale.
    pub fn break_all_caches(&mut self) {
        let broadcast = self.break_caches;
        debug!("breaking all caches");
        self.start_event(broadcast, true);
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.policy
    }

    /// Replace the scene-wide policy. Every cache is broken so the new
    /// settings apply from the next use on.
    pub fn set_cache_policy(&mut self, policy: CachePolicy) {
        self.policy = policy;
        self.break_all_caches();
    }

    /// Drop the command lists of caches not used since the last tick.
    ///
    /// Returns how many lists were released.
    pub fn release_dormant_caches(&mut self) -> usize {
        let dormant: SmallVec<[FieldId; 8]> = self
            .cells
            .iter()
            .filter_map(|(&id, cell)| {
                let cache = cell.cache.as_ref()?;
                cache.list.as_ref()?;
                let active = self
                    .cells
                    .get(&cache.probe)
                    .and_then(|p| p.value.as_any().downcast_ref::<bool>().copied())
                    .unwrap_or(false);
                (!active).then_some(id)
            })
            .collect();

        for &id in &dormant {
            if let Some(cache) = self.cells.get_mut(&id).and_then(|c| c.cache.as_mut()) {
                cache.reset();
            }
            debug!(cache = %self.full_name(id), "dormant command list released");
        }
        dormant.len()
    }

    fn display_cache(&self, id: FieldId) -> Result<&DisplayCache> {
        let cell = self.cell(id)?;
        match cell.cache.as_deref() {
            Some(cache) => Ok(cache),
            None => Err(FieldError::NotACache(self.full_name(id))),
        }
    }

    fn display_cache_mut(&mut self, id: FieldId) -> Result<&mut DisplayCache> {
        if self.cell(id)?.cache.is_none() {
            return Err(FieldError::NotACache(self.full_name(id)));
        }
        match self.cells.get_mut(&id).and_then(|c| c.cache.as_deref_mut()) {
            Some(cache) => Ok(cache),
            None => Err(FieldError::UnknownField(id)),
        }
    }
}
