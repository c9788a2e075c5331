//! Worker-thread hand-off.
//!
//! The graph is confined to the scene thread. Other threads (device
//! polling, background loading) exchange values with it through a
//! [`SharedField`]: writes are parked in a pending slot until the scene
//! thread's next tick moves them into the graph, and reads see a mirror
//! the scene thread refreshes at the end of every tick.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut scene = Scene::new();
//! let force = scene.graph_mut().sfield("force", 0.0).build()?;
//! let shared = scene.share(force)?;
//!
//! let worker = shared.clone();
//! std::thread::spawn(move || worker.set(1.5));
//!
//! scene.tick(0.016)?; // 1.5 enters the graph here
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::field::{FieldHandle, FieldId, SField};
use crate::graph::FieldGraph;

struct Slot<T> {
    pending: Mutex<Option<T>>,
    mirror: RwLock<T>,
}

/// A field value shared with threads other than the scene thread.
///
/// Cloning gives another handle to the same slot.
pub struct SharedField<T> {
    field: SField<T>,
    slot: Arc<Slot<T>>,
}

impl<T> Clone for SharedField<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone + Send + Sync> SharedField<T> {
    pub(crate) fn new(field: SField<T>, initial: T) -> Self {
        Self {
            field,
            slot: Arc::new(Slot {
                pending: Mutex::new(None),
                mirror: RwLock::new(initial),
            }),
        }
    }

    /// The field in the graph this handle feeds.
    pub fn field(&self) -> SField<T> {
        self.field
    }

    /// Queue a value for the next tick. A later `set` before that tick
    /// replaces it.
    pub fn set(&self, value: T) {
        *self.slot.pending.lock() = Some(value);
    }

    /// The queued value if there is one, else the value the graph held at
    /// the end of the last tick.
    pub fn get(&self) -> T {
        if let Some(pending) = self.slot.pending.lock().as_ref() {
            return pending.clone();
        }
        self.slot.mirror.read().clone()
    }

    /// Whether a value is waiting for the next tick.
    pub fn has_pending(&self) -> bool {
        self.slot.pending.lock().is_some()
    }
}

/// Type-erased view the scene uses to move values across each tick.
pub(crate) trait Transfer {
    fn field(&self) -> FieldId;

    /// Move a queued value into the graph. True if there was one.
    fn transfer_in(&self, graph: &mut FieldGraph) -> Result<bool>;

    /// Copy the graph's current value into the mirror.
    fn mirror_out(&self, graph: &mut FieldGraph) -> Result<()>;
}

impl<T> Transfer for SharedField<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    fn field(&self) -> FieldId {
        self.field.id()
    }

    fn transfer_in(&self, graph: &mut FieldGraph) -> Result<bool> {
        let Some(value) = self.slot.pending.lock().take() else {
            return Ok(false);
        };
        match graph.owner(self.field)? {
            Some(node) => graph.set_value_as(node, self.field, value)?,
            None => graph.set_value(self.field, value)?,
        }
        Ok(true)
    }

    fn mirror_out(&self, graph: &mut FieldGraph) -> Result<()> {
        let value = graph.get(self.field)?;
        *self.slot.mirror.write() = value;
        Ok(())
    }
}
