//! Value monitors.
//!
//! Callbacks run synchronously during `update` whenever a watched cell's
//! value changes. A callback may not touch the sheet directly; it queues
//! assignments on [`Pending`], which the solver applies before the update
//! returns.

use std::collections::HashMap;

use adam_engine::engine::{Name, Value};

pub type MonitorId = usize;

pub type MonitorCallback = Box<dyn FnMut(&Value, &mut Pending) + Send>;

/// Assignments queued by monitor callbacks.
#[derive(Debug, Default)]
pub struct Pending {
    sets: Vec<(Name, Value)>,
}

impl Pending {
    pub fn set(&mut self, name: impl Into<Name>, value: impl Into<Value>) {
        self.sets.push((name.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<(Name, Value)> {
        std::mem::take(&mut self.sets)
    }
}

#[derive(Default)]
pub(crate) struct MonitorRegistry {
    next_id: MonitorId,
    watchers: HashMap<Name, Vec<(MonitorId, MonitorCallback)>>,
}

impl MonitorRegistry {
    pub fn register(&mut self, name: Name, callback: MonitorCallback) -> MonitorId {
        let id = self.next_id;
        self.next_id += 1;
        self.watchers.entry(name).or_default().push((id, callback));
        id
    }

    pub fn remove(&mut self, id: MonitorId) -> bool {
        for callbacks in self.watchers.values_mut() {
            if let Some(index) = callbacks.iter().position(|(cb_id, _)| *cb_id == id) {
                callbacks.remove(index);
                return true;
            }
        }
        false
    }

    /// Invoke every callback watching `name`, in registration order.
    pub fn notify(&mut self, name: Name, value: &Value, pending: &mut Pending) -> usize {
        let Some(callbacks) = self.watchers.get_mut(&name) else {
            return 0;
        };
        for (_, callback) in callbacks.iter_mut() {
            callback(value, pending);
        }
        callbacks.len()
    }

    pub fn count(&self, name: Name) -> usize {
        self.watchers.get(&name).map_or(0, Vec::len)
    }
}
