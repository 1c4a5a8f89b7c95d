//! Live calls by room name.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::session::{CallHandle, CallSnapshot};

enum Slot {
    /// The agent is joining the room
    Pending,
    Active(CallHandle),
}

/// Why a room could not be reserved.
#[derive(Debug)]
pub enum ReserveError {
    /// A live call already runs in the room
    Active(CallHandle),
    /// Another dispatch for the room is still joining
    Pending,
}

/// Concurrent map of call id to running call.
///
/// A room holds at most one live call. Finished calls remove themselves.
#[derive(Clone, Default)]
pub struct CallRegistry {
    calls: Arc<DashMap<String, Slot>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `call_id` for a dispatch that is about to start.
    ///
    /// The claim is released when the returned reservation is dropped
    /// without being activated.
    pub fn reserve(&self, call_id: &str) -> Result<Reservation, ReserveError> {
        match self.calls.entry(call_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Slot::Active(handle) = entry.get()
                    && !handle.is_finished()
                {
                    return Err(ReserveError::Active(handle.clone()));
                }
                if matches!(entry.get(), Slot::Pending) {
                    return Err(ReserveError::Pending);
                }
                // The previous call in this room has finished
                entry.insert(Slot::Pending);
                Ok(self.reservation(call_id))
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::Pending);
                Ok(self.reservation(call_id))
            }
        }
    }

    /// Running call for `call_id`
    pub fn get(&self, call_id: &str) -> Option<CallHandle> {
        self.calls.get(call_id).and_then(|slot| match slot.value() {
            Slot::Active(handle) => Some(handle.clone()),
            Slot::Pending => None,
        })
    }

    pub fn list(&self) -> Vec<CallSnapshot> {
        let mut snapshots: Vec<CallSnapshot> = self
            .calls
            .iter()
            .filter_map(|slot| match slot.value() {
                Slot::Active(handle) => Some(handle.snapshot()),
                Slot::Pending => None,
            })
            .collect();
        snapshots.sort_by(|a, b| a.started_at_ms.cmp(&b.started_at_ms));
        snapshots
    }

    pub fn active_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Active(handle) if !handle.is_finished()))
            .count()
    }

    fn reservation(&self, call_id: &str) -> Reservation {
        Reservation {
            calls: self.calls.clone(),
            call_id: call_id.to_string(),
            activated: false,
        }
    }
}

/// Claim on a room, held while the agent joins it.
pub struct Reservation {
    calls: Arc<DashMap<String, Slot>>,
    call_id: String,
    activated: bool,
}

impl Reservation {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Publish the running call. It is removed again once it finishes.
    pub fn activate(mut self, handle: CallHandle) {
        self.activated = true;
        self.calls
            .insert(self.call_id.clone(), Slot::Active(handle.clone()));

        let calls = self.calls.clone();
        let call_id = self.call_id.clone();
        tokio::spawn(async move {
            handle.wait_terminated().await;
            let removed = calls.remove_if(&call_id, |_, slot| {
                matches!(slot, Slot::Active(current) if current.session_id() == handle.session_id())
            });
            if removed.is_some() {
                debug!(call_id = %call_id, "Call removed from registry");
            }
        });
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.activated {
            self.calls
                .remove_if(&self.call_id, |_, slot| matches!(slot, Slot::Pending));
        }
    }
}
