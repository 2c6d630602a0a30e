//! Marks sessions stale when a holder's special roles change.
//!
//! A stale session keeps its old authorization until it is refreshed; the
//! tracker only records which watched holders changed.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use scholaris_auth::{ResolvedSession, SpecialRoleEvent};
use scholaris_core::IdentityId;
use scholaris_events::{EventBus, Subscription};

#[derive(Debug, Default)]
struct Marks {
    watched: HashSet<IdentityId>,
    stale: HashSet<IdentityId>,
}

#[derive(Debug)]
pub struct SessionTracker {
    subscription: Mutex<Subscription<SpecialRoleEvent>>,
    marks: Mutex<Marks>,
}

impl SessionTracker {
    /// Subscribe to `bus`. Changes published before this call are not seen.
    pub fn new<B: EventBus<SpecialRoleEvent>>(bus: &B) -> Self {
        Self {
            subscription: Mutex::new(bus.subscribe()),
            marks: Mutex::new(Marks::default()),
        }
    }

    /// Track the login identity and acting sub-account of `session`.
    ///
    /// Replaces the previously watched holders; their stale marks are dropped.
    pub fn watch(&self, session: &ResolvedSession) {
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        marks.watched = HashSet::from([session.identity().id, session.acting_id()]);
        let Marks { watched, stale } = &mut *marks;
        stale.retain(|id| watched.contains(id));
    }

    /// Drain queued events, marking watched holders stale. Returns how many
    /// events were read.
    pub fn poll(&self) -> usize {
        let events = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain();
        if events.is_empty() {
            return 0;
        }

        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        for event in &events {
            let holder = event.holder_id();
            if marks.watched.contains(&holder) {
                debug!(holder_id = %holder, event = ?event, "holder marked stale");
                marks.stale.insert(holder);
            }
        }
        events.len()
    }

    /// Whether the login identity or the acting sub-account changed.
    pub fn is_stale(&self, session: &ResolvedSession) -> bool {
        self.poll();
        let marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        marks.stale.contains(&session.identity().id) || marks.stale.contains(&session.acting_id())
    }

    /// Forget the stale marks covering `session` after it was re-resolved.
    pub fn mark_fresh(&self, session: &ResolvedSession) {
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        marks.stale.remove(&session.identity().id);
        marks.stale.remove(&session.acting_id());
    }

    #[cfg(test)]
    fn stale_count(&self) -> usize {
        self.marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stale
            .len()
    }
}
