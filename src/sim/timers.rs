//! Cancellable deferred events on the simulation clock

use serde::{Deserialize, Serialize};

/// Handle returned by [`Timers::schedule`]
pub type TimerId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pending<E> {
    id: TimerId,
    event: E,
    remaining: f32,
}

/// Events waiting for simulation time to pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timers<E> {
    pending: Vec<Pending<E>>,
    next_id: TimerId,
}

impl<E> Default for Timers<E> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            next_id: 1,
        }
    }
}

impl<E: Clone + PartialEq> Timers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `event` after `delay` seconds of simulation time
    pub fn schedule(&mut self, event: E, delay: f32) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(Pending {
            id,
            event,
            remaining: delay.max(0.0),
        });
        id
    }

    /// Returns false if the timer already fired or was cancelled
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }

    /// Cancel every pending timer carrying `event`
    pub fn cancel_event(&mut self, event: &E) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| &p.event != event);
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, event: &E) -> bool {
        self.pending.iter().any(|p| &p.event == event)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Advance by `dt` and return the events that came due, in schedule order
    pub fn advance(&mut self, dt: f32) -> Vec<E> {
        let mut fired = Vec::new();
        self.pending.retain_mut(|p| {
            p.remaining -= dt;
            if p.remaining <= 0.0 {
                fired.push(p.event.clone());
                false
            } else {
                true
            }
        });
        fired
    }
}
