//! Pending claim queue
//!
//! Unbounded FIFO of claims gossiped during the current pulse. Every claim
//! leaves the queue exactly once, either through `pop` or `drain`.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::network::claim::Claim;

#[derive(Debug, Default)]
pub struct ClaimQueue {
    claims: Mutex<VecDeque<Claim>>,
}

impl ClaimQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, claim: Claim) {
        self.claims.lock().push_back(claim);
    }

    pub fn pop(&self) -> Option<Claim> {
        self.claims.lock().pop_front()
    }

    /// Copy of the oldest queued claim
    pub fn front(&self) -> Option<Claim> {
        self.claims.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.claims.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.lock().is_empty()
    }

    /// Put claims back ahead of everything queued, keeping their order
    pub fn requeue_front(&self, claims: Vec<Claim>) {
        let mut queue = self.claims.lock();
        for claim in claims.into_iter().rev() {
            queue.push_front(claim);
        }
    }

    /// Remove and return every queued claim in insertion order
    pub fn drain(&self) -> Vec<Claim> {
        let mut claims = self.claims.lock();
        claims.drain(..).collect()
    }
}
