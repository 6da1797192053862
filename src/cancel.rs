//! Generation counters for last-issued-wins requests.
//!
//! Issuing a ticket supersedes every earlier ticket from the same counter.
//! Work captures its ticket up front and checks it before committing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, superseding all outstanding tickets.
    pub fn issue(&self) -> RunTicket {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        RunTicket {
            generation,
            current: Arc::clone(&self.current),
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while no newer ticket has been issued.
    pub fn is_live(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}
