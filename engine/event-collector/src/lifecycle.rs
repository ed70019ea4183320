// Lifecycle management for the event producer

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Producer lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerState {
    Uninitialized,
    Ready,
    Draining,
    Closed,
}

impl ProducerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProducerState::Uninitialized,
            1 => ProducerState::Ready,
            2 => ProducerState::Draining,
            _ => ProducerState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ProducerState::Uninitialized => 0,
            ProducerState::Ready => 1,
            ProducerState::Draining => 2,
            ProducerState::Closed => 3,
        }
    }

    /// Whether intake has stopped for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProducerState::Draining | ProducerState::Closed)
    }
}

/// Atomic state machine: Uninitialized -> Ready -> Draining -> Closed
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { state: AtomicU8::new(ProducerState::Uninitialized.as_u8()) }
    }

    pub fn state(&self) -> ProducerState {
        ProducerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Uninitialized -> Ready; false from any other state
    pub fn mark_ready(&self) -> bool {
        self.transition(ProducerState::Uninitialized, ProducerState::Ready)
    }

    /// Enter Draining from Uninitialized or Ready
    ///
    /// Returns false when another caller already started closing.
    pub fn begin_drain(&self) -> bool {
        self.transition(ProducerState::Ready, ProducerState::Draining)
            || self.transition(ProducerState::Uninitialized, ProducerState::Draining)
    }

    pub fn mark_closed(&self) {
        self.state.store(ProducerState::Closed.as_u8(), Ordering::Release);
    }

    fn transition(&self, from: ProducerState, to: ProducerState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
