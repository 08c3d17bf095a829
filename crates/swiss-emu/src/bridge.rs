//! The debug bridge: an append-only, ordered event channel from the
//! running machine to its host.
//!
//! Single producer (the runtime), single consumer (the host). The queue
//! is bounded with an explicit drop-oldest policy: an overflow never
//! blocks emulation and is never silent — the next drain carries an
//! [`EventCategory::Overflow`] event with the dropped count, and sequence
//! numbers let the host spot the gap directly.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Default bound on queued events.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Severity/category tag on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Load, start, halt, host-stop transitions.
    Lifecycle,
    /// The program's `PRINT` debug instruction.
    Print,
    /// A terminal execution fault.
    Fault,
    /// Events were dropped under back-pressure.
    Overflow,
}

/// Register/counter snapshot attached to fault events and available for
/// host inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub pc: u32,
    pub stack_depth: u32,
    pub call_depth: u32,
    pub cycles: u64,
}

/// Optional structured payload on an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    /// Values printed alongside a `PRINT` message, in source order.
    Values(Vec<u16>),
    /// Machine state at the moment of the event.
    Snapshot(CpuSnapshot),
}

/// One record in the debug stream. Never mutated after emission, never
/// reordered, never coalesced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugEvent {
    /// Monotonically increasing; gaps mean dropped events.
    pub seq: u64,
    /// Emulator clock (instruction cycles) at emission.
    pub cycles: u64,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

struct State {
    queue: VecDeque<DebugEvent>,
    next_seq: u64,
    dropped: u64,
}

struct Shared {
    state: Mutex<State>,
    ready: Condvar,
    capacity: usize,
}

/// Producer half, owned by the machine.
pub struct EventSink {
    shared: Arc<Shared>,
}

/// Consumer half, owned by the host.
pub struct EventSource {
    shared: Arc<Shared>,
}

/// Create a bounded bridge.
pub fn channel(capacity: usize) -> (EventSink, EventSource) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(capacity),
            next_seq: 0,
            dropped: 0,
        }),
        ready: Condvar::new(),
        capacity,
    });
    (
        EventSink {
            shared: Arc::clone(&shared),
        },
        EventSource { shared },
    )
}

impl EventSink {
    /// Append an event. Never blocks: a full queue drops its oldest entry
    /// and counts the loss.
    pub fn emit(
        &self,
        cycles: u64,
        category: EventCategory,
        message: impl Into<String>,
        payload: Option<EventPayload>,
    ) {
        let mut state = self.shared.state.lock().expect("bridge lock poisoned");
        let seq = state.next_seq;
        state.next_seq += 1;
        if state.queue.len() == self.shared.capacity {
            state.queue.pop_front();
            state.dropped += 1;
        }
        state.queue.push_back(DebugEvent {
            seq,
            cycles,
            category,
            message: message.into(),
            payload,
        });
        drop(state);
        self.shared.ready.notify_one();
    }
}

impl EventSource {
    /// Take every queued event, in arrival order. Non-blocking.
    ///
    /// If events were dropped since the last drain, the batch ends with a
    /// freshly sequenced [`EventCategory::Overflow`] event carrying the
    /// count, so loss is always visible.
    pub fn drain(&self) -> Vec<DebugEvent> {
        let mut state = self.shared.state.lock().expect("bridge lock poisoned");
        Self::collect(&mut state)
    }

    /// Like [`EventSource::drain`], but waits up to `timeout` for at least
    /// one event. The producer is never stalled by a waiting consumer.
    pub fn drain_timeout(&self, timeout: Duration) -> Vec<DebugEvent> {
        let mut state = self.shared.state.lock().expect("bridge lock poisoned");
        if state.queue.is_empty() && state.dropped == 0 {
            let (guard, _) = self
                .shared
                .ready
                .wait_timeout(state, timeout)
                .expect("bridge lock poisoned");
            state = guard;
        }
        Self::collect(&mut state)
    }

    fn collect(state: &mut State) -> Vec<DebugEvent> {
        let mut batch: Vec<DebugEvent> = state.queue.drain(..).collect();
        if state.dropped > 0 {
            let seq = state.next_seq;
            state.next_seq += 1;
            let cycles = batch.last().map(|e| e.cycles).unwrap_or(0);
            batch.push(DebugEvent {
                seq,
                cycles,
                category: EventCategory::Overflow,
                message: format!("{} event(s) dropped under back-pressure", state.dropped),
                payload: None,
            });
            state.dropped = 0;
        }
        batch
    }
}
