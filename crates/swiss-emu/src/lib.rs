//! Swiss emulator runtime.
//!
//! Loads a cartridge image, executes it on the console's virtual machine,
//! and streams ordered [`bridge::DebugEvent`]s to the host. The runtime
//! owns its execution state for the lifetime of one session and is torn
//! down independently of the project that produced the cartridge.

pub mod bridge;
pub mod machine;

pub use bridge::{
    channel, CpuSnapshot, DebugEvent, EventCategory, EventPayload, EventSink, EventSource,
    DEFAULT_EVENT_CAPACITY,
};
pub use machine::{Fault, HaltReason, Machine, Status, StopHandle, CYCLES_PER_FRAME};
