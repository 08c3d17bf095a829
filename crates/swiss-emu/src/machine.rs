//! The console virtual machine.
//!
//! State machine over one loaded cartridge:
//! `Loaded → Running → Halted`, with "idle" being the absence of a
//! machine. Execution yields at a bounded cadence (at most
//! [`CYCLES_PER_FRAME`] instructions per [`Machine::run_frame`] call) so
//! the host can interleave event draining with execution — a runaway
//! program can never block the host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use swiss_types::{CartridgeImage, ImageError, Op, MEMORY_SIZE, RESOURCE_BASE};

use crate::bridge::{
    channel, CpuSnapshot, EventCategory, EventPayload, EventSink, EventSource,
    DEFAULT_EVENT_CAPACITY,
};

/// Instruction budget per frame: the mandatory yield boundary.
pub const CYCLES_PER_FRAME: u64 = 10_000;

const STACK_LIMIT: usize = 256;
const CALL_LIMIT: usize = 64;

/// Where the machine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Cartridge validated and mapped; not yet executing.
    Loaded,
    Running,
    Halted,
}

/// Why a halted machine halted. Every halt is visible through the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// `HALT` executed or the entry subroutine returned.
    Completed,
    /// A terminal execution fault.
    Fault(Fault),
    /// The host requested a stop.
    HostStop,
}

/// Terminal execution faults. Never silently swallowed and never a host
/// crash: each one halts the machine and emits a fault event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("illegal opcode {0:#04x}")]
    IllegalOpcode(u8),

    #[error("instruction truncated at end of code segment")]
    TruncatedInstruction,

    #[error("jump target {0:#x} outside the code segment")]
    JumpOutOfRange(u32),

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("operand stack overflow")]
    StackOverflow,

    #[error("call depth limit exceeded")]
    CallDepthExceeded,

    #[error("division by zero")]
    DivideByZero,

    #[error("memory access at {0:#06x} out of bounds")]
    MemoryOutOfRange(u32),

    #[error("print message outside the code segment")]
    BadPrintString,
}

/// Cloneable cancellation flag. Any thread may request a stop; the
/// machine honours it at the next yield boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

enum Flow {
    Continue,
    Sleep,
    Halt,
}

/// One emulator session over one cartridge.
pub struct Machine {
    status: Status,
    halt_reason: Option<HaltReason>,
    code: Vec<u8>,
    pc: usize,
    memory: Vec<u8>,
    stack: Vec<u16>,
    frames: Vec<usize>,
    cycles: u64,
    events: EventSink,
    stop: StopHandle,
}

impl Machine {
    /// Validate a cartridge and map it into a fresh machine.
    ///
    /// Returns the machine (in `Loaded`) together with the host's end of
    /// the debug bridge.
    pub fn load(bytes: &[u8]) -> Result<(Machine, EventSource), ImageError> {
        Self::load_with_capacity(bytes, DEFAULT_EVENT_CAPACITY)
    }

    /// [`Machine::load`] with an explicit debug-bridge bound.
    pub fn load_with_capacity(
        bytes: &[u8],
        event_capacity: usize,
    ) -> Result<(Machine, EventSource), ImageError> {
        let image = CartridgeImage::from_bytes(bytes)?;

        let window = (MEMORY_SIZE - RESOURCE_BASE as usize) as u32;
        let needed: u32 = image.resource_table.iter().map(|e| e.length).sum();
        if needed > window {
            return Err(ImageError::ResourceWindowOverflow { needed, window });
        }

        let mut memory = vec![0u8; MEMORY_SIZE];
        let mut at = RESOURCE_BASE as usize;
        for entry in &image.resource_table {
            let payload = image.payload(entry);
            memory[at..at + payload.len()].copy_from_slice(payload);
            at += payload.len();
        }

        let (sink, source) = channel(event_capacity);
        let machine = Machine {
            status: Status::Loaded,
            halt_reason: None,
            pc: image.entry_offset as usize,
            code: image.code,
            memory,
            stack: Vec::with_capacity(STACK_LIMIT),
            frames: Vec::with_capacity(CALL_LIMIT),
            cycles: 0,
            events: sink,
            stop: StopHandle::default(),
        };
        machine.events.emit(
            0,
            EventCategory::Lifecycle,
            format!(
                "cartridge loaded: {} code byte(s), {} resource(s)",
                machine.code.len(),
                image.resource_table.len()
            ),
            None,
        );
        Ok((machine, source))
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        self.halt_reason.as_ref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Host-visible machine state.
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            pc: self.pc as u32,
            stack_depth: self.stack.len() as u32,
            call_depth: self.frames.len() as u32,
            cycles: self.cycles,
        }
    }

    /// Raw memory, for the host's inspection panels.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> Status {
        if self.status == Status::Halted {
            return self.status;
        }
        if self.stop.is_requested() {
            return self.halt(HaltReason::HostStop);
        }
        self.start_if_loaded();
        match self.exec_one() {
            Ok(Flow::Halt) => self.halt(HaltReason::Completed),
            Ok(_) => self.status,
            Err(fault) => self.halt(HaltReason::Fault(fault)),
        }
    }

    /// Execute until the frame budget, a `SLEEP`, a halt, or a host stop.
    ///
    /// Always returns within [`CYCLES_PER_FRAME`] instructions — the yield
    /// boundary the host relies on.
    pub fn run_frame(&mut self) -> Status {
        if self.status == Status::Halted {
            return self.status;
        }
        if self.stop.is_requested() {
            return self.halt(HaltReason::HostStop);
        }
        self.start_if_loaded();
        for _ in 0..CYCLES_PER_FRAME {
            match self.exec_one() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Sleep) => return self.status,
                Ok(Flow::Halt) => return self.halt(HaltReason::Completed),
                Err(fault) => return self.halt(HaltReason::Fault(fault)),
            }
        }
        self.status
    }

    fn start_if_loaded(&mut self) {
        if self.status == Status::Loaded {
            self.status = Status::Running;
            self.events
                .emit(self.cycles, EventCategory::Lifecycle, "program started", None);
        }
    }

    fn halt(&mut self, reason: HaltReason) -> Status {
        self.status = Status::Halted;
        match &reason {
            HaltReason::Completed => {
                self.events
                    .emit(self.cycles, EventCategory::Lifecycle, "program halted", None);
            }
            HaltReason::Fault(fault) => {
                self.events.emit(
                    self.cycles,
                    EventCategory::Fault,
                    fault.to_string(),
                    Some(EventPayload::Snapshot(self.snapshot())),
                );
            }
            HaltReason::HostStop => {
                self.events.emit(
                    self.cycles,
                    EventCategory::Lifecycle,
                    "stopped by host",
                    None,
                );
            }
        }
        self.halt_reason = Some(reason);
        self.status
    }

    // ── Instruction execution ────────────────────────────────────────

    fn exec_one(&mut self) -> Result<Flow, Fault> {
        let byte = *self.code.get(self.pc).ok_or(Fault::TruncatedInstruction)?;
        let op = Op::from_byte(byte).ok_or(Fault::IllegalOpcode(byte))?;
        if self.pc + 1 + op.operand_len() > self.code.len() {
            return Err(Fault::TruncatedInstruction);
        }
        let operands = self.pc + 1;
        self.pc = operands + op.operand_len();
        self.cycles += 1;

        match op {
            Op::Halt => return Ok(Flow::Halt),
            Op::Push => {
                let value = self.read_operand_u16(operands);
                self.push(value)?;
            }
            Op::LoadGlobal => {
                let addr = self.read_operand_u16(operands);
                let value = self.load_word(addr as u32)?;
                self.push(value)?;
            }
            Op::StoreGlobal => {
                let addr = self.read_operand_u16(operands);
                let value = self.pop()?;
                self.store_word(addr as u32, value)?;
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Eq | Op::Ne | Op::Lt
            | Op::Gt | Op::Le | Op::Ge | Op::And | Op::Or => {
                let b = self.pop()? as i16;
                let a = self.pop()? as i16;
                let value: i16 = match op {
                    Op::Add => a.wrapping_add(b),
                    Op::Sub => a.wrapping_sub(b),
                    Op::Mul => a.wrapping_mul(b),
                    Op::Div => match b {
                        0 => return Err(Fault::DivideByZero),
                        _ => a.wrapping_div(b),
                    },
                    Op::Mod => match b {
                        0 => return Err(Fault::DivideByZero),
                        _ => a.wrapping_rem(b),
                    },
                    Op::Eq => (a == b) as i16,
                    Op::Ne => (a != b) as i16,
                    Op::Lt => (a < b) as i16,
                    Op::Gt => (a > b) as i16,
                    Op::Le => (a <= b) as i16,
                    Op::Ge => (a >= b) as i16,
                    Op::And => (a != 0 && b != 0) as i16,
                    Op::Or => (a != 0 || b != 0) as i16,
                    _ => unreachable!(),
                };
                self.push(value as u16)?;
            }
            Op::Neg => {
                let v = self.pop()? as i16;
                self.push(v.wrapping_neg() as u16)?;
            }
            Op::Not => {
                let v = self.pop()?;
                self.push((v == 0) as u16)?;
            }
            Op::Jump => {
                let target = self.read_operand_u32(operands);
                self.jump(target)?;
            }
            Op::JumpIfZero => {
                let target = self.read_operand_u32(operands);
                if self.pop()? == 0 {
                    self.jump(target)?;
                }
            }
            Op::Call => {
                let target = self.read_operand_u32(operands);
                if self.frames.len() >= CALL_LIMIT {
                    return Err(Fault::CallDepthExceeded);
                }
                self.frames.push(self.pc);
                self.jump(target)?;
            }
            Op::Ret => match self.frames.pop() {
                Some(ret) => self.pc = ret,
                // The entry subroutine returned: normal exit.
                None => return Ok(Flow::Halt),
            },
            Op::Peek => {
                let addr = self.pop()?;
                let value = self.load_word(addr as u32)?;
                self.push(value)?;
            }
            Op::Poke => {
                let value = self.pop()?;
                let addr = self.pop()?;
                self.store_word(addr as u32, value)?;
            }
            Op::Print => {
                let offset = self.read_operand_u32(operands) as usize;
                let len =
                    u16::from_le_bytes([self.code[operands + 4], self.code[operands + 5]]) as usize;
                let argc = self.code[operands + 6] as usize;
                if offset + len > self.code.len() {
                    return Err(Fault::BadPrintString);
                }
                let message =
                    String::from_utf8_lossy(&self.code[offset..offset + len]).into_owned();
                let mut values = Vec::with_capacity(argc);
                for _ in 0..argc {
                    values.push(self.pop()?);
                }
                values.reverse();
                let payload = if values.is_empty() {
                    None
                } else {
                    Some(EventPayload::Values(values))
                };
                self.events
                    .emit(self.cycles, EventCategory::Print, message, payload);
            }
            Op::Sleep => return Ok(Flow::Sleep),
            Op::Pop => {
                self.pop()?;
            }
        }
        Ok(Flow::Continue)
    }

    fn jump(&mut self, target: u32) -> Result<(), Fault> {
        if (target as usize) >= self.code.len() {
            return Err(Fault::JumpOutOfRange(target));
        }
        self.pc = target as usize;
        Ok(())
    }

    fn push(&mut self, value: u16) -> Result<(), Fault> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(Fault::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<u16, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    fn load_word(&self, addr: u32) -> Result<u16, Fault> {
        let at = addr as usize;
        if at + 1 >= MEMORY_SIZE {
            return Err(Fault::MemoryOutOfRange(addr));
        }
        Ok(u16::from_le_bytes([self.memory[at], self.memory[at + 1]]))
    }

    fn store_word(&mut self, addr: u32, value: u16) -> Result<(), Fault> {
        let at = addr as usize;
        if at + 1 >= MEMORY_SIZE {
            return Err(Fault::MemoryOutOfRange(addr));
        }
        self.memory[at..at + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Operand readers: bounds were checked against `operand_len` at fetch.
    fn read_operand_u16(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.code[at], self.code[at + 1]])
    }

    fn read_operand_u32(&self, at: usize) -> u32 {
        u32::from_le_bytes([
            self.code[at],
            self.code[at + 1],
            self.code[at + 2],
            self.code[at + 3],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swiss_types::CartridgeImage;

    /// Hand-assemble a cartridge from raw code bytes.
    fn cart(code: Vec<u8>) -> Vec<u8> {
        CartridgeImage::assemble(0, code, &[]).to_bytes()
    }

    fn load(code: Vec<u8>) -> (Machine, EventSource) {
        Machine::load(&cart(code)).expect("valid image")
    }

    #[test]
    fn test_halt_transitions_to_halted() {
        let (mut machine, _source) = load(vec![Op::Halt as u8]);
        assert_eq!(machine.status(), Status::Loaded);
        assert_eq!(machine.run_frame(), Status::Halted);
        assert_eq!(machine.halt_reason(), Some(&HaltReason::Completed));
    }

    #[test]
    fn test_push_store_load_roundtrip() {
        // PUSH 7; STORE $0200; LOAD $0200; STORE $0202; HALT
        let mut code = vec![Op::Push as u8, 7, 0];
        code.extend([Op::StoreGlobal as u8, 0x00, 0x02]);
        code.extend([Op::LoadGlobal as u8, 0x00, 0x02]);
        code.extend([Op::StoreGlobal as u8, 0x02, 0x02]);
        code.push(Op::Halt as u8);
        let (mut machine, _source) = load(code);
        machine.run_frame();
        assert_eq!(machine.memory()[0x0200], 7);
        assert_eq!(machine.memory()[0x0202], 7);
    }

    #[test]
    fn test_illegal_opcode_faults() {
        let (mut machine, source) = load(vec![0xee]);
        assert_eq!(machine.run_frame(), Status::Halted);
        assert!(matches!(
            machine.halt_reason(),
            Some(HaltReason::Fault(Fault::IllegalOpcode(0xee)))
        ));
        let events = source.drain();
        let fault = events
            .iter()
            .find(|e| e.category == EventCategory::Fault)
            .expect("fault event emitted");
        assert!(fault.message.contains("illegal opcode"));
        assert!(matches!(fault.payload, Some(EventPayload::Snapshot(_))));
    }

    #[test]
    fn test_divide_by_zero_faults() {
        let code = vec![
            Op::Push as u8, 1, 0,
            Op::Push as u8, 0, 0,
            Op::Div as u8,
        ];
        let (mut machine, _source) = load(code);
        machine.run_frame();
        assert!(matches!(
            machine.halt_reason(),
            Some(HaltReason::Fault(Fault::DivideByZero))
        ));
    }

    #[test]
    fn test_stack_underflow_faults() {
        let (mut machine, _source) = load(vec![Op::Pop as u8]);
        machine.run_frame();
        assert!(matches!(
            machine.halt_reason(),
            Some(HaltReason::Fault(Fault::StackUnderflow))
        ));
    }

    #[test]
    fn test_truncated_operand_faults() {
        // PUSH with only one operand byte.
        let (mut machine, _source) = load(vec![Op::Push as u8, 1]);
        machine.run_frame();
        assert!(matches!(
            machine.halt_reason(),
            Some(HaltReason::Fault(Fault::TruncatedInstruction))
        ));
    }

    #[test]
    fn test_runaway_program_yields_every_frame() {
        // JUMP 0 — an infinite loop.
        let (mut machine, _source) = load(vec![Op::Jump as u8, 0, 0, 0, 0]);
        let status = machine.run_frame();
        assert_eq!(status, Status::Running);
        assert_eq!(machine.snapshot().cycles, CYCLES_PER_FRAME);
    }

    #[test]
    fn test_host_stop_honoured_at_yield_boundary() {
        let (mut machine, source) = load(vec![Op::Jump as u8, 0, 0, 0, 0]);
        assert_eq!(machine.run_frame(), Status::Running);
        machine.stop_handle().request_stop();
        assert_eq!(machine.run_frame(), Status::Halted);
        assert_eq!(machine.halt_reason(), Some(&HaltReason::HostStop));
        assert!(source
            .drain()
            .iter()
            .any(|e| e.message == "stopped by host"));
    }

    #[test]
    fn test_sleep_ends_frame_early() {
        let code = vec![Op::Sleep as u8, Op::Halt as u8];
        let (mut machine, _source) = load(code);
        assert_eq!(machine.run_frame(), Status::Running);
        assert_eq!(machine.snapshot().cycles, 1);
        assert_eq!(machine.run_frame(), Status::Halted);
    }

    #[test]
    fn test_entry_return_is_normal_exit() {
        let code = vec![Op::Push as u8, 0, 0, Op::Ret as u8];
        let (mut machine, source) = load(code);
        machine.run_frame();
        assert_eq!(machine.halt_reason(), Some(&HaltReason::Completed));
        assert!(source.drain().iter().any(|e| e.message == "program halted"));
    }

    #[test]
    fn test_print_emits_event_with_values() {
        // Code: PUSH 42; PRINT "hi" (appended after code), argc 1; HALT
        let message = b"hi";
        let mut code = vec![Op::Push as u8, 42, 0];
        let print_at = code.len();
        code.push(Op::Print as u8);
        code.extend(0u32.to_le_bytes()); // patched below
        code.extend((message.len() as u16).to_le_bytes());
        code.push(1);
        code.push(Op::Halt as u8);
        let pool = code.len() as u32;
        code.extend_from_slice(message);
        code[print_at + 1..print_at + 5].copy_from_slice(&pool.to_le_bytes());

        let (mut machine, source) = load(code);
        machine.run_frame();
        let events = source.drain();
        let print = events
            .iter()
            .find(|e| e.category == EventCategory::Print)
            .expect("print event");
        assert_eq!(print.message, "hi");
        assert_eq!(print.payload, Some(EventPayload::Values(vec![42])));
    }

    #[test]
    fn test_load_rejects_corrupt_image() {
        assert!(matches!(
            Machine::load(b"not a cartridge"),
            Err(ImageError::BadMagic)
        ));
    }

    #[test]
    fn test_resources_mapped_at_window_base() {
        let pal = swiss_types::Resource::new(
            "pal",
            swiss_types::ResourceKind::Palette,
            vec![0x0f, 0x21, 0x31, 0x01],
        )
        .unwrap();
        let image = CartridgeImage::assemble(0, vec![Op::Halt as u8], &[&pal]);
        let (machine, _source) = Machine::load(&image.to_bytes()).unwrap();
        let base = RESOURCE_BASE as usize;
        assert_eq!(&machine.memory()[base..base + 4], &[0x0f, 0x21, 0x31, 0x01]);
    }

    #[test]
    fn test_lifecycle_events_in_order() {
        let (mut machine, source) = load(vec![Op::Halt as u8]);
        machine.run_frame();
        let events = source.drain();
        let lifecycle: Vec<&str> = events
            .iter()
            .filter(|e| e.category == EventCategory::Lifecycle)
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(lifecycle.len(), 3);
        assert!(lifecycle[0].starts_with("cartridge loaded"));
        assert_eq!(lifecycle[1], "program started");
        assert_eq!(lifecycle[2], "program halted");
    }
}
