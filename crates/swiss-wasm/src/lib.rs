//! Swiss toolchain as a WASM module for browser environments.
//!
//! Exposes the compile entry point and an [`Emulator`] class via
//! `wasm-bindgen`, suitable for a Web Worker host. All structured results
//! cross the boundary as JSON strings the host deserializes.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { compile, Emulator } from 'swiss-wasm';
//!
//! await init();
//!
//! const result = JSON.parse(compile(projectJson));
//! if (result.success) {
//!   const emu = new Emulator();
//!   emu.load_rom(new Uint8Array(result.cart));
//!   emu.run_frame();
//!   const events = JSON.parse(emu.drain_events());
//! }
//! ```

use serde::Serialize;
use swiss_emu::{EventSource, Machine};
use swiss_types::{CompileReport, Project};
use wasm_bindgen::prelude::*;

/// JSON shape returned by [`compile`].
#[derive(Serialize)]
struct CompileResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    cart: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<CompileReport>,
}

/// Compile a serialized [`Project`] to cartridge bytes.
///
/// Returns a JSON string:
/// `{ "success": true, "cart": [83, 87, ...] }` or
/// `{ "success": false, "errors": { "diagnostics": [...] } }`.
#[wasm_bindgen]
pub fn compile(project_json: &str) -> String {
    let result = match serde_json::from_str::<Project>(project_json) {
        Ok(project) => match swiss_compiler::compile_project_to_bytes(&project) {
            Ok(cart) => CompileResult {
                success: true,
                cart: Some(cart),
                errors: None,
            },
            Err(report) => CompileResult {
                success: false,
                cart: None,
                errors: Some(report),
            },
        },
        Err(err) => CompileResult {
            success: false,
            cart: None,
            errors: Some(project_parse_report(&err)),
        },
    };
    serde_json::to_string(&result).unwrap_or_else(|e| {
        format!(r#"{{"success":false,"errors":{{"diagnostics":[]}},"serialization_error":"{e}"}}"#)
    })
}

fn project_parse_report(err: &serde_json::Error) -> CompileReport {
    let mut report = CompileReport::new();
    report.push(swiss_types::Diagnostic::new(
        "(project)",
        swiss_types::Span::point(1, 1),
        swiss_types::Stage::Resolve,
        format!("malformed project payload: {err}"),
    ));
    report
}

/// One emulator session, driven from the browser host.
///
/// `load_rom` transitions an idle instance to loaded; `reset` reloads the
/// same cartridge from scratch; dropping the instance tears the session
/// down.
#[wasm_bindgen]
pub struct Emulator {
    session: Option<(Machine, EventSource)>,
    rom: Vec<u8>,
}

#[wasm_bindgen]
impl Emulator {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Emulator {
        Emulator {
            session: None,
            rom: Vec::new(),
        }
    }

    /// Validate and load a cartridge image.
    pub fn load_rom(&mut self, rom_data: &[u8]) -> Result<(), JsError> {
        let (machine, source) =
            Machine::load(rom_data).map_err(|e| JsError::new(&e.to_string()))?;
        self.rom = rom_data.to_vec();
        self.session = Some((machine, source));
        Ok(())
    }

    /// Execute one instruction.
    pub fn step(&mut self) {
        if let Some((machine, _)) = self.session.as_mut() {
            machine.step();
        }
    }

    /// Execute up to one frame's instruction budget.
    pub fn run_frame(&mut self) {
        if let Some((machine, _)) = self.session.as_mut() {
            machine.run_frame();
        }
    }

    /// Request a stop; honoured at the next yield boundary.
    pub fn stop(&mut self) {
        if let Some((machine, _)) = self.session.as_ref() {
            machine.stop_handle().request_stop();
        }
    }

    /// Drain pending debug events as a JSON array, in arrival order.
    pub fn drain_events(&mut self) -> String {
        let events = match self.session.as_ref() {
            Some((_, source)) => source.drain(),
            None => Vec::new(),
        };
        serde_json::to_string(&events).unwrap_or_else(|_| "[]".to_string())
    }

    /// Current CPU state as JSON, or `null` when idle.
    pub fn cpu_state(&self) -> String {
        match self.session.as_ref() {
            Some((machine, _)) => serde_json::to_string(&machine.snapshot())
                .unwrap_or_else(|_| "null".to_string()),
            None => "null".to_string(),
        }
    }

    /// Copy of machine memory for the host's inspection panels.
    pub fn memory(&self) -> Vec<u8> {
        match self.session.as_ref() {
            Some((machine, _)) => machine.memory().to_vec(),
            None => Vec::new(),
        }
    }

    /// `true` once the machine has halted (fault, completion, or stop).
    pub fn is_halted(&self) -> bool {
        matches!(
            self.session.as_ref().map(|(m, _)| m.status()),
            Some(swiss_emu::Status::Halted)
        )
    }

    /// Hard reset: reload the current cartridge from its bytes.
    pub fn reset(&mut self) -> Result<(), JsError> {
        if self.rom.is_empty() {
            return Ok(());
        }
        let rom = std::mem::take(&mut self.rom);
        self.load_rom(&rom)
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Toolchain version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
