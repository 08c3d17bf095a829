//! Swiss compiler: orchestrates the full compilation pipeline.
//!
//! ```text
//! Project ─┬─ parse file (parallel) ─┐
//!          ├─ parse file (parallel) ─┼─→ resolve ─→ generate ─→ CartridgeImage
//!          └─ parse file (parallel) ─┘
//! ```
//!
//! The pipeline either returns a complete, valid [`CartridgeImage`] or a
//! complete [`CompileReport`] — never both, never neither. No partial
//! artifact is ever produced.

mod frontend;
pub mod resolve;

pub use frontend::parse_project;
pub use resolve::{resolve, ResolveError};

use swiss_types::{CartridgeImage, CompileReport, Diagnostic, Project, Span, Stage};

/// Compile a whole project into a cartridge image.
///
/// The caller (the project manager) is responsible for persistence and for
/// offering the encoded image as a download.
pub fn compile_project(project: &Project) -> Result<CartridgeImage, CompileReport> {
    if let Err(err) = project.validate() {
        let mut report = CompileReport::new();
        report.push(Diagnostic::new(
            &project.name,
            Span::point(1, 1),
            Stage::Resolve,
            err.to_string(),
        ));
        return Err(report);
    }

    let units = parse_project(project)?;

    let resolved = resolve(project.entry_file(), units, project.resources()).map_err(|errors| {
        let mut report = CompileReport::new();
        for err in errors {
            report.push(err.to_diagnostic());
        }
        report
    })?;

    swiss_codegen::generate(&resolved, project.resources()).map_err(|err| {
        let mut report = CompileReport::new();
        report.push(err.to_diagnostic());
        report
    })
}

/// Compile straight to the downloadable byte artifact.
pub fn compile_project_to_bytes(project: &Project) -> Result<Vec<u8>, CompileReport> {
    compile_project(project).map(|image| image.to_bytes())
}
