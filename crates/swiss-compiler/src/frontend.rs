//! The parallel front end: every project file lexed and parsed
//! independently, results joined before resolution begins.

use rayon::prelude::*;
use swiss_parser::parse_source;
use swiss_types::ast::SourceUnit;
use swiss_types::{CompileReport, Project, SourceFile};

/// Parse every file in the project, in parallel.
///
/// Returns the units in project file order, or a report holding every
/// file's collected syntax errors. Compilation halts here before symbol
/// resolution if any file failed.
pub fn parse_project(project: &Project) -> Result<Vec<SourceUnit>, CompileReport> {
    let results: Vec<_> = project
        .files()
        .par_iter()
        .map(|entry| parse_source(&SourceFile::new(&entry.name, &entry.text)))
        .collect();

    let mut report = CompileReport::new();
    let mut units = Vec::with_capacity(results.len());
    for result in results {
        for err in result.errors {
            report.push_syntax(err);
        }
        if let Some(unit) = result.unit {
            units.push(unit);
        }
    }

    if report.is_empty() {
        Ok(units)
    } else {
        Err(report)
    }
}
