//! NeTEx/SIRI validation engine.
//!
//! Validates public-transport XML documents against XSD schemas and a
//! library of domain business rules, including cross-document referential
//! integrity, producing a structured report of errors and warnings.
//!
//! This crate is an embeddable library only: it has no CLI, no HTTP
//! surface, and no output formatters. Callers resolve file paths or
//! documents themselves and invoke [`orchestrator::Orchestrator`] directly.

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod libxml2;
pub mod logger;
pub mod navigator;
pub mod orchestrator;
pub mod progress;
pub mod rules;
pub mod schema_catalogue;
pub mod xsd_constraints;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use error::{EngineError, EngineResult, ValidationError};
pub use format::Format;

/// One XML document under validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub xml: String,
}

/// Per-file outcome of one validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub file_name: String,
    pub format: Format,
    pub errors: Vec<ValidationError>,
    pub passed: bool,
    pub rules_run: Vec<String>,
    pub rule_timing: HashMap<String, u64>,
}

impl FileResult {
    pub fn new(file_name: impl Into<String>, format: Format) -> Self {
        Self {
            file_name: file_name.into(),
            format,
            errors: Vec::new(),
            passed: true,
            rules_run: Vec::new(),
            rule_timing: HashMap::new(),
        }
    }

    /// Recompute `passed` from the current error list (§3 invariant 2).
    pub fn recompute_passed(&mut self) {
        self.passed = !self
            .errors
            .iter()
            .any(|e| matches!(e.severity, error::Severity::Error | error::Severity::Warning));
    }
}

/// Aggregate outcome of one validation run across all files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub files: Vec<FileResult>,
    pub total_files: usize,
    pub passed_files: usize,
    pub failed_files: usize,
    pub total_errors: usize,
    pub duration_ms: u64,
}

impl ValidationResult {
    pub fn aggregate(files: Vec<FileResult>, duration_ms: u64) -> Self {
        let total_files = files.len();
        let passed_files = files.iter().filter(|f| f.passed).count();
        let failed_files = total_files - passed_files;
        let total_errors = files
            .iter()
            .flat_map(|f| &f.errors)
            .filter(|e| !matches!(e.severity, error::Severity::Info))
            .count();
        Self {
            files,
            total_files,
            passed_files,
            failed_files,
            total_errors,
            duration_ms,
        }
    }

    pub fn empty() -> Self {
        Self {
            files: Vec::new(),
            total_files: 0,
            passed_files: 0,
            failed_files: 0,
            total_errors: 0,
            duration_ms: 0,
        }
    }
}

/// A named, format-scoped combination of schema + rule selection (§3, §6).
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: &'static str,
    pub display_name: &'static str,
    pub format: Format,
    pub schema_id: Option<&'static str>,
    pub enabled_rules: Vec<&'static str>,
}

/// Catalogue entry naming where a schema archive lives and which file
/// inside it is the entry point (§3, §4.10).
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub label: &'static str,
    pub archive_url: &'static str,
    pub entry_xsd: &'static str,
    pub archive_root_prefix: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use error::{consistency_error, Severity};

    #[test]
    fn file_result_passed_recomputes_from_errors() {
        let mut fr = FileResult::new("a.xml", Format::Netex);
        assert!(fr.passed);
        fr.errors.push(consistency_error("r", "m"));
        fr.recompute_passed();
        assert!(!fr.passed);
    }

    #[test]
    fn validation_result_excludes_info_from_total_errors() {
        let mut fr = FileResult::new("a.xml", Format::Netex);
        fr.errors.push(error::skipped_info("r", "skip"));
        fr.recompute_passed();
        let result = ValidationResult::aggregate(vec![fr], 10);
        assert_eq!(result.total_errors, 0);
        assert_eq!(result.passed_files, 1);
        assert!(matches!(result.files[0].errors[0].severity, Severity::Info));
    }
}
