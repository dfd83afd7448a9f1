//! Error model.
//!
//! Two families live here, deliberately kept apart:
//!
//! - [`ValidationError`] is a plain data record. It never travels as the
//!   `Err` side of a `Result` — it is collected into [`crate::FileResult`]
//!   and [`crate::ValidationResult`] values. Rules and the XSD validator
//!   construct it only through the factory functions below so that the
//!   `source`/`severity`/`category` combinations stay well-formed.
//! - [`EngineError`] is the `thiserror`-derived enum returned by the
//!   orchestrator for conditions that preclude a useful result: an unknown
//!   rule or profile name, an unreadable document, a schema that can't be
//!   resolved, and so on.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a [`ValidationError`] originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    Xsd,
    Rule,
}

/// Severity of a [`ValidationError`]. `Info` never fails a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Category of a [`ValidationError`], matching the taxonomy in §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Consistency,
    Quality,
    NotFound,
    Skipped,
    General,
}

/// A single validation finding, attributable to a file and position.
///
/// Never constructed directly outside this module — use the factory
/// functions (`consistency_error`, `quality_error`, ...) so the
/// source/severity/category tuple is always one the rest of the system
/// expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    pub source: ErrorSource,
    pub severity: Severity,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl ValidationError {
    fn new(
        message: impl Into<String>,
        source: ErrorSource,
        severity: Severity,
        category: Category,
        rule: Option<&str>,
    ) -> Self {
        Self {
            message: message.into(),
            source,
            severity,
            category,
            rule: rule.map(str::to_owned),
            file_name: None,
            line: None,
            column: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_position(mut self, line: Option<u32>, column: Option<u32>) -> Self {
        self.line = line;
        self.column = column;
        self
    }
}

/// A rule-raised consistency problem (referential integrity, duplicate ids).
pub fn consistency_error(rule: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(
        message,
        ErrorSource::Rule,
        Severity::Error,
        Category::Consistency,
        Some(rule),
    )
}

/// A rule-raised quality warning (geography sanity, weak cross-file linkage).
pub fn quality_error(rule: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(
        message,
        ErrorSource::Rule,
        Severity::Warning,
        Category::Quality,
        Some(rule),
    )
}

/// A rule-raised "referenced thing does not exist" error.
pub fn not_found_error(rule: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(
        message,
        ErrorSource::Rule,
        Severity::Error,
        Category::NotFound,
        Some(rule),
    )
}

/// A catch-all error for a rule body that panicked or returned `Err`.
pub fn general_error(rule: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(
        message,
        ErrorSource::Rule,
        Severity::Error,
        Category::General,
        Some(rule),
    )
}

/// A rule's prerequisite was not met; the rule did not run to completion.
/// Never contributes to a file's pass/fail status.
pub fn skipped_info(rule: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(
        message,
        ErrorSource::Rule,
        Severity::Info,
        Category::Skipped,
        Some(rule),
    )
}

/// An XSD schema-validation diagnostic, with libxml2's message normalized
/// per §4.1: namespace URIs stripped, quoted identifiers backticked, and
/// `Expected is one of (...)`/`Expected is (...)` reshaped into a backtick list.
pub fn xsd_error(raw_message: &str, line: Option<u32>, column: Option<u32>) -> ValidationError {
    let message = normalize_xsd_message(raw_message);
    ValidationError::new(message, ErrorSource::Xsd, Severity::Error, Category::Consistency, None)
        .with_position(line, column)
}

fn normalize_xsd_message(raw: &str) -> String {
    use std::sync::OnceLock;

    static NAMESPACE_RE: OnceLock<regex::Regex> = OnceLock::new();
    static QUOTED_RE: OnceLock<regex::Regex> = OnceLock::new();
    static EXPECTED_LIST_RE: OnceLock<regex::Regex> = OnceLock::new();
    static EXPECTED_ONE_RE: OnceLock<regex::Regex> = OnceLock::new();

    let namespace_re =
        NAMESPACE_RE.get_or_init(|| regex::Regex::new(r"\{[^}]*\}").expect("valid regex"));
    let quoted_re =
        QUOTED_RE.get_or_init(|| regex::Regex::new(r"'([^']+)'").expect("valid regex"));
    let expected_list_re = EXPECTED_LIST_RE
        .get_or_init(|| regex::Regex::new(r"Expected is one of \(([^)]*)\)").expect("valid regex"));
    let expected_one_re =
        EXPECTED_ONE_RE.get_or_init(|| regex::Regex::new(r"Expected is \(([^)]*)\)").expect("valid regex"));

    let stripped = namespace_re.replace_all(raw, "");
    let backticked = quoted_re.replace_all(&stripped, "`$1`");

    let with_list = expected_list_re.replace_all(&backticked, |caps: &regex::Captures| {
        let items = caps[1]
            .split(',')
            .map(|s| format!("`{}`", s.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Expected is one of ({})", items)
    });
    let with_single = expected_one_re.replace_all(&with_list, |caps: &regex::Captures| {
        format!("Expected is (`{}`)", caps[1].trim())
    });

    with_single.trim().to_string()
}

/// Setup errors returned by [`crate::orchestrator::Orchestrator`] methods.
/// Distinct from [`ValidationError`]: these are never part of a
/// [`crate::ValidationResult`], they are the `Err` side of the call.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown rule: {names} (available: {available})")]
    UnknownRule { names: String, available: String },

    #[error("unknown profile: {name} (available: {available})")]
    UnknownProfile { name: String, available: String },

    #[error("could not read document {path}: {source}")]
    UnreadableDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema resolution failed: {0}")]
    SchemaResolution(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-specific errors, surfaced through [`EngineError::Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid configuration format: {details}")]
    InvalidFormat { details: String },

    #[error("invalid configuration value: {field} = {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
