//! Progress channel (§4.12).

use std::sync::Arc;

/// Phase transitions the orchestrator reports through as it works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Xsd,
    Rules,
    CrossDoc,
    FileDone,
    Complete,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub file_index: Option<usize>,
    pub total_files: usize,
    pub file_name: Option<String>,
}

/// A caller-supplied callback, invoked synchronously at phase transitions.
/// No back-pressure, no cancellation token: the callback must not block.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
