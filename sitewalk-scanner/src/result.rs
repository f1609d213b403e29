use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Why a single sitemap reference contributed no leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Transport,
    MalformedDocument,
    InvalidUrl,
    Cycle,
    DepthLimit,
    Internal,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Transport => "transport",
            DiagnosticKind::MalformedDocument => "malformed_document",
            DiagnosticKind::InvalidUrl => "invalid_url",
            DiagnosticKind::Cycle => "cycle",
            DiagnosticKind::DepthLimit => "depth_limit",
            DiagnosticKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub url: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(url: &str, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// Map a per-reference error onto the diagnostic it is reported as.
    pub fn from_error(url: &str, error: &ScanError) -> Self {
        let kind = match error {
            ScanError::Transport { .. } | ScanError::HttpError(_) => DiagnosticKind::Transport,
            ScanError::MalformedDocument(_) => DiagnosticKind::MalformedDocument,
            ScanError::InvalidUrl(_) => DiagnosticKind::InvalidUrl,
            _ => DiagnosticKind::Internal,
        };
        Self::new(url, kind, error.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
    /// Documents successfully fetched
    pub fetched: usize,
    pub indexes: usize,
    pub unrecognized: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub leaves: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ResolveStats,
    pub elapsed: Duration,
}

impl ResolutionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Diagnostics of one kind, in the order they were recorded
    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.kind == kind).collect()
    }
}
