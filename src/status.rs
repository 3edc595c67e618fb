//! Check outcomes and their aggregates.

use serde::Serialize;
use std::fmt;

/// Three-valued verdict for one domain.
///
/// `Unknown` means no backend produced a confident answer; it is never a
/// silent stand-in for "not blocked".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockStatus {
    Blocked,
    NotBlocked,
    Unknown,
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockStatus::Blocked => f.write_str("blocked"),
            BlockStatus::NotBlocked => f.write_str("not blocked"),
            BlockStatus::Unknown => f.write_str("unknown"),
        }
    }
}

/// How much weight a backend's answer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    /// A structured API answered directly.
    Structured,
    /// Inferred from page content; best-effort only.
    Heuristic,
}

/// Outcome of checking one domain. Created per call, consumed immediately
/// by the caller's notification layer.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub domain: String,
    pub status: BlockStatus,
    /// Name of the backend that produced the verdict, if any did.
    pub source: Option<String>,
    pub confidence: Option<Confidence>,
    /// Detail of the last failure when no backend produced a verdict; `None`
    /// on an `Unknown` result means the backends answered but ambiguously.
    pub error: Option<String>,
}

impl CheckResult {
    pub(crate) fn answered(
        domain: &str,
        status: BlockStatus,
        source: &str,
        confidence: Confidence,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            status,
            source: Some(source.to_string()),
            confidence: Some(confidence),
            error: None,
        }
    }

    pub(crate) fn unresolved(domain: &str, error: Option<String>) -> Self {
        Self {
            domain: domain.to_string(),
            status: BlockStatus::Unknown,
            source: None,
            confidence: None,
            error,
        }
    }

    /// True when a backend produced a definite Blocked/NotBlocked verdict.
    pub fn is_verified(&self) -> bool {
        matches!(self.status, BlockStatus::Blocked | BlockStatus::NotBlocked)
    }
}

/// Aggregate counts over a batch of results, for the caller's report line.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub blocked: usize,
    pub not_blocked: usize,
    pub unknown: usize,
}

impl BatchSummary {
    pub fn of(results: &[CheckResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.total += 1;
            match result.status {
                BlockStatus::Blocked => summary.blocked += 1,
                BlockStatus::NotBlocked => summary.not_blocked += 1,
                BlockStatus::Unknown => summary.unknown += 1,
            }
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} checked: {} blocked, {} clean, {} unverified",
            self.total, self.blocked, self.not_blocked, self.unknown
        )
    }
}
