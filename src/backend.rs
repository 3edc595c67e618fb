//! The check backend capability.

use crate::error::CallError;
use crate::status::{BlockStatus, Confidence};

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;

/// One upstream service capable of answering "is this domain blocked".
///
/// Backends are consulted in priority order by the checker; the first
/// well-formed Blocked/NotBlocked answer short-circuits the rest. An
/// implementation receives a client already bound to the route the pool
/// chose, and classifies its own transport failures through [`CallError`]
/// so the checker can tell a broken route from a broken upstream.
#[async_trait]
pub trait CheckBackend: Send + Sync {
    /// Short identifier used in logs and in `CheckResult::source`.
    fn name(&self) -> &str;

    /// Maximum number of domains a single request may carry.
    fn batch_limit(&self) -> usize {
        1
    }

    /// How trustworthy a well-formed answer from this backend is.
    fn confidence(&self) -> Confidence {
        Confidence::Structured
    }

    /// Query the backend for the given domains.
    ///
    /// The returned map may omit a domain, or map it to
    /// [`BlockStatus::Unknown`]; both mean "no confident answer" and leave
    /// that domain for the next backend in line.
    async fn check(
        &self,
        client: &Client,
        domains: &[String],
    ) -> Result<HashMap<String, BlockStatus>, CallError>;
}
