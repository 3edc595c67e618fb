//! Error taxonomy for network calls.

use thiserror::Error;

/// Classified outcome of a failed network call.
///
/// The split drives recovery: a route-level failure evicts the proxy and
/// retries the same backend on another route, while an application-level
/// failure falls through to the next backend in priority order.
#[derive(Debug, Error)]
pub enum CallError {
    /// The route itself broke: connection refused, proxy auth rejected,
    /// TLS failure through the proxy.
    #[error("route failure: {0}")]
    Route(String),
    /// The backend was reached but gave nothing usable: non-2xx status,
    /// malformed body, rate limit.
    #[error("backend failure: {0}")]
    Application(String),
    /// The call exceeded its allotted time.
    #[error("call timed out")]
    Timeout,
}

impl CallError {
    /// Classify a reqwest transport error.
    ///
    /// Timeouts stay distinct so callers can apply the probe-vs-backend
    /// rule: a probe timeout condemns the route, a backend timeout does not.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallError::Timeout
        } else if err.is_connect() {
            CallError::Route(err.to_string())
        } else {
            CallError::Application(err.to_string())
        }
    }

    pub fn is_route_level(&self) -> bool {
        matches!(self, CallError::Route(_))
    }
}

/// A route spec that could not be parsed.
#[derive(Debug, Error)]
#[error("invalid route spec: {0:?}")]
pub struct InvalidRoute(pub String);
