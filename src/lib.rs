//! # blockcheck
//!
//! A proxy-rotating domain blocklist checker.
//!
//! Given an unreliable set of egress routes (direct, or via HTTP/SOCKS
//! proxies) and unreliable upstream "is this domain censored" services,
//! this library produces best-effort Blocked/NotBlocked/Unknown verdicts
//! with bounded retries, proxy failover, and multi-backend fallback. The
//! surrounding glue (scheduler, notification channel, domain file) is the
//! caller's business.

pub mod backend;
pub mod backends;
pub mod checker;
pub mod config;
pub mod error;
pub mod pool;
pub mod route;
pub mod status;
mod utils;

pub use backend::CheckBackend;
pub use backends::{BulkApi, ContentSniff, DomainApi, Transport};
pub use checker::DomainBlockChecker;
pub use config::{CheckerConfig, PoolConfig, PoolConfigBuilder, RetryPolicy};
pub use error::{CallError, InvalidRoute};
pub use pool::{PoolStats, ProxyPool};
pub use route::{ProxyEndpoint, ProxyScheme, Route, RouteHealth};
pub use status::{BatchSummary, BlockStatus, CheckResult, Confidence};
