//! Built-in check backends.
//!
//! Three implementations covering the usual fallback chain: a bulk JSON
//! API, a per-domain API, and last-resort content sniffing.

mod bulk;
mod domain_api;
mod sniff;

pub use bulk::BulkApi;
pub use domain_api::{DomainApi, Transport};
pub use sniff::ContentSniff;

use serde_json::Value;

/// Walk a dot-separated path into a JSON value.
pub(crate) fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}
