//! Bulk JSON check backend.

use crate::backend::CheckBackend;
use crate::error::CallError;
use crate::status::BlockStatus;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;

/// A bulk "is this list of domains blocked" API.
///
/// Issues `GET endpoint?domains=a.com,b.com` and expects a JSON object
/// keyed by domain, where each entry is either a bare boolean or an object
/// carrying a boolean field (`{"a.com": {"blocked": true}}`). Domains the
/// response omits are left unanswered rather than assumed safe.
pub struct BulkApi {
    name: String,
    endpoint: String,
    query_param: String,
    blocked_field: String,
    batch_limit: usize,
    headers: Vec<(String, String)>,
}

impl BulkApi {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            query_param: "domains".to_string(),
            blocked_field: "blocked".to_string(),
            batch_limit: 50,
            headers: Vec::new(),
        }
    }

    /// Query parameter carrying the comma-joined domain list.
    pub fn query_param(mut self, param: impl Into<String>) -> Self {
        self.query_param = param.into();
        self
    }

    /// Boolean field inside each per-domain object.
    pub fn blocked_field(mut self, field: impl Into<String>) -> Self {
        self.blocked_field = field.into();
        self
    }

    /// Maximum domains per request; observed upstream limits range 5-200.
    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Add a static request header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    fn normalize(&self, body: &Value, domains: &[String]) -> HashMap<String, BlockStatus> {
        let mut statuses = HashMap::new();
        for domain in domains {
            let status = match body.get(domain) {
                Some(Value::Bool(blocked)) => Some(bool_status(*blocked)),
                Some(entry) => entry
                    .get(&self.blocked_field)
                    .and_then(Value::as_bool)
                    .map(bool_status),
                None => None,
            };
            match status {
                Some(status) => {
                    statuses.insert(domain.clone(), status);
                }
                None => debug!("{}: no verdict for {} in response", self.name, domain),
            }
        }
        statuses
    }
}

fn bool_status(blocked: bool) -> BlockStatus {
    if blocked {
        BlockStatus::Blocked
    } else {
        BlockStatus::NotBlocked
    }
}

#[async_trait]
impl CheckBackend for BulkApi {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    async fn check(
        &self,
        client: &Client,
        domains: &[String],
    ) -> Result<HashMap<String, BlockStatus>, CallError> {
        let mut request = client
            .get(&self.endpoint)
            .query(&[(self.query_param.as_str(), domains.join(",").as_str())]);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(CallError::from_transport)?;
        let status = response.status();
        if status.as_u16() == 403 || status.as_u16() == 429 {
            return Err(CallError::Application(format!(
                "access denied or rate limited: {status}"
            )));
        }
        if !status.is_success() {
            return Err(CallError::Application(format!("unexpected status {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CallError::Application(format!("malformed response: {e}")))?;
        Ok(self.normalize(&body, domains))
    }
}
