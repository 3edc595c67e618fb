//! Per-domain check backend.

use crate::backend::CheckBackend;
use crate::backends::json_path;
use crate::error::CallError;
use crate::status::BlockStatus;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;

/// How a per-domain backend wants the domain delivered.
#[derive(Debug, Clone)]
pub enum Transport {
    /// `GET endpoint?param=domain`
    QueryGet { param: String },
    /// `POST endpoint` with a form body `field=domain`
    FormPost { field: String },
}

/// A one-domain-per-request API.
///
/// The verdict is read from the JSON response at a dot-separated field
/// path, e.g. `"blocked"` or `"data.blocked"`. Anything other than a
/// boolean at that path leaves the domain unanswered.
pub struct DomainApi {
    name: String,
    endpoint: String,
    transport: Transport,
    blocked_path: String,
    headers: Vec<(String, String)>,
}

impl DomainApi {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, transport: Transport) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            transport,
            blocked_path: "blocked".to_string(),
            headers: Vec::new(),
        }
    }

    /// Dot-separated path to the boolean verdict in the response body.
    pub fn blocked_path(mut self, path: impl Into<String>) -> Self {
        self.blocked_path = path.into();
        self
    }

    /// Add a static request header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    async fn check_one(&self, client: &Client, domain: &str) -> Result<Option<BlockStatus>, CallError> {
        let mut request = match &self.transport {
            Transport::QueryGet { param } => client
                .get(&self.endpoint)
                .query(&[(param.as_str(), domain)]),
            Transport::FormPost { field } => client
                .post(&self.endpoint)
                .form(&[(field.as_str(), domain)]),
        };
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(CallError::from_transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CallError::Application(format!("unexpected status {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CallError::Application(format!("malformed response: {e}")))?;
        Ok(json_path(&body, &self.blocked_path)
            .and_then(Value::as_bool)
            .map(|blocked| {
                if blocked {
                    BlockStatus::Blocked
                } else {
                    BlockStatus::NotBlocked
                }
            }))
    }
}

#[async_trait]
impl CheckBackend for DomainApi {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(
        &self,
        client: &Client,
        domains: &[String],
    ) -> Result<HashMap<String, BlockStatus>, CallError> {
        // The checker chunks to batch_limit() == 1, but stay correct for
        // callers driving the trait directly.
        let mut statuses = HashMap::new();
        for domain in domains {
            if let Some(status) = self.check_one(client, domain).await? {
                statuses.insert(domain.clone(), status);
            }
        }
        Ok(statuses)
    }
}
