//! Content-sniffing fallback backend.

use crate::backend::CheckBackend;
use crate::error::CallError;
use crate::status::{BlockStatus, Confidence};

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::collections::HashMap;

/// Last-resort heuristic: fetch the domain's own page and look for known
/// blocking-page markers in the body.
///
/// Markers are matched case-insensitively and typically name blocking-page
/// vendors or sinkhole addresses. A page that loads without any marker
/// counts as not blocked; this is explicitly lower-confidence than a
/// structured API answer and is tagged [`Confidence::Heuristic`].
pub struct ContentSniff {
    markers: Vec<String>,
}

impl ContentSniff {
    pub fn new(markers: Vec<impl Into<String>>) -> Self {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .collect(),
        }
    }

    fn classify(&self, body: &str) -> BlockStatus {
        let body = body.to_lowercase();
        for marker in &self.markers {
            if body.contains(marker) {
                debug!("sniff marker {:?} matched", marker);
                return BlockStatus::Blocked;
            }
        }
        BlockStatus::NotBlocked
    }

    /// Fetches the domain's front page, preferring plain HTTP but falling
    /// back to HTTPS for sites that only answer there. Redirects are
    /// followed, so a block-page redirect still lands in the body we
    /// inspect.
    async fn fetch_and_classify(
        &self,
        client: &Client,
        domain: &str,
    ) -> Result<BlockStatus, CallError> {
        let mut last_err = CallError::Application(format!("{domain} unreachable"));
        for scheme in ["http", "https"] {
            match client.get(format!("{scheme}://{domain}/")).send().await {
                Ok(response) => {
                    let body = response.text().await.map_err(|e| {
                        CallError::Application(format!("unreadable body: {e}"))
                    })?;
                    return Ok(self.classify(&body));
                }
                Err(e) => {
                    debug!("sniff {scheme} fetch of {domain} failed: {e}");
                    last_err = CallError::from_transport(e);
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl CheckBackend for ContentSniff {
    fn name(&self) -> &str {
        "content-sniff"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Heuristic
    }

    async fn check(
        &self,
        client: &Client,
        domains: &[String],
    ) -> Result<HashMap<String, BlockStatus>, CallError> {
        let mut statuses = HashMap::new();
        for domain in domains {
            statuses.insert(domain.clone(), self.fetch_and_classify(client, domain).await?);
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_match_is_case_insensitive() {
        let sniff = ContentSniff::new(vec!["Internet Positif", "trustpositif"]);
        assert_eq!(
            sniff.classify("<html>BLOCKED BY INTERNET POSITIF</html>"),
            BlockStatus::Blocked
        );
        assert_eq!(
            sniff.classify("<html>welcome to my site</html>"),
            BlockStatus::NotBlocked
        );
    }

    #[tokio::test]
    async fn https_is_tried_when_http_gets_no_answer() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::AsyncReadExt;

        // Accepts connections, reads the request, then hangs up without a
        // response. Both the plain-HTTP fetch and the TLS handshake of the
        // fallback die against it, so each scheme shows up as one accept.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = accepts.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
            }
        });

        let sniff = ContentSniff::new(vec!["blocked"]);
        let client = Client::new();
        let domain = addr.to_string();
        let result = sniff.fetch_and_classify(&client, &domain).await;

        assert!(result.is_err());
        assert_eq!(accepts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sinkhole_octets_count_as_markers() {
        let sniff = ContentSniff::new(vec!["36.86.63."]);
        assert_eq!(
            sniff.classify("redirecting to http://36.86.63.185/block"),
            BlockStatus::Blocked
        );
    }
}
