//! End-to-end flow against throwaway local HTTP responders: probe the
//! pool, then resolve domains through a real bulk backend over reqwest.

use blockcheck::{
    BlockStatus, BulkApi, CheckBackend, CheckerConfig, DomainBlockChecker, PoolConfig, ProxyPool,
    RetryPolicy, Route,
};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve a fixed JSON body for every request on a fresh local port.
async fn spawn_json_server(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    addr
}

fn empty_pool() -> Arc<ProxyPool> {
    // No candidates: the pool degrades to the direct connection, which is
    // exactly what we want for talking to a local responder.
    ProxyPool::new(
        PoolConfig::builder()
            .probe_url("http://127.0.0.1:1/ip")
            .probe_timeout(Duration::from_millis(200))
            .build(),
    )
}

fn fast_config() -> CheckerConfig {
    CheckerConfig {
        retry: RetryPolicy::new(2, Duration::from_millis(10), Duration::ZERO),
        call_timeout: Duration::from_secs(2),
        batch_delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn bulk_backend_resolves_domains_over_the_wire() {
    let addr =
        spawn_json_server(r#"{"blocked.test": {"blocked": true}, "clean.test": {"blocked": false}}"#)
            .await;

    let backends: Vec<Arc<dyn CheckBackend>> =
        vec![Arc::new(BulkApi::new("bulk", format!("http://{addr}/")))];
    let checker = DomainBlockChecker::new(empty_pool(), backends, fast_config());

    let results = checker
        .check_domains(&["blocked.test".to_string(), "clean.test".to_string()])
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, BlockStatus::Blocked);
    assert_eq!(results[0].source.as_deref(), Some("bulk"));
    assert_eq!(results[1].status, BlockStatus::NotBlocked);
}

#[tokio::test]
async fn domain_missing_from_response_ends_unknown() {
    let addr = spawn_json_server(r#"{"other.test": {"blocked": false}}"#).await;

    let backends: Vec<Arc<dyn CheckBackend>> =
        vec![Arc::new(BulkApi::new("bulk", format!("http://{addr}/")))];
    let checker = DomainBlockChecker::new(empty_pool(), backends, fast_config());

    let result = checker.check_domain("absent.test").await;
    assert_eq!(result.status, BlockStatus::Unknown);
    assert!(result.source.is_none());
}

#[tokio::test]
async fn probed_proxy_route_carries_a_real_check() {
    // The same responder plays both roles: it answers the pool's probe
    // (proxied absolute-form GET) and the backend query with one body.
    let addr = spawn_json_server(r#"{"origin": "127.0.0.1", "a.com": {"blocked": false}}"#).await;
    let route = Route::parse(format!("http://{addr}").as_str()).unwrap();

    let pool = ProxyPool::new(
        PoolConfig::builder()
            .routes(vec![route.clone()])
            .probe_url("http://probe.invalid/ip")
            .probe_timeout(Duration::from_secs(2))
            .build(),
    );
    assert_eq!(pool.refresh().await, 1);

    let backends: Vec<Arc<dyn CheckBackend>> =
        vec![Arc::new(BulkApi::new("bulk", "http://upstream.invalid/"))];
    let checker = DomainBlockChecker::new(pool.clone(), backends, fast_config());

    // The backend endpoint is unresolvable, so a successful answer proves
    // the request actually went through the proxy route.
    let result = checker.check_domain("a.com").await;
    assert_eq!(result.status, BlockStatus::NotBlocked);
    assert!(pool.is_usable(&route));
}
