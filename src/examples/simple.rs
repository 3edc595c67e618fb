//! Simple example of using blockcheck.
//!
//! Builds a pool from a free proxy list, wires the usual backend fallback
//! chain, and checks a handful of domains the way a scheduler tick would.

use anyhow::Result;
use blockcheck::{
    BatchSummary, BlockStatus, BulkApi, CheckBackend, CheckerConfig, ContentSniff,
    DomainBlockChecker, DomainApi, PoolConfig, ProxyPool, Route, Transport,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let routes: Vec<Route> = [
        "http://202.178.125.136:8080",
        "http://203.95.196.73:8080",
        "socks5://103.12.161.222:1080",
    ]
    .iter()
    .filter_map(|spec| Route::parse(spec).ok())
    .collect();

    let pool = ProxyPool::new(
        PoolConfig::builder()
            .routes(routes)
            // free proxy lists, format like `Free-Proxy`
            .sources(vec![
                "https://cdn.jsdelivr.net/gh/proxifly/free-proxy-list@main/proxies/protocols/socks5/data.txt",
            ])
            .probe_url("http://httpbin.org/ip")
            .probe_timeout(Duration::from_secs(5))
            .ttl(Duration::from_secs(45 * 60))
            .build(),
    );

    println!("Probing proxy pool...");
    let usable = pool.refresh().await;
    println!("{usable} usable routes (falling back to direct if none)");

    let backends: Vec<Arc<dyn CheckBackend>> = vec![
        Arc::new(
            BulkApi::new("skiddle", "https://check.skiddle.id/")
                .batch_limit(50)
                .header("Referer", "https://check.skiddle.id/"),
        ),
        Arc::new(
            DomainApi::new(
                "blockapi",
                "https://blockapi.example/check",
                Transport::QueryGet {
                    param: "domain".to_string(),
                },
            )
            .blocked_path("data.blocked"),
        ),
        Arc::new(ContentSniff::new(vec!["internet positif", "trustpositif"])),
    ];

    let checker = DomainBlockChecker::new(pool, backends, CheckerConfig::default());

    let domains: Vec<String> = std::env::args().skip(1).collect();
    let domains = if domains.is_empty() {
        vec!["example.com".to_string(), "example.org".to_string()]
    } else {
        domains
    };

    let results = checker.check_domains(&domains).await;
    for result in &results {
        match result.status {
            BlockStatus::Blocked => println!("BLOCKED   {} (via {:?})", result.domain, result.source),
            BlockStatus::NotBlocked => println!("ok        {}", result.domain),
            BlockStatus::Unknown => println!(
                "unknown   {} ({})",
                result.domain,
                result.error.as_deref().unwrap_or("ambiguous answers")
            ),
        }
    }
    println!("{}", BatchSummary::of(&results));

    Ok(())
}
