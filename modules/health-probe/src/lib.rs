//! Endpoint liveness probing with opportunistic pricing extraction.
//!
//! One GET per endpoint answers both questions: is it up (2xx, or the 402
//! a payment-gated endpoint is expected to return), and what does it
//! charge (parsed from the same 402 response).

mod pricing;
mod tokens;

pub use pricing::{parse_payment_header, requirements_from_value, validate_requirement};
pub use tokens::format_amount;

use anyhow::Result;
use fetch_client::fetch_with_retry;
use indexer_core::{now_ms, EnrichedCheck, HealthCheck};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url_guard::Verdict;

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions { timeout_ms: 5_000, retries: 2, retry_base_delay_ms: 250 }
    }
}

/// Shared probe client. Redirects stay enabled; compression negotiated.
pub fn build_client(user_agent: &str) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent.to_string())
        .brotli(true)
        .gzip(true)
        .deflate(true)
        .build()?;
    Ok(client)
}

/// A 2xx answer or the payment-required status both count as alive; 402
/// is the expected signal from a payment-gated endpoint, not a failure.
pub fn is_live_status(status: u16) -> bool {
    (200..300).contains(&status) || status == 402
}

/// Probe a single endpoint. Never panics and never fails the caller:
/// unsafe URLs and transport errors come back as dead results. No network
/// request is made for a URL that fails validation.
pub async fn check(client: &Client, url: &str, opts: &ProbeOptions) -> EnrichedCheck {
    let checked_at_ms = now_ms();

    if let Verdict::Invalid { reason } = url_guard::validate(url) {
        return EnrichedCheck::dead(reason, checked_at_ms);
    }

    let req = match client.get(url).header(ACCEPT, "application/json").build() {
        Ok(r) => r,
        Err(e) => return EnrichedCheck::dead(e.to_string(), checked_at_ms),
    };

    // Latency covers the whole probe, timed-out and retried attempts
    // included.
    let started = Instant::now();
    let sent = fetch_with_retry(
        client,
        req,
        opts.timeout_ms,
        opts.retries,
        Duration::from_millis(opts.retry_base_delay_ms),
    )
    .await;
    let latency_ms = started.elapsed().as_millis() as i64;

    match sent {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let pricing = if status == 402 {
                pricing::extract_pricing(resp, Duration::from_millis(opts.timeout_ms)).await
            } else {
                Vec::new()
            };
            EnrichedCheck {
                health: HealthCheck {
                    alive: is_live_status(status),
                    status_code: Some(status),
                    latency_ms: Some(latency_ms),
                    error: None,
                    checked_at_ms,
                },
                pricing,
            }
        }
        Err(e) => EnrichedCheck::dead(e.to_string(), checked_at_ms),
    }
}

/// Probe a batch with bounded parallelism: fixed chunks of
/// `max_concurrency`, each chunk launched fully in parallel and drained
/// before the next starts. Peak in-flight requests never exceed the bound.
/// A hung chunk (worst case one timeout budget) delays the next chunk;
/// that serialization is the accepted cost of the barrier model.
pub async fn check_all(
    client: &Client,
    urls: Vec<String>,
    opts: &ProbeOptions,
    max_concurrency: usize,
) -> HashMap<String, EnrichedCheck> {
    let bound = max_concurrency.max(1);
    let total = urls.len();
    let mut results = HashMap::with_capacity(total);
    let mut done = 0usize;

    for chunk in urls.chunks(bound) {
        let mut handles = Vec::with_capacity(chunk.len());
        for url in chunk {
            let client = client.clone();
            let url = url.clone();
            let opts = opts.clone();
            handles.push(tokio::spawn(async move {
                let outcome = check(&client, &url, &opts).await;
                (url, outcome)
            }));
        }
        for h in handles {
            if let Ok((url, outcome)) = h.await {
                results.insert(url, outcome);
            }
        }
        done += chunk.len();
        log::info!("health-checked {}/{} endpoints", done.min(total), total);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_classification() {
        assert!(is_live_status(200));
        assert!(is_live_status(204));
        assert!(is_live_status(299));
        assert!(is_live_status(402));
        assert!(!is_live_status(301));
        assert!(!is_live_status(400));
        assert!(!is_live_status(404));
        assert!(!is_live_status(500));
    }

    #[tokio::test]
    async fn invalid_url_is_dead_without_network() {
        let client = build_client("test").unwrap();
        let out = check(&client, "http://10.0.0.1/api", &ProbeOptions::default()).await;
        assert!(!out.health.alive);
        assert!(out.health.status_code.is_none());
        assert!(out.health.latency_ms.is_none());
        assert!(out.health.error.is_some());
        assert!(out.pricing.is_empty());
    }

    #[tokio::test]
    async fn batch_survives_individual_failures() {
        let client = build_client("test").unwrap();
        let urls = vec![
            "https://localhost/a".to_string(),
            "ftp://b.example/".to_string(),
            "not a url".to_string(),
        ];
        let out = check_all(&client, urls.clone(), &ProbeOptions::default(), 2).await;
        assert_eq!(out.len(), 3);
        for u in &urls {
            assert!(!out[u].health.alive);
        }
    }

    #[tokio::test]
    async fn concurrency_one_processes_sequential_chunks() {
        let client = build_client("test").unwrap();
        let urls = vec!["https://[::1]/a".to_string(), "https://127.0.0.1/b".to_string()];
        let out = check_all(&client, urls, &ProbeOptions::default(), 1).await;
        assert_eq!(out.len(), 2);
    }
}
