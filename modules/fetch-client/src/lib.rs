//! Bounded HTTP transport: hard per-request timeout plus retry with
//! exponential backoff. No logging here; this layer is a pure primitive.
//!
//! Only transport failures are ever retried. An HTTP error status is a
//! valid application-level answer and comes back as `Ok(Response)`.

use reqwest::{Client, Request, Response};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("request could not be cloned for retry")]
    NotRetryable,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    /// Transient failures are worth retrying: timeouts, aborts, connection
    /// resets, DNS failures, and generic network errors. Everything else
    /// propagates immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::NotRetryable => false,
            FetchError::Transport(e) => transport_is_transient(e),
        }
    }
}

fn transport_is_transient(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() {
        return true;
    }
    // reqwest wraps hyper/io causes; walk the chain for the usual suspects.
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = cur {
        let msg = err.to_string().to_ascii_lowercase();
        if msg.contains("connection reset")
            || msg.contains("aborted")
            || msg.contains("dns")
            || msg.contains("failed to lookup")
            || msg.contains("network")
        {
            return true;
        }
        cur = err.source();
    }
    false
}

/// Send `req`, cancelling the in-flight request at exactly `timeout_ms`.
/// A deadline miss yields `FetchError::Timeout`, distinguishable from
/// other transport failures.
pub async fn fetch_with_timeout(
    client: &Client,
    req: Request,
    timeout_ms: u64,
) -> Result<Response, FetchError> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), client.execute(req)).await {
        Ok(Ok(resp)) => Ok(resp),
        Ok(Err(e)) => Err(FetchError::Transport(e)),
        Err(_) => Err(FetchError::Timeout { after_ms: timeout_ms }),
    }
}

/// Run `op` up to `retries + 1` times, retrying only transient failures.
/// Delay before retry k (0-indexed) is `base_delay * 2^k`; the last error
/// propagates unchanged once the budget is spent.
pub async fn retry_with_backoff<T, F, Fut>(
    retries: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < retries => {
                let delay = base_delay.saturating_mul(1u32 << attempt.min(16));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Timeout-bounded fetch wrapped in the retry policy. The request must be
/// cloneable (bodyless or buffered); a streaming body cannot be replayed.
pub async fn fetch_with_retry(
    client: &Client,
    req: Request,
    timeout_ms: u64,
    retries: u32,
    base_delay: Duration,
) -> Result<Response, FetchError> {
    retry_with_backoff(retries, base_delay, |_attempt| {
        let cloned = req.try_clone();
        async move {
            match cloned {
                Some(r) => fetch_with_timeout(client, r, timeout_ms).await,
                None => Err(FetchError::NotRetryable),
            }
        }
    })
    .await
}
