//! Payment-requirement extraction from a 402 response.
//!
//! Two carriers, first non-empty wins: the `x-payment-required` response
//! header (base64-encoded JSON, raw JSON fallback), then the JSON body's
//! `accepts` array. Elements are validated one by one; a bad element is
//! skipped, never fatal, so partially-typed data cannot leak downstream.

use crate::tokens;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexer_core::PricingRequirement;
use reqwest::Response;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub(crate) const PAYMENT_REQUIRED_HEADER: &str = "x-payment-required";

/// Protocol default when an accepts element omits maxTimeoutSeconds.
const DEFAULT_MAX_TIMEOUT_SECS: u64 = 60;

/// Hard cap on the 402 body; a pricing document is tiny, anything larger
/// is discarded unread.
const MAX_PRICING_BODY_BYTES: usize = 256 * 1024;

pub(crate) async fn extract_pricing(resp: Response, body_deadline: Duration) -> Vec<PricingRequirement> {
    if let Some(raw) = resp
        .headers()
        .get(PAYMENT_REQUIRED_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
    {
        let from_header = parse_payment_header(&raw);
        if !from_header.is_empty() {
            return from_header;
        }
    }

    // The request timeout resolves once headers arrive; the body gets its
    // own deadline so a trickling endpoint cannot stall the probe.
    let body = match tokio::time::timeout(body_deadline, read_body_capped(resp)).await {
        Ok(Some(bytes)) => bytes,
        _ => return Vec::new(),
    };
    match serde_json::from_slice::<Value>(&body) {
        Ok(v) => requirements_from_value(&v),
        Err(_) => Vec::new(),
    }
}

async fn read_body_capped(mut resp: Response) -> Option<Vec<u8>> {
    if resp.content_length().is_some_and(|len| len > MAX_PRICING_BODY_BYTES as u64) {
        return None;
    }
    let mut buf = Vec::new();
    while let Some(chunk) = resp.chunk().await.ok()? {
        if buf.len() + chunk.len() > MAX_PRICING_BODY_BYTES {
            return None;
        }
        buf.extend_from_slice(&chunk);
    }
    Some(buf)
}

/// Parse the payment header value: base64-decoded JSON first, then the
/// raw string as JSON if decoding fails or yields nothing usable.
pub fn parse_payment_header(raw: &str) -> Vec<PricingRequirement> {
    if let Ok(decoded) = BASE64.decode(raw.trim()) {
        if let Ok(v) = serde_json::from_slice::<Value>(&decoded) {
            let reqs = requirements_from_value(&v);
            if !reqs.is_empty() {
                return reqs;
            }
        }
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v) => requirements_from_value(&v),
        Err(_) => Vec::new(),
    }
}

/// Accepts either `{ "accepts": [...] }` or a bare requirement array.
/// Invalid elements are dropped individually.
pub fn requirements_from_value(v: &Value) -> Vec<PricingRequirement> {
    let items = match v {
        Value::Array(arr) => arr.as_slice(),
        Value::Object(_) => match v.get("accepts").and_then(Value::as_array) {
            Some(arr) => arr.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| validate_requirement(item).ok())
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequirement {
    scheme: String,
    network: String,
    max_amount_required: String,
    asset: String,
    pay_to: String,
    #[serde(default = "default_timeout")]
    max_timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECS
}

/// Schema boundary for one untrusted accepts element: either a fully
/// typed requirement or a reason it was rejected.
pub fn validate_requirement(v: &Value) -> Result<PricingRequirement, String> {
    let raw: RawRequirement = serde_json::from_value(v.clone()).map_err(|e| e.to_string())?;
    for (field, val) in [
        ("scheme", &raw.scheme),
        ("network", &raw.network),
        ("maxAmountRequired", &raw.max_amount_required),
        ("asset", &raw.asset),
        ("payTo", &raw.pay_to),
    ] {
        if val.trim().is_empty() {
            return Err(format!("empty required field: {}", field));
        }
    }
    let formatted_amount = tokens::format_amount(&raw.max_amount_required, &raw.asset);
    Ok(PricingRequirement {
        scheme: raw.scheme,
        network: raw.network,
        max_amount_required: raw.max_amount_required,
        asset: raw.asset,
        pay_to: raw.pay_to,
        max_timeout_seconds: raw.max_timeout_seconds,
        formatted_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn usdc_base() -> &'static str {
        "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
    }

    fn accepts_doc() -> Value {
        json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": "base",
                "maxAmountRequired": "10000",
                "asset": usdc_base(),
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 30
            }]
        })
    }

    #[test]
    fn parses_accepts_object() {
        let reqs = requirements_from_value(&accepts_doc());
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].network, "base");
        assert_eq!(reqs[0].max_timeout_seconds, 30);
        assert_eq!(reqs[0].formatted_amount, "0.01 USDC");
    }

    #[test]
    fn parses_bare_array() {
        let arr = accepts_doc()["accepts"].clone();
        assert_eq!(requirements_from_value(&arr).len(), 1);
    }

    #[test]
    fn skips_invalid_elements_without_failing() {
        let doc = json!({
            "accepts": [
                { "scheme": "exact" },
                accepts_doc()["accepts"][0],
                { "scheme": "exact", "network": "", "maxAmountRequired": "1",
                  "asset": "USDC", "payTo": "x" },
                42
            ]
        });
        let reqs = requirements_from_value(&doc);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].network, "base");
    }

    #[test]
    fn missing_timeout_defaults() {
        let el = json!({
            "scheme": "exact", "network": "base-sepolia",
            "maxAmountRequired": "1000000", "asset": usdc_base(),
            "payTo": "0xabc"
        });
        let r = validate_requirement(&el).unwrap();
        assert_eq!(r.max_timeout_seconds, 60);
    }

    #[test]
    fn header_base64_then_raw_json() {
        let doc = accepts_doc().to_string();
        let encoded = BASE64.encode(doc.as_bytes());
        assert_eq!(parse_payment_header(&encoded).len(), 1);
        assert_eq!(parse_payment_header(&doc).len(), 1);
        assert!(parse_payment_header("definitely not json").is_empty());
    }

    fn response_402(header: Option<&str>, body: String) -> Response {
        let mut b = http::Response::builder().status(402);
        if let Some(h) = header {
            b = b.header(PAYMENT_REQUIRED_HEADER, h);
        }
        Response::from(b.body(body).unwrap())
    }

    fn deadline() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn header_wins_over_body() {
        let mut header_doc = accepts_doc();
        header_doc["accepts"][0]["network"] = json!("base-sepolia");
        let encoded = BASE64.encode(header_doc.to_string().as_bytes());
        let resp = response_402(Some(&encoded), accepts_doc().to_string());
        let reqs = extract_pricing(resp, deadline()).await;
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].network, "base-sepolia");
    }

    #[tokio::test]
    async fn unusable_header_falls_back_to_body() {
        let resp = response_402(Some("definitely not json"), accepts_doc().to_string());
        let reqs = extract_pricing(resp, deadline()).await;
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].network, "base");
    }

    #[tokio::test]
    async fn body_without_accepts_yields_nothing() {
        let resp = response_402(None, json!({"error": "payment required"}).to_string());
        assert!(extract_pricing(resp, deadline()).await.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_discarded_unparsed() {
        let mut doc = accepts_doc();
        doc["padding"] = json!("x".repeat(300 * 1024));
        let resp = response_402(None, doc.to_string());
        assert!(extract_pricing(resp, deadline()).await.is_empty());
    }

    #[test]
    fn non_accepts_shapes_yield_nothing() {
        assert!(requirements_from_value(&json!("x")).is_empty());
        assert!(requirements_from_value(&json!({"items": []})).is_empty());
        assert!(requirements_from_value(&json!(null)).is_empty());
    }
}
