//! Discovery-source adapters: thin I/O wrappers that each yield a list of
//! endpoint candidates. The pipeline only depends on that shape; how a
//! list is obtained (API call, page scrape, file read) stays in here.

use anyhow::{Context, Result};
use fetch_client::fetch_with_timeout;
use indexer_core::{DiscoverySource, EndpointCandidate};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Source bodies share the source's request deadline; the request timeout
/// alone only covers up to the response headers.
async fn bounded<T>(timeout_ms: u64, what: &str, read: impl Future<Output = reqwest::Result<T>>) -> Result<T> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), read)
        .await
        .map_err(|_| anyhow::anyhow!("{} body read timed out after {} ms", what, timeout_ms))?
        .with_context(|| format!("{} body", what))
}

/// GET `<facilitator>/discovery/resources` and parse its item list.
pub async fn fetch_discovery_api(
    client: &Client,
    facilitator: &str,
    timeout_ms: u64,
) -> Result<Vec<EndpointCandidate>> {
    let url = format!("{}/discovery/resources", facilitator.trim_end_matches('/'));
    let req = client.get(&url).header(ACCEPT, "application/json").build()?;
    let resp = fetch_with_timeout(client, req, timeout_ms)
        .await
        .with_context(|| format!("discovery api {}", url))?;
    let body: Value = bounded(timeout_ms, &format!("discovery api {}", url), resp.json()).await?;
    Ok(candidates_from_items(&body, DiscoverySource::DiscoveryApi))
}

/// Fetch an ecosystem listing page. A JSON body is read directly; an HTML
/// page is mined for its `__NEXT_DATA__` blob. Anything unrecognizable
/// yields an empty list rather than an error.
pub async fn fetch_ecosystem(
    client: &Client,
    listing_url: &str,
    timeout_ms: u64,
) -> Result<Vec<EndpointCandidate>> {
    let req = client.get(listing_url).build()?;
    let resp = fetch_with_timeout(client, req, timeout_ms)
        .await
        .with_context(|| format!("ecosystem listing {}", listing_url))?;
    let text = bounded(timeout_ms, &format!("ecosystem listing {}", listing_url), resp.text()).await?;

    if let Ok(v) = serde_json::from_str::<Value>(&text) {
        return Ok(mine_listing(&v));
    }
    let re = regex::Regex::new(r#"(?s)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#)
        .expect("static regex");
    if let Some(cap) = re.captures(&text) {
        if let Ok(v) = serde_json::from_str::<Value>(&cap[1]) {
            return Ok(mine_listing(&v));
        }
    }
    log::warn!("ecosystem listing {} had no parseable payload", listing_url);
    Ok(Vec::new())
}

#[derive(Debug, Deserialize)]
struct PartnerEntry {
    url: String,
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    #[serde(default)]
    networks: Vec<String>,
}

/// Read `*.yaml`/`*.yml` partner files from a directory. Unreadable files
/// are skipped with a warning; they never fail the run.
pub fn load_partner_dir(dir: &Path) -> Result<Vec<EndpointCandidate>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("partner dir {}", dir.display()))? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_yaml::from_str::<PartnerEntry>(&s).map_err(anyhow::Error::from));
        match parsed {
            Ok(p) => {
                let mut c = EndpointCandidate::new(p.url, DiscoverySource::PartnerFile);
                c.name = p.name;
                c.description = p.description;
                c.category = p.category;
                c.networks = p.networks;
                out.push(c);
            }
            Err(e) => log::warn!("skipping partner file {}: {:#}", path.display(), e),
        }
    }
    Ok(out)
}

/// Listing payloads vary; prefer an explicit item list, else walk the
/// document for objects that look like resource entries.
fn mine_listing(v: &Value) -> Vec<EndpointCandidate> {
    let direct = candidates_from_items(v, DiscoverySource::EcosystemListing);
    if !direct.is_empty() {
        return direct;
    }
    let mut out = Vec::new();
    walk_for_resources(v, 0, &mut out);
    out
}

fn walk_for_resources(v: &Value, depth: usize, out: &mut Vec<EndpointCandidate>) {
    if depth > 16 {
        return;
    }
    match v {
        Value::Array(arr) => {
            for item in arr {
                walk_for_resources(item, depth + 1, out);
            }
        }
        Value::Object(_) => {
            if let Some(c) = candidate_from_item(v, DiscoverySource::EcosystemListing) {
                out.push(c);
                return;
            }
            for (_, child) in v.as_object().into_iter().flatten() {
                walk_for_resources(child, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn candidates_from_items(v: &Value, source: DiscoverySource) -> Vec<EndpointCandidate> {
    let items = match v.get("items").and_then(Value::as_array).or_else(|| v.as_array()) {
        Some(arr) => arr,
        None => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| candidate_from_item(item, source))
        .collect()
}

fn candidate_from_item(item: &Value, source: DiscoverySource) -> Option<EndpointCandidate> {
    let url = item
        .get("resource")
        .or_else(|| item.get("url"))
        .and_then(Value::as_str)?;
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return None;
    }
    let mut c = EndpointCandidate::new(url, source);
    c.name = str_field(item, "name");
    c.description = str_field(item, "description");
    c.category = str_field(item, "category");
    c.protocol_version = item
        .get("x402Version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;
    if let Some(accepts) = item.get("accepts").and_then(Value::as_array) {
        for a in accepts {
            if let Some(n) = a.get("network").and_then(Value::as_str) {
                if !c.networks.iter().any(|x| x == n) {
                    c.networks.push(n.to_string());
                }
            }
        }
    }
    Some(c)
}

/// Field lookup on the item itself or nested under `metadata`.
fn str_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .or_else(|| item.get("metadata").and_then(|m| m.get(key)))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_discovery_items() {
        let body = json!({
            "items": [
                {
                    "resource": "https://a.example/api",
                    "x402Version": 1,
                    "metadata": { "name": "A", "category": "data" },
                    "accepts": [
                        { "network": "base" },
                        { "network": "base" },
                        { "network": "base-sepolia" }
                    ]
                },
                { "description": "no url, skipped" }
            ]
        });
        let out = candidates_from_items(&body, DiscoverySource::DiscoveryApi);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name.as_deref(), Some("A"));
        assert_eq!(out[0].category.as_deref(), Some("data"));
        assert_eq!(out[0].networks, vec!["base".to_string(), "base-sepolia".to_string()]);
    }

    #[test]
    fn bare_array_bodies_are_accepted() {
        let body = json!([{ "url": "https://b.example/", "name": "B" }]);
        let out = candidates_from_items(&body, DiscoverySource::DiscoveryApi);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://b.example/");
    }

    #[test]
    fn mines_nested_listing_shapes() {
        let page = json!({
            "props": {
                "pageProps": {
                    "resources": [
                        { "url": "https://c.example/x402", "name": "C" },
                        { "url": "wss://not-http.example/" }
                    ]
                }
            }
        });
        let out = mine_listing(&page);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://c.example/x402");
        assert_eq!(out[0].source, DiscoverySource::EcosystemListing);
    }

    #[test]
    fn partner_dir_skips_bad_files() {
        let dir = std::env::temp_dir().join(format!("partners-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("good.yaml"), "url: https://p.example/\nname: P\nnetworks: [base]\n").unwrap();
        std::fs::write(dir.join("bad.yaml"), ":- not yaml").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let out = load_partner_dir(&dir).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://p.example/");
        assert_eq!(out[0].source, DiscoverySource::PartnerFile);
        assert_eq!(out[0].networks, vec!["base".to_string()]);
    }
}
