//! Multi-source resource merge with priority tie-breaking.
//!
//! Priority: discovery API > ecosystem listing > partner files. The
//! highest-priority sighting of a URL claims it and its provenance tag;
//! lower-priority sightings only back-fill descriptive fields that are
//! still empty. Each unique URL is health-checked exactly once, and the
//! check map joins back on afterwards.

use indexer_core::{now_ms, EndpointCandidate, EnrichedCheck, EnrichedResource};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Deduplicate candidates by URL under source priority.
pub fn merge(candidates: Vec<EndpointCandidate>) -> BTreeMap<String, EndpointCandidate> {
    let mut ordered = candidates;
    // Stable sort: within one source, first sighting wins.
    ordered.sort_by_key(|c| c.source.priority());

    let mut merged: BTreeMap<String, EndpointCandidate> = BTreeMap::new();
    for candidate in ordered {
        match merged.entry(candidate.url.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => fill_missing(slot.get_mut(), candidate),
        }
    }
    merged
}

/// Back-fill empty descriptive fields from a lower-priority sighting.
/// A present value is never overwritten and never blanked.
fn fill_missing(winner: &mut EndpointCandidate, other: EndpointCandidate) {
    fill_field(&mut winner.name, other.name);
    fill_field(&mut winner.description, other.description);
    fill_field(&mut winner.category, other.category);
    for n in other.networks {
        if !winner.networks.contains(&n) {
            winner.networks.push(n);
        }
    }
}

fn fill_field(dst: &mut Option<String>, src: Option<String>) {
    let empty = dst.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
    if empty {
        if let Some(v) = src.filter(|s| !s.trim().is_empty()) {
            *dst = Some(v);
        }
    }
}

/// Join health-check outcomes back onto the merged set. Supported
/// networks are the union of source-declared networks and the networks
/// named in live pricing.
pub fn attach_checks(
    merged: BTreeMap<String, EndpointCandidate>,
    mut checks: HashMap<String, EnrichedCheck>,
) -> Vec<EnrichedResource> {
    let stamped_at = now_ms();
    merged
        .into_values()
        .map(|c| {
            let outcome = checks
                .remove(&c.url)
                .unwrap_or_else(|| EnrichedCheck::dead("endpoint was not checked", stamped_at));
            let mut networks: BTreeSet<String> = c.networks.into_iter().collect();
            for p in &outcome.pricing {
                networks.insert(p.network.clone());
            }
            EnrichedResource {
                url: c.url,
                name: c.name,
                description: c.description,
                category: c.category,
                protocol_version: c.protocol_version,
                source: c.source,
                networks: networks.into_iter().collect(),
                health: outcome.health,
                pricing: outcome.pricing,
                last_updated_ms: stamped_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_core::{DiscoverySource, HealthCheck, PricingRequirement};

    fn candidate(url: &str, source: DiscoverySource, name: Option<&str>) -> EndpointCandidate {
        let mut c = EndpointCandidate::new(url, source);
        c.name = name.map(str::to_string);
        c
    }

    #[test]
    fn higher_priority_name_wins() {
        let merged = merge(vec![
            candidate("https://a.example/api", DiscoverySource::EcosystemListing, Some("listed")),
            candidate("https://a.example/api", DiscoverySource::DiscoveryApi, Some("official")),
        ]);
        assert_eq!(merged.len(), 1);
        let r = &merged["https://a.example/api"];
        assert_eq!(r.name.as_deref(), Some("official"));
        assert_eq!(r.source, DiscoverySource::DiscoveryApi);
    }

    #[test]
    fn missing_fields_back_fill_from_lower_priority() {
        let mut low = candidate("https://a.example/api", DiscoverySource::PartnerFile, Some("partner"));
        low.description = Some("a partner api".into());
        low.networks = vec!["base".into()];
        let high = candidate("https://a.example/api", DiscoverySource::DiscoveryApi, None);

        let merged = merge(vec![low, high]);
        let r = &merged["https://a.example/api"];
        assert_eq!(r.source, DiscoverySource::DiscoveryApi);
        assert_eq!(r.name.as_deref(), Some("partner"));
        assert_eq!(r.description.as_deref(), Some("a partner api"));
        assert_eq!(r.networks, vec!["base".to_string()]);
    }

    #[test]
    fn blank_strings_do_not_block_back_fill() {
        let mut high = candidate("https://a.example/", DiscoverySource::DiscoveryApi, Some("  "));
        high.category = Some(String::new());
        let mut low = candidate("https://a.example/", DiscoverySource::PartnerFile, Some("real name"));
        low.category = Some("ai".into());

        let merged = merge(vec![high, low]);
        let r = &merged["https://a.example/"];
        assert_eq!(r.name.as_deref(), Some("real name"));
        assert_eq!(r.category.as_deref(), Some("ai"));
    }

    #[test]
    fn distinct_urls_pass_through() {
        let merged = merge(vec![
            candidate("https://a.example/api", DiscoverySource::DiscoveryApi, None),
            candidate("https://b.example/api", DiscoverySource::PartnerFile, None),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn attach_joins_checks_and_unions_networks() {
        let mut c = candidate("https://b.example/api", DiscoverySource::DiscoveryApi, None);
        c.networks = vec!["base-sepolia".into()];
        let merged = merge(vec![c]);

        let mut checks = HashMap::new();
        checks.insert(
            "https://b.example/api".to_string(),
            EnrichedCheck {
                health: HealthCheck {
                    alive: true,
                    status_code: Some(402),
                    latency_ms: Some(88),
                    error: None,
                    checked_at_ms: 1,
                },
                pricing: vec![PricingRequirement {
                    scheme: "exact".into(),
                    network: "base".into(),
                    max_amount_required: "10000".into(),
                    asset: "USDC".into(),
                    pay_to: "0xabc".into(),
                    max_timeout_seconds: 60,
                    formatted_amount: "0.01 USDC".into(),
                }],
            },
        );

        let resources = attach_checks(merged, checks);
        assert_eq!(resources.len(), 1);
        let r = &resources[0];
        assert!(r.health.alive);
        assert_eq!(r.pricing.len(), 1);
        assert_eq!(r.networks, vec!["base".to_string(), "base-sepolia".to_string()]);
    }

    #[test]
    fn unchecked_resource_gets_dead_placeholder() {
        let merged = merge(vec![candidate("https://c.example/", DiscoverySource::DiscoveryApi, None)]);
        let resources = attach_checks(merged, HashMap::new());
        assert!(!resources[0].health.alive);
        assert_eq!(resources[0].health.error.as_deref(), Some("endpoint was not checked"));
    }
}
