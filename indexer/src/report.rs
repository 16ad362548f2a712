//! Final run summary and export rendering.

use anyhow::Result;
use index_sqlite::ResourceRow;
use indexer_core::EnrichedResource;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub run_id: Uuid,
    pub total_resources: i64,
    pub alive_count: i64,
    pub dead_count: i64,
    pub avg_latency_ms: Option<f64>,
    pub by_category: BTreeMap<String, i64>,
    pub by_network: BTreeMap<String, i64>,
    pub duration_ms: i64,
}

impl Summary {
    pub fn build(run_id: Uuid, resources: &[EnrichedResource], duration_ms: i64) -> Self {
        let alive_count = resources.iter().filter(|r| r.health.alive).count() as i64;

        let latencies: Vec<i64> = resources.iter().filter_map(|r| r.health.latency_ms).collect();
        let avg_latency_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<i64>() as f64 / latencies.len() as f64)
        };

        let mut by_category = BTreeMap::new();
        let mut by_network = BTreeMap::new();
        for r in resources {
            let cat = r.category.clone().unwrap_or_else(|| "uncategorized".to_string());
            *by_category.entry(cat).or_insert(0) += 1;
            for n in &r.networks {
                *by_network.entry(n.clone()).or_insert(0) += 1;
            }
        }

        Summary {
            run_id,
            total_resources: resources.len() as i64,
            alive_count,
            dead_count: resources.len() as i64 - alive_count,
            avg_latency_ms,
            by_category,
            by_network,
            duration_ms,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("run {}\n", self.run_id));
        out.push_str(&format!(
            "resources: {} total, {} alive, {} dead\n",
            self.total_resources, self.alive_count, self.dead_count
        ));
        match self.avg_latency_ms {
            Some(ms) => out.push_str(&format!("avg latency: {:.0} ms\n", ms)),
            None => out.push_str("avg latency: n/a\n"),
        }
        if !self.by_category.is_empty() {
            let cats: Vec<String> = self
                .by_category
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            out.push_str(&format!("by category: {}\n", cats.join(", ")));
        }
        if !self.by_network.is_empty() {
            let nets: Vec<String> = self
                .by_network
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            out.push_str(&format!("by network: {}\n", nets.join(", ")));
        }
        out.push_str(&format!("took {} ms", self.duration_ms));
        out
    }
}

/// Write the indexed resource table as CSV.
pub fn write_csv(path: &Path, rows: &[ResourceRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::fs::File::create(path)?);
    wtr.write_record([
        "url",
        "name",
        "category",
        "source",
        "alive",
        "status",
        "latency_ms",
        "uptime_pct_7d",
        "avg_latency_ms_7d",
        "checks_7d",
    ])?;
    for r in rows {
        wtr.write_record([
            r.url.clone(),
            r.name.clone().unwrap_or_default(),
            r.category.clone().unwrap_or_default(),
            r.source.clone(),
            r.alive.to_string(),
            r.status_code.map(|v| v.to_string()).unwrap_or_default(),
            r.latency_ms.map(|v| v.to_string()).unwrap_or_default(),
            r.uptime_pct_7d.map(|v| format!("{:.1}", v)).unwrap_or_default(),
            r.avg_latency_ms_7d.map(|v| format!("{:.1}", v)).unwrap_or_default(),
            r.check_count_7d.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_core::{DiscoverySource, HealthCheck};

    fn resource(url: &str, alive: bool, latency: Option<i64>, category: Option<&str>, networks: &[&str]) -> EnrichedResource {
        EnrichedResource {
            url: url.to_string(),
            name: None,
            description: None,
            category: category.map(str::to_string),
            protocol_version: 1,
            source: DiscoverySource::DiscoveryApi,
            networks: networks.iter().map(|s| s.to_string()).collect(),
            health: HealthCheck {
                alive,
                status_code: latency.map(|_| 402),
                latency_ms: latency,
                error: None,
                checked_at_ms: 0,
            },
            pricing: Vec::new(),
            last_updated_ms: 0,
        }
    }

    #[test]
    fn summary_counts_and_buckets() {
        let resources = vec![
            resource("https://a/", true, Some(100), Some("ai"), &["base"]),
            resource("https://b/", true, Some(200), Some("ai"), &["base", "base-sepolia"]),
            resource("https://c/", false, None, None, &[]),
        ];
        let s = Summary::build(Uuid::nil(), &resources, 1234);
        assert_eq!(s.total_resources, 3);
        assert_eq!(s.alive_count, 2);
        assert_eq!(s.dead_count, 1);
        assert_eq!(s.avg_latency_ms, Some(150.0));
        assert_eq!(s.by_category["ai"], 2);
        assert_eq!(s.by_category["uncategorized"], 1);
        assert_eq!(s.by_network["base"], 2);
        assert_eq!(s.by_network["base-sepolia"], 1);
    }

    #[test]
    fn summary_with_no_latencies() {
        let resources = vec![resource("https://a/", false, None, None, &[])];
        let s = Summary::build(Uuid::nil(), &resources, 10);
        assert_eq!(s.avg_latency_ms, None);
        let text = s.render_text();
        assert!(text.contains("avg latency: n/a"));
        assert!(text.contains("1 dead"));
    }
}
