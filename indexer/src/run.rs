//! One indexing pass: fetch all sources, merge, health-check, persist,
//! summarize. Source failures degrade to warnings; only the storage layer
//! can fail a run.

use crate::report::Summary;
use crate::sources;
use anyhow::{Context, Result};
use health_probe::ProbeOptions;
use index_sqlite::{Db, RunCounts, RunMeta};
use indexer_core::{now_ms, EndpointCandidate, RunStatus};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub facilitators: Vec<String>,
    pub ecosystem_url: Option<String>,
    pub partner_dir: Option<PathBuf>,
    pub probe: ProbeOptions,
    pub concurrency: usize,
    pub source_timeout_ms: u64,
    pub prune_days: u32,
}

pub async fn run_index(db: &mut Db, opts: &RunOptions) -> Result<Summary> {
    let started = Instant::now();
    let meta = RunMeta { run_id: Uuid::now_v7(), started_at_ms: now_ms() };
    db.begin_run(&meta)?;
    log::info!("index run {} started", meta.run_id);

    let client = health_probe::build_client(&format!("x402-indexer/{}", env!("CARGO_PKG_VERSION")))?;

    let mut candidates: Vec<EndpointCandidate> = Vec::new();
    for facilitator in &opts.facilitators {
        match sources::fetch_discovery_api(&client, facilitator, opts.source_timeout_ms).await {
            Ok(mut list) => {
                log::info!("discovery api {}: {} resources", facilitator, list.len());
                candidates.append(&mut list);
            }
            Err(e) => log::warn!("discovery api {} failed: {:#}", facilitator, e),
        }
    }
    if let Some(listing) = &opts.ecosystem_url {
        match sources::fetch_ecosystem(&client, listing, opts.source_timeout_ms).await {
            Ok(mut list) => {
                log::info!("ecosystem listing: {} resources", list.len());
                candidates.append(&mut list);
            }
            Err(e) => log::warn!("ecosystem listing {} failed: {:#}", listing, e),
        }
    }
    if let Some(dir) = &opts.partner_dir {
        match sources::load_partner_dir(dir) {
            Ok(mut list) => {
                log::info!("partner files: {} resources", list.len());
                candidates.append(&mut list);
            }
            Err(e) => log::warn!("partner dir {} failed: {:#}", dir.display(), e),
        }
    }

    let merged = source_merge::merge(candidates);
    let urls: Vec<String> = merged.keys().cloned().collect();
    log::info!("{} unique endpoints after merge", urls.len());

    let checks = health_probe::check_all(&client, urls, &opts.probe, opts.concurrency).await;
    let resources = source_merge::attach_checks(merged, checks);

    let counts = RunCounts {
        total_resources: resources.len() as i64,
        alive_count: resources.iter().filter(|r| r.health.alive).count() as i64,
    };

    // Each resource is its own transaction; whatever committed before a
    // storage failure stays committed.
    let stamp = now_ms();
    for resource in &resources {
        if let Err(e) = db
            .upsert_resource(resource, stamp)
            .with_context(|| format!("persisting {}", resource.url))
        {
            let msg = format!("{:#}", e);
            if let Err(close_err) = db.finish_run(&meta.run_id, RunStatus::Failed, now_ms(), counts, Some(&msg)) {
                log::error!("failed to close run {}: {:#}", meta.run_id, close_err);
            }
            return Err(e);
        }
    }

    if opts.prune_days > 0 {
        match db.prune(opts.prune_days, now_ms()) {
            Ok((purged, pruned)) => {
                log::info!("retention: purged {} stale resources, {} old checks", purged, pruned);
            }
            Err(e) => {
                let e = e.context("retention cleanup");
                let msg = format!("{:#}", e);
                if let Err(close_err) =
                    db.finish_run(&meta.run_id, RunStatus::Failed, now_ms(), counts, Some(&msg))
                {
                    log::error!("failed to close run {}: {:#}", meta.run_id, close_err);
                }
                return Err(e);
            }
        }
    }

    db.finish_run(&meta.run_id, RunStatus::Completed, now_ms(), counts, None)?;
    let summary = Summary::build(meta.run_id, &resources, started.elapsed().as_millis() as i64);
    log::info!("index run {} completed in {} ms", meta.run_id, summary.duration_ms);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_source_opts(prune_days: u32) -> RunOptions {
        RunOptions {
            facilitators: Vec::new(),
            ecosystem_url: None,
            partner_dir: None,
            probe: ProbeOptions::default(),
            concurrency: 4,
            source_timeout_ms: 1_000,
            prune_days,
        }
    }

    #[tokio::test]
    async fn empty_run_closes_completed() {
        let mut db = Db::open_in_memory().unwrap();
        let summary = run_index(&mut db, &no_source_opts(0)).await.unwrap();
        assert_eq!(summary.total_resources, 0);
        let status: String = db
            .conn
            .query_row("SELECT status FROM index_runs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn retention_failure_closes_run_as_failed() {
        let mut db = Db::open_in_memory().unwrap();
        // Sabotage the history table so the retention pass errors out.
        db.conn.execute_batch("DROP TABLE health_history").unwrap();

        let out = run_index(&mut db, &no_source_opts(30)).await;
        assert!(out.is_err());

        let (status, error): (String, Option<String>) = db
            .conn
            .query_row("SELECT status, error FROM index_runs", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(status, "failed");
        assert!(error.unwrap().contains("retention cleanup"));
    }
}
