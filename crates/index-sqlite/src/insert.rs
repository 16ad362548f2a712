use crate::{Db, HealthAggregate, ResourceId, RunCounts, RunMeta, SEVEN_DAYS_MS};
use anyhow::{anyhow, Result};
use indexer_core::{EnrichedResource, RunStatus};
use rusqlite::{params, Transaction};
use uuid::Uuid;

/// Empty strings from upstream payloads bind as NULL so they can never
/// clobber a stored value through COALESCE.
fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Db {
    pub fn begin_run(&self, meta: &RunMeta) -> Result<Uuid> {
        self.conn.execute(
            "INSERT INTO index_runs(run_id, started_at_ms, status) VALUES (?,?, 'running')",
            params![meta.run_id.to_string(), meta.started_at_ms],
        )?;
        Ok(meta.run_id)
    }

    /// Close a run. Valid exactly once per run: the ledger only moves
    /// running -> completed|failed.
    pub fn finish_run(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        completed_at_ms: i64,
        counts: RunCounts,
        error: Option<&str>,
    ) -> Result<()> {
        if status == RunStatus::Running {
            return Err(anyhow!("a run cannot be closed as 'running'"));
        }
        let changed = self.conn.execute(
            "UPDATE index_runs
             SET status=?, completed_at_ms=?, total_resources=?, alive_count=?, error=?,
                 duration_ms=?-started_at_ms
             WHERE run_id=? AND status='running'",
            params![
                status.as_str(),
                completed_at_ms,
                counts.total_resources,
                counts.alive_count,
                error,
                completed_at_ms,
                run_id.to_string()
            ],
        )?;
        if changed != 1 {
            return Err(anyhow!("run {} is not open", run_id));
        }
        Ok(())
    }

    /// Persist one merged, health-checked resource as a single atomic
    /// transaction: resource upsert, pricing upserts, history append,
    /// rolling-aggregate recompute. The aggregate is always a pure
    /// function of the history rows in the trailing 7 days.
    pub fn upsert_resource(&mut self, res: &EnrichedResource, now_ms: i64) -> Result<ResourceId> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO resources(url,name,description,category,protocol_version,source,networks_json,last_updated_ms)
             VALUES (?,?,?,?,?,?,?,?)
             ON CONFLICT(url) DO UPDATE SET
               name=COALESCE(excluded.name, resources.name),
               description=COALESCE(excluded.description, resources.description),
               category=COALESCE(excluded.category, resources.category),
               protocol_version=excluded.protocol_version,
               networks_json=excluded.networks_json,
               last_updated_ms=excluded.last_updated_ms",
            params![
                res.url,
                non_empty(&res.name),
                non_empty(&res.description),
                non_empty(&res.category),
                res.protocol_version as i64,
                res.source.as_str(),
                serde_json::to_string(&res.networks)?,
                res.last_updated_ms,
            ],
        )?;
        // Provenance keeps the highest-priority source ever seen.
        tx.execute(
            "UPDATE resources SET source=?1
             WHERE url=?2
               AND (CASE source WHEN 'discovery_api' THEN 0
                                WHEN 'ecosystem_listing' THEN 1
                                ELSE 2 END) > ?3",
            params![res.source.as_str(), res.url, res.source.priority() as i64],
        )?;
        let resource_id: ResourceId = tx.query_row(
            "SELECT resource_id FROM resources WHERE url=?",
            [&res.url],
            |r| r.get(0),
        )?;

        for p in &res.pricing {
            tx.execute(
                "INSERT INTO pricing(resource_id,scheme,network,max_amount_required,asset,pay_to,max_timeout_seconds,formatted_amount)
                 VALUES (?,?,?,?,?,?,?,?)
                 ON CONFLICT(resource_id,network,asset) DO UPDATE SET
                   scheme=excluded.scheme,
                   max_amount_required=excluded.max_amount_required,
                   pay_to=excluded.pay_to,
                   max_timeout_seconds=excluded.max_timeout_seconds,
                   formatted_amount=excluded.formatted_amount",
                params![
                    resource_id,
                    p.scheme,
                    p.network,
                    p.max_amount_required,
                    p.asset,
                    p.pay_to,
                    p.max_timeout_seconds as i64,
                    p.formatted_amount,
                ],
            )?;
        }

        tx.execute(
            "INSERT INTO health_history(resource_id,alive,status_code,latency_ms,error,checked_at_ms)
             VALUES (?,?,?,?,?,?)",
            params![
                resource_id,
                res.health.alive as i64,
                res.health.status_code.map(|c| c as i64),
                res.health.latency_ms,
                res.health.error,
                res.health.checked_at_ms,
            ],
        )?;

        let agg = recompute_aggregate(&tx, resource_id, now_ms)?;
        tx.execute(
            "INSERT INTO health_current(resource_id,alive,status_code,latency_ms,error,checked_at_ms,uptime_pct_7d,avg_latency_ms_7d,check_count_7d)
             VALUES (?,?,?,?,?,?,?,?,?)
             ON CONFLICT(resource_id) DO UPDATE SET
               alive=excluded.alive,
               status_code=excluded.status_code,
               latency_ms=excluded.latency_ms,
               error=excluded.error,
               checked_at_ms=excluded.checked_at_ms,
               uptime_pct_7d=excluded.uptime_pct_7d,
               avg_latency_ms_7d=excluded.avg_latency_ms_7d,
               check_count_7d=excluded.check_count_7d",
            params![
                resource_id,
                res.health.alive as i64,
                res.health.status_code.map(|c| c as i64),
                res.health.latency_ms,
                res.health.error,
                res.health.checked_at_ms,
                agg.uptime_pct_7d,
                agg.avg_latency_ms_7d,
                agg.check_count_7d,
            ],
        )?;

        tx.commit()?;
        Ok(resource_id)
    }

    /// Retention cleanup: drop history older than `retention_days` and
    /// purge resources not re-sighted within the window (cascading their
    /// pricing, history, and current-aggregate rows). History retention
    /// never drops below seven days; the rolling aggregates read that far
    /// back and must keep their input.
    pub fn prune(&self, retention_days: u32, now_ms: i64) -> Result<(usize, usize)> {
        let retention_ms = i64::from(retention_days) * 24 * 60 * 60 * 1000;
        let resource_cutoff = now_ms - retention_ms;
        let history_cutoff = now_ms - retention_ms.max(SEVEN_DAYS_MS);
        let resources_purged = self
            .conn
            .execute("DELETE FROM resources WHERE last_updated_ms < ?", [resource_cutoff])?;
        let history_pruned = self
            .conn
            .execute("DELETE FROM health_history WHERE checked_at_ms < ?", [history_cutoff])?;
        Ok((resources_purged, history_pruned))
    }
}

fn recompute_aggregate(tx: &Transaction<'_>, resource_id: ResourceId, now_ms: i64) -> Result<HealthAggregate> {
    let cutoff = now_ms - SEVEN_DAYS_MS;
    let (total, alive, avg_latency): (i64, i64, Option<f64>) = tx.query_row(
        "SELECT COUNT(*), COALESCE(SUM(alive),0), AVG(latency_ms)
         FROM health_history
         WHERE resource_id=? AND checked_at_ms >= ?",
        params![resource_id, cutoff],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    let uptime = if total > 0 {
        Some(alive as f64 / total as f64 * 100.0)
    } else {
        None
    };
    Ok(HealthAggregate {
        uptime_pct_7d: uptime,
        avg_latency_ms_7d: avg_latency,
        check_count_7d: total,
    })
}
