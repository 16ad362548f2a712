use crate::{Db, ResourceRow};
use anyhow::Result;
use rusqlite::params;

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    /// Resources joined with their current health, for reporting/export.
    pub fn list_resources(&self) -> Result<Vec<ResourceRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.resource_id, r.url, r.name, r.category, r.source,
                    COALESCE(h.alive, 0), h.status_code, h.latency_ms,
                    h.uptime_pct_7d, h.avg_latency_ms_7d, COALESCE(h.check_count_7d, 0)
             FROM resources r
             LEFT JOIN health_current h ON h.resource_id = r.resource_id
             ORDER BY r.url",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ResourceRow {
                    resource_id: r.get(0)?,
                    url: r.get(1)?,
                    name: r.get(2)?,
                    category: r.get(3)?,
                    source: r.get(4)?,
                    alive: r.get::<_, i64>(5)? != 0,
                    status_code: r.get(6)?,
                    latency_ms: r.get(7)?,
                    uptime_pct_7d: r.get(8)?,
                    avg_latency_ms_7d: r.get(9)?,
                    check_count_7d: r.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// History rows for one endpoint within a trailing window, most
    /// recent first.
    pub fn recent_checks(&self, url: &str, since_ms: i64) -> Result<Vec<(bool, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT h.alive, h.checked_at_ms
             FROM health_history h
             JOIN resources r ON r.resource_id = h.resource_id
             WHERE r.url = ? AND h.checked_at_ms >= ?
             ORDER BY h.checked_at_ms DESC",
        )?;
        let rows = stmt
            .query_map(params![url, since_ms], |r| {
                Ok((r.get::<_, i64>(0)? != 0, r.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_tables_exist() {
        let db = Db::open_in_memory().unwrap();
        for t in ["index_runs", "resources", "pricing", "health_history", "health_current"] {
            assert!(db.table_exists(t).unwrap(), "missing table {}", t);
        }
        assert!(!db.table_exists("hosts").unwrap());
    }

    #[test]
    fn list_resources_is_empty_on_fresh_db() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.list_resources().unwrap().is_empty());
    }
}
