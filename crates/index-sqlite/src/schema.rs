pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE index_runs (
  run_id          TEXT PRIMARY KEY,
  started_at_ms   INTEGER NOT NULL,
  completed_at_ms INTEGER,
  status          TEXT NOT NULL CHECK (status IN ('running','completed','failed')) DEFAULT 'running',
  total_resources INTEGER NOT NULL DEFAULT 0,
  alive_count     INTEGER NOT NULL DEFAULT 0,
  error           TEXT,
  duration_ms     INTEGER
);

CREATE TABLE resources (
  resource_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  url              TEXT NOT NULL UNIQUE,
  name             TEXT,
  description      TEXT,
  category         TEXT,
  protocol_version INTEGER NOT NULL DEFAULT 1,
  source           TEXT NOT NULL CHECK (source IN ('discovery_api','ecosystem_listing','partner_file')),
  networks_json    TEXT NOT NULL DEFAULT '[]',
  last_updated_ms  INTEGER NOT NULL
);

CREATE TABLE pricing (
  pricing_id          INTEGER PRIMARY KEY AUTOINCREMENT,
  resource_id         INTEGER NOT NULL REFERENCES resources(resource_id) ON DELETE CASCADE,
  scheme              TEXT NOT NULL,
  network             TEXT NOT NULL,
  max_amount_required TEXT NOT NULL,
  asset               TEXT NOT NULL,
  pay_to              TEXT NOT NULL,
  max_timeout_seconds INTEGER NOT NULL,
  formatted_amount    TEXT NOT NULL,
  UNIQUE (resource_id, network, asset)
);

-- Append-only probe ledger; sole source of truth for aggregates.
CREATE TABLE health_history (
  check_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  resource_id   INTEGER NOT NULL REFERENCES resources(resource_id) ON DELETE CASCADE,
  alive         INTEGER NOT NULL CHECK (alive IN (0,1)),
  status_code   INTEGER,
  latency_ms    INTEGER,
  error         TEXT,
  checked_at_ms INTEGER NOT NULL
);

-- Denormalized latest check + rolling 7-day stats, recomputed from
-- health_history on every new check.
CREATE TABLE health_current (
  resource_id       INTEGER PRIMARY KEY REFERENCES resources(resource_id) ON DELETE CASCADE,
  alive             INTEGER NOT NULL CHECK (alive IN (0,1)),
  status_code       INTEGER,
  latency_ms        INTEGER,
  error             TEXT,
  checked_at_ms     INTEGER NOT NULL,
  uptime_pct_7d     REAL,
  avg_latency_ms_7d REAL,
  check_count_7d    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_resources_url ON resources(url);
CREATE INDEX idx_pricing_resource ON pricing(resource_id);
CREATE INDEX idx_history_resource_time ON health_history(resource_id, checked_at_ms);
CREATE INDEX idx_runs_started ON index_runs(started_at_ms);

COMMIT;
"#;
