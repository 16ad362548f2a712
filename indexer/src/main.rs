use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use health_probe::ProbeOptions;
use index_sqlite::Db;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url_guard::Verdict;

mod config;
mod report;
mod run;
mod sources;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "x402-indexer", version, about = "Discovers and health-checks x402 pay-per-request endpoints")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./indexer.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Run one indexing pass: fetch sources, merge, check, persist
    Index {
        /// SQLite database path
        #[arg(long, default_value = "x402-index.db")]
        db: PathBuf,
        /// Facilitator base URL(s) exposing /discovery/resources (repeatable)
        #[arg(long = "facilitator")]
        facilitators: Vec<String>,
        /// Ecosystem listing page URL
        #[arg(long)]
        ecosystem: Option<String>,
        /// Directory of partner YAML files
        #[arg(long)]
        partners: Option<PathBuf>,
        /// Timeout per probe attempt in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        /// Max endpoints checked in parallel
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
        /// Retries per probe on transient failures
        #[arg(long, default_value_t = 2)]
        retries: u32,
        /// Base backoff delay between retries in milliseconds
        #[arg(long, default_value_t = 250)]
        retry_delay_ms: u64,
        /// Timeout for fetching each discovery source in milliseconds
        #[arg(long, default_value_t = 15000)]
        source_timeout_ms: u64,
        /// Purge resources unseen for N days after the run (0 disables)
        #[arg(long, default_value_t = 0)]
        prune_days: u32,
        /// Output format: text or json
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Write the summary (or CSV with --csv) to a file
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write the indexed resource table as CSV when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Health-check URLs ad hoc, without touching a database
    Check {
        urls: Vec<String>,
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        #[arg(long, default_value_t = 2)]
        retries: u32,
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Validate URLs against the SSRF guard without any network access
    Validate { urls: Vec<String> },
    /// Show recent check history for one endpoint
    History {
        url: String,
        #[arg(long, default_value = "x402-index.db")]
        db: PathBuf,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

fn fmt_rfc3339(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Version => {
            println!("x402-indexer {} (core {})", env!("CARGO_PKG_VERSION"), indexer_core::version());
        }
        Commands::Index {
            mut db,
            mut facilitators,
            mut ecosystem,
            mut partners,
            mut timeout_ms,
            mut concurrency,
            mut retries,
            mut retry_delay_ms,
            mut source_timeout_ms,
            mut prune_days,
            mut format,
            out,
            csv,
        } => {
            if let Some(cfg) = &loaded_cfg {
                if let Some(i) = &cfg.index {
                    if let Some(v) = &i.db { db = v.clone(); }
                    if facilitators.is_empty() {
                        if let Some(v) = &i.facilitators { facilitators = v.clone(); }
                    }
                    if ecosystem.is_none() { ecosystem = i.ecosystem_url.clone(); }
                    if partners.is_none() { partners = i.partner_dir.clone(); }
                    if let Some(v) = i.timeout_ms { timeout_ms = v; }
                    if let Some(v) = i.concurrency { concurrency = v; }
                    if let Some(v) = i.retries { retries = v; }
                    if let Some(v) = i.retry_delay_ms { retry_delay_ms = v; }
                    if let Some(v) = i.source_timeout_ms { source_timeout_ms = v; }
                    if let Some(v) = i.prune_days { prune_days = v; }
                    if let Some(f) = &i.format {
                        format = match f.as_str() { "json" => OutputFormat::Json, _ => OutputFormat::Text };
                    }
                }
            }
            if facilitators.is_empty() && ecosystem.is_none() && partners.is_none() {
                return Err(anyhow!(
                    "no sources configured: pass --facilitator, --ecosystem, or --partners"
                ));
            }
            if csv && out.is_none() {
                return Err(anyhow!("--csv requires --out <file>"));
            }

            let mut db_handle = Db::open_or_create(&db)?;
            let opts = run::RunOptions {
                facilitators,
                ecosystem_url: ecosystem,
                partner_dir: partners,
                probe: ProbeOptions { timeout_ms, retries, retry_base_delay_ms: retry_delay_ms },
                concurrency,
                source_timeout_ms,
                prune_days,
            };
            let rt = tokio::runtime::Runtime::new()?;
            let summary = rt.block_on(run::run_index(&mut db_handle, &opts))?;

            if csv {
                let Some(path) = out else {
                    return Err(anyhow!("--csv requires --out <file>"));
                };
                report::write_csv(&path, &db_handle.list_resources()?)?;
                println!("{}", summary.render_text());
                return Ok(());
            }
            let line = match format {
                OutputFormat::Text => summary.render_text(),
                OutputFormat::Json => serde_json::to_string(&summary)?,
            };
            if let Some(path) = out {
                std::fs::write(&path, format!("{}\n", line))?;
            } else {
                println!("{}", line);
            }
        }
        Commands::Check { urls, timeout_ms, retries, concurrency, format } => {
            if urls.is_empty() {
                return Err(anyhow!("provide at least one url"));
            }
            let opts = ProbeOptions { timeout_ms, retries, ..ProbeOptions::default() };
            let rt = tokio::runtime::Runtime::new()?;
            let batch = urls.clone();
            let results = rt.block_on(async move {
                let client = health_probe::build_client(&format!("x402-indexer/{}", env!("CARGO_PKG_VERSION")))?;
                Ok::<_, anyhow::Error>(health_probe::check_all(&client, batch, &opts, concurrency).await)
            })?;

            for url in &urls {
                let Some(outcome) = results.get(url) else { continue };
                match format {
                    OutputFormat::Text => {
                        let h = &outcome.health;
                        let state = if h.alive { "alive" } else { "dead" };
                        let detail = match (h.status_code, &h.error) {
                            (Some(code), _) => format!("status {}", code),
                            (None, Some(e)) => e.clone(),
                            (None, None) => String::new(),
                        };
                        let latency = h.latency_ms.map(|ms| format!(", {} ms", ms)).unwrap_or_default();
                        println!("{} {} ({}{})", url, state, detail, latency);
                        for p in &outcome.pricing {
                            println!("  {} on {} -> {}", p.scheme, p.network, p.formatted_amount);
                        }
                    }
                    OutputFormat::Json => {
                        let obj = serde_json::json!({
                            "url": url,
                            "health": outcome.health,
                            "pricing": outcome.pricing,
                        });
                        println!("{}", serde_json::to_string(&obj)?);
                    }
                }
            }
        }
        Commands::Validate { urls } => {
            if urls.is_empty() {
                return Err(anyhow!("provide at least one url"));
            }
            let mut rejected = 0usize;
            for url in &urls {
                match url_guard::validate(url) {
                    Verdict::Valid => println!("{} valid", url),
                    Verdict::Invalid { reason } => {
                        rejected += 1;
                        println!("{} invalid: {}", url, reason);
                    }
                }
            }
            if rejected > 0 {
                return Err(anyhow!("{} of {} urls rejected", rejected, urls.len()));
            }
        }
        Commands::History { url, db, days } => {
            let db_handle = Db::open_or_create(&db)?;
            let since = indexer_core::now_ms() - i64::from(days) * 24 * 60 * 60 * 1000;
            let rows = db_handle.recent_checks(&url, since)?;
            if rows.is_empty() {
                println!("no checks recorded for {} in the last {} days", url, days);
            }
            for (alive, at_ms) in rows {
                println!("{} {}", fmt_rfc3339(at_ms), if alive { "alive" } else { "dead" });
            }
        }
    }
    Ok(())
}
