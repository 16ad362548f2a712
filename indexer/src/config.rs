use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, Clone)]
pub struct IndexConfig {
    pub db: Option<PathBuf>,
    pub facilitators: Option<Vec<String>>,
    pub ecosystem_url: Option<String>,
    pub partner_dir: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub source_timeout_ms: Option<u64>,
    pub prune_days: Option<u32>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub index: Option<IndexConfig>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("indexer.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}
