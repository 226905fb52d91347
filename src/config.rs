// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Runtime configuration, read from a YAML file.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Directory scanned for quarterly crime workbooks.
    pub source_dir: PathBuf,
    /// File the DuckDB warehouse lives in (created on first run).
    pub database: PathBuf,
}

pub fn load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}
