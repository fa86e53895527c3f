// src/config.rs

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Environment variable naming a TOML run configuration.
pub const CONFIG_ENV: &str = "VOTESQUAD_CONFIG";
/// Environment variable that overrides the API key file.
pub const API_KEY_ENV: &str = "CENSUS_API_KEY";
/// File name of the API key table inside the local app-data directory.
pub const API_KEY_FILE: &str = "APIkeys.csv";

/// Which county to build and where the inputs and intermediates live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub state_fips: String,
    pub county_fips: String,
    pub county_name: String,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Folder holding (or receiving) the statewide address point download.
    pub address_dir: PathBuf,
    pub block_shapefile: PathBuf,
    pub county_address_file: PathBuf,
    pub state_voter_reg_file: PathBuf,
    pub state_voter_history_file: PathBuf,
    pub voter_shapefile: PathBuf,
    pub voter_history_file: PathBuf,
    pub turnout_parquet: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_fips: "37".into(),
            county_fips: "183".into(),
            county_name: "WAKE".into(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            address_dir: "./data/NCSBE".into(),
            block_shapefile: "./scratch/wake_blocks.shp".into(),
            county_address_file: "./scratch/wake_addresses.csv".into(),
            state_voter_reg_file: "./data/NCSBE/ncvoter_Statewide.txt".into(),
            state_voter_history_file: "./data/NCSBE/ncvhis_Statewide.txt".into(),
            voter_shapefile: "./scratch/wake_voters.shp".into(),
            voter_history_file: "./scratch/wake_history.csv".into(),
            turnout_parquet: "./scratch/wake_voter_turnout.parquet".into(),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        info!(path = %path.display(), county = %parsed.county_name, "loaded config");
        Ok(parsed)
    }

    /// Load from the file named by `VOTESQUAD_CONFIG`, if any.
    pub fn from_env() -> Result<Self> {
        let path = env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load(path.as_deref())
    }
}

/// Local app-data directory: `%LOCALAPPDATA%` when set, else the platform default.
pub fn local_app_data() -> Option<PathBuf> {
    env::var_os("LOCALAPPDATA")
        .map(PathBuf::from)
        .or_else(dirs::data_local_dir)
}

/// Census API key: `CENSUS_API_KEY`, else `APIkeys.csv` in the local app-data directory.
pub fn census_api_key() -> Result<String> {
    if let Ok(key) = env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }
    let dir = local_app_data().ok_or_else(|| anyhow!("no local app-data directory"))?;
    read_api_key_file(&dir.join(API_KEY_FILE))
}

/// Second column of the first data row.
pub fn read_api_key_file(path: &Path) -> Result<String> {
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("opening API key file {:?}", path))?;
    let first = rdr
        .records()
        .next()
        .ok_or_else(|| anyhow!("API key file {:?} has no data rows", path))?
        .with_context(|| format!("reading API key file {:?}", path))?;
    first
        .get(1)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow!("API key file {:?} has no key in column 2", path))
}
