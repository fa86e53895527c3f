// src/pipeline.rs
//! One run: addresses → blocks → voters → history → turnout.
//!
//! Every intermediate is reused when its file already exists. Existence is the only check,
//! so a truncated file from an interrupted run is taken as complete; delete it to rebuild.

use anyhow::Result;
use reqwest::Client;
use std::path::Path;
use tracing::{info, instrument};

use crate::{
    address, blocks,
    config::{self, Config},
    history, turnout,
    turnout::VoterTurnout,
    voters::{self, GeocodedVoter},
};

/// Row counts for each stage of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks: Option<usize>,
    pub voters: usize,
    pub geocoded: usize,
    pub history_rows: usize,
    pub voters_with_history: usize,
    pub merged: usize,
}

/// Build (or reuse) every layer for the configured county and return the merged turnout table.
///
/// Block and precinct overlays onto the voter points are not part of the run; they would
/// consume the block layer and the returned rows.
#[instrument(level = "info", skip(client, cfg), fields(county = %cfg.county_name))]
pub async fn run(client: &Client, cfg: &Config) -> Result<(Vec<VoterTurnout>, RunSummary)> {
    let paths = &cfg.paths;
    let mut summary = RunSummary::default();

    // ─── 1) address points ───────────────────────────────────────────
    let state_address_data = address::get_address_data(client, &paths.address_dir).await?;
    let county_address_data = address::subset_address_data(
        &state_address_data,
        &cfg.county_name,
        &paths.county_address_file,
    )?;

    // ─── 2) census blocks ────────────────────────────────────────────
    if paths.block_shapefile.exists() {
        info!("reading block features from {}", paths.block_shapefile.display());
    } else {
        info!("assembling block features from web resources");
        let api_key = config::census_api_key()?;
        let blocks = blocks::get_block_features(
            client,
            &cfg.state_fips,
            &cfg.county_fips,
            Some(paths.block_shapefile.as_path()),
            &api_key,
        )
        .await?;
        summary.blocks = Some(blocks.len());
    }

    // ─── 3) voters ───────────────────────────────────────────────────
    let voters = load_or_build_voters(cfg, &county_address_data)?;
    summary.voters = voters.len();
    summary.geocoded = voters.iter().filter(|v| v.location.is_some()).count();

    // ─── 4) history ──────────────────────────────────────────────────
    let history = history::get_voter_history_data(
        &paths.state_voter_history_file,
        &cfg.county_name,
        &paths.voter_history_file,
    )?;
    let turnout_summary = history::summarize_voter_history_data(&history);
    summary.history_rows = history.len();
    summary.voters_with_history = turnout_summary.len();
    drop(history);

    // ─── 5) merge ────────────────────────────────────────────────────
    let merged = turnout::merge_turnout(voters, &turnout_summary);
    summary.merged = merged.len();
    turnout::write_turnout_parquet(&paths.turnout_parquet, &merged)?;

    info!(?summary, "run complete");
    Ok((merged, summary))
}

fn load_or_build_voters(cfg: &Config, county_address_file: &Path) -> Result<Vec<GeocodedVoter>> {
    let shp = &cfg.paths.voter_shapefile;
    if shp.exists() {
        info!("reading voter features from {}", shp.display());
        return voters::read_voter_layer(shp);
    }
    info!("assembling voter features from local files");
    voters::get_voter_data(
        &cfg.paths.state_voter_reg_file,
        county_address_file,
        &cfg.county_name,
        Some(shp.as_path()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{address::ADDRESS_DATA_FILE, config::PathsConfig, layer::GeoPoint};
    use std::fs;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    /// A run whose network-backed inputs are already on disk.
    #[tokio::test]
    async fn offline_run_merges_turnout_onto_geocoded_voters() -> Result<()> {
        init_logging();
        let dir = tempfile::tempdir()?;
        let root = dir.path();

        let address_dir = root.join("data/NCSBE");
        fs::create_dir_all(address_dir.join("address_points"))?;
        fs::write(
            address_dir.join("address_points").join(ADDRESS_DATA_FILE),
            "92\tWAKE\t100 Main St\tRaleigh\t27601\t100\t\t\tMAIN\tST\t\t0\t0\t35.7\t-78.6\n\
             32\tDURHAM\t1 Duke St\tDurham\t27701\t1\t\t\tDUKE\tST\t\t0\t0\t36.0\t-78.9\n",
        )?;
        fs::write(
            address_dir.join("ncvoter_Statewide.txt"),
            "county_desc\tvoter_reg_num\tncid\tres_street_address\tres_city_desc\tstate_cd\tzip_code\trace_code\tethnic_code\tgender_code\tparty_cd\n\
             WAKE\t000001\tAA1\t100 Main St\tRaleigh\tNC\t27601\tW\tNL\tM\tUNA\n\
             WAKE\t000002\tAA2\t2 Side St\tRaleigh\tNC\t27601\tB\tNL\tF\tDEM\n",
        )?;
        fs::write(
            address_dir.join("ncvhis_Statewide.txt"),
            "county_desc\tvoter_reg_num\telection_lbl\tvoted_party_cd\tncid\n\
             WAKE\t000001\t11/08/2016\tUNA\tAA1\n\
             WAKE\t000001\t11/06/2018\tUNA\tAA1\n\
             DURHAM\t000009\t11/06/2018\tDEM\tZZ9\n",
        )?;
        // stands in for a block layer from an earlier run
        let scratch = root.join("scratch");
        fs::create_dir_all(&scratch)?;
        fs::write(scratch.join("blocks.shp"), b"")?;

        let cfg = Config {
            paths: PathsConfig {
                address_dir: address_dir.clone(),
                block_shapefile: scratch.join("blocks.shp"),
                county_address_file: scratch.join("addresses.csv"),
                state_voter_reg_file: address_dir.join("ncvoter_Statewide.txt"),
                state_voter_history_file: address_dir.join("ncvhis_Statewide.txt"),
                voter_shapefile: scratch.join("voters.shp"),
                voter_history_file: scratch.join("history.csv"),
                turnout_parquet: scratch.join("turnout.parquet"),
            },
            ..Config::default()
        };

        let (merged, summary) = run(&Client::new(), &cfg).await?;
        assert_eq!(
            summary,
            RunSummary {
                blocks: None,
                voters: 2,
                geocoded: 1,
                history_rows: 2,
                voters_with_history: 1,
                merged: 1,
            }
        );
        assert_eq!(merged[0].ncid, "AA1");
        assert_eq!(merged[0].elections, 2);
        assert_eq!(
            merged[0].voter.as_ref().and_then(|v| v.location),
            Some(GeoPoint::new(-78.6, 35.7))
        );
        assert!(cfg.paths.voter_shapefile.exists());
        assert!(cfg.paths.turnout_parquet.exists());

        // second run reuses every intermediate
        let (again, _) = run(&Client::new(), &cfg).await?;
        assert_eq!(again, merged);
        Ok(())
    }
}
