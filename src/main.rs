use anyhow::Result;
use reqwest::Client;
use std::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use votesquad::{config::Config, pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) run configuration ────────────────────────────────────────
    let cfg = Config::from_env()?;
    info!(
        state = %cfg.state_fips,
        county = %cfg.county_fips,
        name = %cfg.county_name,
        "configured run"
    );
    for p in [
        &cfg.paths.block_shapefile,
        &cfg.paths.county_address_file,
        &cfg.paths.voter_shapefile,
        &cfg.paths.voter_history_file,
        &cfg.paths.turnout_parquet,
    ] {
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::create_dir_all(&cfg.paths.address_dir)?;

    // ─── 3) build ────────────────────────────────────────────────────
    let client = Client::new();
    let (merged, summary) = pipeline::run(&client, &cfg).await?;

    info!(
        rows = merged.len(),
        voters = summary.voters,
        geocoded = summary.geocoded,
        with_history = summary.voters_with_history,
        "all done"
    );
    Ok(())
}
