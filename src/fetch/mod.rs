// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

pub mod zips;

pub use zips::{download_zip, extract_zip, find_file};

/// GET `url` with the given query pairs and decode the JSON body.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    debug!(%url, "fetching json");
    client
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .json::<T>()
        .await
        .with_context(|| format!("decoding JSON from {}", url))
}
