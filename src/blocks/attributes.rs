// src/blocks/attributes.rs

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::fetch;

pub const SF1_URL: &str = "https://api.census.gov/data/2010/dec/sf1";

/// Total pop, black pop, pop 18+, black pop 18+.
pub const SF1_FIELDS: [&str; 4] = ["P003001", "P003003", "P010001", "P010004"];

/// Geographic code columns that make up a block GEOID, in concatenation order.
const GEO_COLUMNS: [&str; 4] = ["state", "county", "tract", "block"];

/// SF1 race composition counts for one census block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockAttributes {
    pub geoid: String,
    pub total_pop: u64,
    pub black_pop: u64,
    pub total_pop_18: u64,
    pub black_pop_18: u64,
}

impl BlockAttributes {
    /// Percent black; `None` when the block has no population.
    pub fn pct_black(&self) -> Option<f64> {
        percent(self.black_pop, self.total_pop)
    }

    /// Percent black among adults; `None` when the block has no adults.
    pub fn pct_black_18(&self) -> Option<f64> {
        percent(self.black_pop_18, self.total_pop_18)
    }
}

pub fn percent(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64 * 100.0)
    }
}

/// CSV layout of the attribute table; undefined ratios are written as 0.
#[derive(Serialize)]
struct AttributeRow<'a> {
    #[serde(rename = "P003001")]
    p003001: u64,
    #[serde(rename = "P003003")]
    p003003: u64,
    #[serde(rename = "P010001")]
    p010001: u64,
    #[serde(rename = "P010004")]
    p010004: u64,
    #[serde(rename = "GEOID10")]
    geoid10: &'a str,
    #[serde(rename = "PctBlack")]
    pct_black: f64,
    #[serde(rename = "PctBlack18")]
    pct_black_18: f64,
}

impl<'a> From<&'a BlockAttributes> for AttributeRow<'a> {
    fn from(a: &'a BlockAttributes) -> Self {
        AttributeRow {
            p003001: a.total_pop,
            p003003: a.black_pop,
            p010001: a.total_pop_18,
            p010004: a.black_pop_18,
            geoid10: &a.geoid,
            pct_black: a.pct_black().unwrap_or(0.0),
            pct_black_18: a.pct_black_18().unwrap_or(0.0),
        }
    }
}

/// Turn the SF1 array-of-arrays response (header row first) into block attributes.
pub fn parse_sf1_response(rows: &[Vec<Option<String>>]) -> Result<Vec<BlockAttributes>> {
    let (header, data) = rows
        .split_first()
        .ok_or_else(|| anyhow!("empty SF1 response"))?;
    let column = |name: &str| -> Result<usize> {
        header
            .iter()
            .position(|h| h.as_deref() == Some(name))
            .ok_or_else(|| anyhow!("SF1 response has no {} column", name))
    };
    let counts = SF1_FIELDS
        .iter()
        .map(|f| column(f))
        .collect::<Result<Vec<_>>>()?;
    let geo = GEO_COLUMNS
        .iter()
        .map(|f| column(f))
        .collect::<Result<Vec<_>>>()?;

    data.iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let cell = |i: usize| row.get(i).and_then(|c| c.as_deref()).unwrap_or("");
            let number = |i: usize| -> Result<u64> {
                let raw = cell(i).trim();
                if raw.is_empty() {
                    return Ok(0);
                }
                raw.parse::<u64>().with_context(|| {
                    format!("row {}: {:?} is not a count", row_idx + 1, raw)
                })
            };
            Ok(BlockAttributes {
                geoid: geo.iter().map(|&i| cell(i)).collect::<String>(),
                total_pop: number(counts[0])?,
                black_pop: number(counts[1])?,
                total_pop_18: number(counts[2])?,
                black_pop_18: number(counts[3])?,
            })
        })
        .collect()
}

pub fn write_attributes_csv(path: &Path, attributes: &[BlockAttributes]) -> Result<()> {
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for a in attributes {
        wtr.serialize(AttributeRow::from(a))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Pull SF1 race composition for every block in the county, optionally saving it as CSV.
#[instrument(level = "info", skip(client, api_key, output_csv))]
pub async fn get_block_attributes(
    client: &Client,
    st_fips: &str,
    co_fips: &str,
    output_csv: Option<&Path>,
    api_key: &str,
) -> Result<Vec<BlockAttributes>> {
    info!("downloading SF1 block attributes");
    let fields = SF1_FIELDS.join(",");
    let scope = format!("state:{} county:{}", st_fips, co_fips);
    let rows: Vec<Vec<Option<String>>> = fetch::get_json(
        client,
        SF1_URL,
        &[
            ("get", fields.as_str()),
            ("for", "block:*"),
            ("in", scope.as_str()),
            ("key", api_key),
        ],
    )
    .await?;

    let attributes = parse_sf1_response(&rows)?;
    let empty = attributes.iter().filter(|a| a.total_pop == 0).count();
    if empty > 0 {
        warn!(blocks = empty, "blocks with zero population; PctBlack written as 0");
    }
    info!(blocks = attributes.len(), "parsed SF1 attributes");

    if let Some(path) = output_csv {
        info!("saving attributes to {}", path.display());
        write_attributes_csv(path, &attributes)?;
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<Option<String>> {
        cells.iter().map(|c| Some(c.to_string())).collect()
    }

    fn sample() -> Vec<Vec<Option<String>>> {
        vec![
            row(&["P003001", "P003003", "P010001", "P010004", "state", "county", "tract", "block"]),
            row(&["200", "50", "150", "30", "37", "183", "052404", "1012"]),
            row(&["0", "0", "0", "0", "37", "183", "052404", "1013"]),
        ]
    }

    #[test]
    fn geoid_concatenates_codes_in_order() -> Result<()> {
        let attrs = parse_sf1_response(&sample())?;
        assert_eq!(attrs[0].geoid, "371830524041012");
        assert_eq!(attrs[1].geoid, "371830524041013");
        Ok(())
    }

    #[test]
    fn percentages_follow_counts_and_zero_population_is_undefined() -> Result<()> {
        let attrs = parse_sf1_response(&sample())?;
        assert_eq!(attrs[0].pct_black(), Some(25.0));
        assert_eq!(attrs[0].pct_black_18(), Some(20.0));
        assert_eq!(attrs[1].pct_black(), None);
        assert_eq!(attrs[1].pct_black_18(), None);
        Ok(())
    }

    #[test]
    fn header_order_does_not_matter() -> Result<()> {
        let rows = vec![
            row(&["state", "county", "tract", "block", "P010004", "P010001", "P003003", "P003001"]),
            row(&["37", "183", "000100", "2000", "1", "4", "2", "8"]),
        ];
        let attrs = parse_sf1_response(&rows)?;
        assert_eq!(
            attrs[0],
            BlockAttributes {
                geoid: "371830001002000".into(),
                total_pop: 8,
                black_pop: 2,
                total_pop_18: 4,
                black_pop_18: 1,
            }
        );
        Ok(())
    }

    #[test]
    fn non_numeric_count_is_rejected() {
        let mut rows = sample();
        rows[1][0] = Some("lots".into());
        assert!(parse_sf1_response(&rows).is_err());
    }

    #[test]
    fn csv_drops_code_columns_and_zeroes_undefined_ratios() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("attrs.csv");
        write_attributes_csv(&path, &parse_sf1_response(&sample())?)?;
        let text = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "P003001,P003003,P010001,P010004,GEOID10,PctBlack,PctBlack18"
        );
        assert_eq!(lines[1], "200,50,150,30,371830524041012,25.0,20.0");
        assert_eq!(lines[2], "0,0,0,0,371830524041013,0.0,0.0");
        Ok(())
    }
}
