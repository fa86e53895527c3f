// src/blocks/features.rs

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use shapefile::{Polygon, Shape};
use std::{collections::BTreeMap, fs, path::Path};
use tracing::{debug, info, instrument, warn};

use super::attributes::{get_block_attributes, write_attributes_csv, BlockAttributes};
use crate::{fetch, layer};

const TIGER_BLOCK_BASE: &str = "https://www2.census.gov/geo/tiger/TIGER2010BLKPOPHU";

/// Statewide 2010 block + population/housing archive for `st_fips`.
pub fn tiger_block_url(st_fips: &str) -> String {
    format!("{}/tabblock2010_{}_pophu.zip", TIGER_BLOCK_BASE, st_fips)
}

/// One TIGER block polygon with the attributes we carry forward.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockFeature {
    pub block_id: String,
    pub county_fips: String,
    pub housing: Option<f64>,
    pub pop10: Option<f64>,
    pub geometry: Polygon,
}

/// Outer join of a block feature and its SF1 attributes. At least one side is present.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub geoid: String,
    pub feature: Option<BlockFeature>,
    pub attributes: Option<BlockAttributes>,
}

impl Block {
    pub fn geometry(&self) -> Option<&Polygon> {
        self.feature.as_ref().map(|f| &f.geometry)
    }
}

const BLOCK_FIELDS: &[layer::Field] = &[
    layer::Field::Text("BLOCKID10", 15),
    layer::Field::Text("COUNTYFP10", 3),
    layer::Field::Number("HOUSING10", 10, 0),
    layer::Field::Number("POP10", 10, 0),
    layer::Field::Number("P003001", 10, 0),
    layer::Field::Number("P003003", 10, 0),
    layer::Field::Number("P010001", 10, 0),
    layer::Field::Number("P010004", 10, 0),
    layer::Field::Text("GEOID10", 15),
    layer::Field::Number("PctBlack", 10, 4),
    layer::Field::Number("PctBlack18", 10, 4),
];

/// Read block polygons from a TIGER `tabblock2010` shapefile, keeping one county.
#[instrument(level = "info", skip(shp_path), fields(shp = %shp_path.as_ref().display()))]
pub fn read_block_features<P: AsRef<Path>>(shp_path: P, co_fips: &str) -> Result<Vec<BlockFeature>> {
    let shp_path = shp_path.as_ref();
    let mut reader = shapefile::Reader::from_path(shp_path)
        .with_context(|| format!("opening block shapefile {:?}", shp_path))?;

    let mut features = Vec::new();
    let mut statewide = 0usize;
    for shape_record in reader.iter_shapes_and_records() {
        let (shape, record) = shape_record.context("reading block shape")?;
        statewide += 1;
        if layer::read_text(&record, "COUNTYFP10") != co_fips {
            continue;
        }
        let geometry = match shape {
            Shape::Polygon(p) => p,
            other => {
                warn!(shape = ?other.shapetype(), "skipping non-polygon block");
                continue;
            }
        };
        features.push(BlockFeature {
            block_id: layer::read_text(&record, "BLOCKID10"),
            county_fips: co_fips.to_string(),
            housing: layer::read_number(&record, "HOUSING10"),
            pop10: layer::read_number(&record, "POP10"),
            geometry,
        });
    }
    info!(statewide, county = features.len(), "subset block features");
    Ok(features)
}

/// Outer join on `BLOCKID10 == GEOID10`, ordered by block identifier.
pub fn merge_blocks(features: Vec<BlockFeature>, attributes: Vec<BlockAttributes>) -> Vec<Block> {
    let mut by_id: BTreeMap<String, Block> = BTreeMap::new();
    for f in features {
        let geoid = f.block_id.clone();
        by_id.insert(
            geoid.clone(),
            Block {
                geoid,
                feature: Some(f),
                attributes: None,
            },
        );
    }
    for a in attributes {
        let geoid = a.geoid.clone();
        by_id
            .entry(geoid.clone())
            .or_insert_with(|| Block {
                geoid,
                feature: None,
                attributes: None,
            })
            .attributes = Some(a);
    }

    let blocks: Vec<Block> = by_id.into_values().collect();
    let no_attrs = blocks.iter().filter(|b| b.attributes.is_none()).count();
    let no_geom = blocks.iter().filter(|b| b.feature.is_none()).count();
    if no_attrs > 0 || no_geom > 0 {
        warn!(no_attrs, no_geom, "unmatched rows in block outer join");
    }
    blocks
}

/// Persist the block layer: polygons + DBF, `.prj`, `.txt`, and a CSV of attribute-only blocks.
pub fn write_block_layer(
    shp_path: &Path,
    blocks: &[Block],
    st_fips: &str,
    co_fips: &str,
    source_url: &str,
) -> Result<()> {
    if let Some(parent) = shp_path.parent() {
        fs::create_dir_all(parent)?;
    }
    layer::remove_layer(shp_path)?;

    {
        let mut writer = shapefile::Writer::from_path(shp_path, layer::table_builder(BLOCK_FIELDS)?)
            .with_context(|| format!("creating {:?}", shp_path))?;
        for block in blocks {
            let Some(feature) = &block.feature else {
                continue;
            };
            let attrs = block.attributes.as_ref();
            let record = layer::record([
                ("BLOCKID10", layer::text(&feature.block_id, 15)),
                ("COUNTYFP10", layer::text(&feature.county_fips, 3)),
                ("HOUSING10", layer::number(feature.housing)),
                ("POP10", layer::number(feature.pop10)),
                ("P003001", layer::number(attrs.map(|a| a.total_pop as f64))),
                ("P003003", layer::number(attrs.map(|a| a.black_pop as f64))),
                ("P010001", layer::number(attrs.map(|a| a.total_pop_18 as f64))),
                ("P010004", layer::number(attrs.map(|a| a.black_pop_18 as f64))),
                ("GEOID10", layer::text(attrs.map_or("", |a| a.geoid.as_str()), 15)),
                (
                    "PctBlack",
                    layer::number(attrs.map(|a| a.pct_black().unwrap_or(0.0))),
                ),
                (
                    "PctBlack18",
                    layer::number(attrs.map(|a| a.pct_black_18().unwrap_or(0.0))),
                ),
            ]);
            writer
                .write_shape_and_record(&feature.geometry, &record)
                .with_context(|| format!("writing block {}", block.geoid))?;
        }
    }

    let attribute_only: Vec<BlockAttributes> = blocks
        .iter()
        .filter(|b| b.feature.is_none())
        .filter_map(|b| b.attributes.clone())
        .collect();
    if !attribute_only.is_empty() {
        write_attributes_csv(&layer::nogeom_path(shp_path), &attribute_only)?;
    }

    layer::write_projection(shp_path)?;
    layer::write_metadata(
        shp_path,
        &format!(
            "Census block data for FIPS{}{} extracted from\n{}\non {{date}}",
            st_fips, co_fips, source_url
        ),
    )?;
    Ok(())
}

/// Download the state's TIGER blocks, subset the county, and join SF1 attributes.
/// With `output_shapefile` the layer is also written to disk.
#[instrument(level = "info", skip(client, api_key, output_shapefile))]
pub async fn get_block_features(
    client: &Client,
    st_fips: &str,
    co_fips: &str,
    output_shapefile: Option<&Path>,
    api_key: &str,
) -> Result<Vec<Block>> {
    let url = tiger_block_url(st_fips);
    info!(%url, "downloading statewide blocks; this takes a few minutes");
    let scratch = tempfile::tempdir().context("creating scratch dir for TIGER blocks")?;
    let zip_path = fetch::download_zip(client, &url, scratch.path()).await?;
    let unpacked = scratch.path().join("unpacked");
    fetch::extract_zip(&zip_path, &unpacked)?;
    let shp = fetch::find_file(&unpacked, "*.shp")?
        .ok_or_else(|| anyhow!("no .shp inside {}", url))?;
    debug!(shp = %shp.display(), "found block shapefile");

    let features = read_block_features(&shp, co_fips)?;
    let attributes = get_block_attributes(client, st_fips, co_fips, None, api_key).await?;
    let blocks = merge_blocks(features, attributes);

    if let Some(path) = output_shapefile {
        info!("saving blocks to {}", path.display());
        write_block_layer(path, &blocks, st_fips, co_fips, &url)?;
    }
    Ok(blocks)
}
