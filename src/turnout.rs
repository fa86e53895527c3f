// src/turnout.rs
//! Turnout counts joined onto the voter layer.

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, StringArray, UInt32Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{collections::HashMap, fs, fs::File, path::Path, sync::Arc};
use tracing::{info, instrument, warn};

use crate::{history::TurnoutSummary, voters::GeocodedVoter};

/// One turnout row with the matching voter, if the voter layer has one.
#[derive(Debug, Clone, PartialEq)]
pub struct VoterTurnout {
    pub ncid: String,
    pub elections: u32,
    pub voter: Option<GeocodedVoter>,
}

/// Right join of `summary` onto `voters` by NCID.
///
/// Every summary row is kept, once per voter sharing its NCID. Voters with no history are dropped.
pub fn merge_turnout(voters: Vec<GeocodedVoter>, summary: &[TurnoutSummary]) -> Vec<VoterTurnout> {
    let mut by_ncid: HashMap<String, Vec<GeocodedVoter>> = HashMap::new();
    for v in voters {
        by_ncid.entry(v.record.ncid.clone()).or_default().push(v);
    }

    let mut merged = Vec::with_capacity(summary.len());
    let mut without_voter = 0usize;
    for s in summary {
        match by_ncid.get(&s.ncid) {
            Some(matches) => merged.extend(matches.iter().map(|v| VoterTurnout {
                ncid: s.ncid.clone(),
                elections: s.elections,
                voter: Some(v.clone()),
            })),
            None => {
                without_voter += 1;
                merged.push(VoterTurnout {
                    ncid: s.ncid.clone(),
                    elections: s.elections,
                    voter: None,
                });
            }
        }
    }
    if without_voter > 0 {
        warn!(without_voter, "turnout rows with no voter in the layer");
    }
    merged
}

fn turnout_schema() -> Schema {
    let text = |name: &str| Field::new(name, DataType::Utf8, true);
    Schema::new(vec![
        Field::new("ncid", DataType::Utf8, false),
        Field::new("elections", DataType::UInt32, false),
        text("voter_reg_num"),
        text("res_street_address"),
        text("res_city_desc"),
        text("state_cd"),
        text("zip_code"),
        text("race_code"),
        text("ethnic_code"),
        text("gender_code"),
        text("party_cd"),
        Field::new("longitude", DataType::Float64, true),
        Field::new("latitude", DataType::Float64, true),
    ])
}

/// Write the merged table to a snappy-compressed Parquet file.
#[instrument(level = "info", skip(path, rows), fields(path = %path.display()))]
pub fn write_turnout_parquet(path: &Path, rows: &[VoterTurnout]) -> Result<()> {
    let schema = Arc::new(turnout_schema());

    let voter_column = |f: fn(&GeocodedVoter) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(
            rows.iter()
                .map(|r| r.voter.as_ref().map(f))
                .collect::<Vec<Option<&str>>>(),
        ))
    };
    let coord_column = |f: fn(&GeocodedVoter) -> Option<f64>| -> ArrayRef {
        Arc::new(Float64Array::from(
            rows.iter()
                .map(|r| r.voter.as_ref().and_then(f))
                .collect::<Vec<Option<f64>>>(),
        ))
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.ncid.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from(
            rows.iter().map(|r| r.elections).collect::<Vec<_>>(),
        )),
        voter_column(|v| v.record.voter_reg_num.as_str()),
        voter_column(|v| v.record.res_street_address.as_str()),
        voter_column(|v| v.record.res_city_desc.as_str()),
        voter_column(|v| v.record.state_cd.as_str()),
        voter_column(|v| v.record.zip_code.as_str()),
        voter_column(|v| v.record.race_code.as_str()),
        voter_column(|v| v.record.ethnic_code.as_str()),
        voter_column(|v| v.record.gender_code.as_str()),
        voter_column(|v| v.record.party_cd.as_str()),
        coord_column(|v| v.location.map(|p| p.longitude)),
        coord_column(|v| v.location.map(|p| p.latitude)),
    ];

    let batch = RecordBatch::try_new(schema.clone(), columns)
        .context("building voter turnout record batch")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .context("creating Arrow writer for voter turnout")?;
    writer.write(&batch).context("writing voter turnout batch")?;
    writer.close().context("closing voter turnout writer")?;
    info!(rows = rows.len(), "wrote voter turnout");
    Ok(())
}
