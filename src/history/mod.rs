// src/history/mod.rs
//! Voter history: county extract of the statewide history file and turnout counts.

use anyhow::{Context, Result};
use csv::ByteRecord;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{info, instrument};

use crate::process::{self, ColumnProjection, TextEncoding};

pub mod summary;

pub use summary::{summarize_voter_history_data, TurnoutSummary};

/// Columns read from the statewide history extract, in projection order.
pub const HISTORY_COLUMNS: [&str; 5] = [
    "ncid",
    "county_desc",
    "voter_reg_num",
    "voted_party_cd",
    "election_lbl",
];

/// One election a voter took part in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub ncid: String,
    #[serde(default)]
    pub county_desc: String,
    #[serde(default)]
    pub voter_reg_num: String,
    #[serde(default)]
    pub voted_party_cd: String,
    #[serde(default)]
    pub election_lbl: String,
}

/// Return the county's history rows, reading `save_filename` if it already exists.
/// Otherwise the statewide file is filtered and the result is saved there first.
#[instrument(level = "info", skip(state_voter_history_file, save_filename))]
pub fn get_voter_history_data<P: AsRef<Path>, Q: AsRef<Path>>(
    state_voter_history_file: P,
    county_name: &str,
    save_filename: Q,
) -> Result<Vec<HistoryEntry>> {
    let save = save_filename.as_ref();
    if save.exists() {
        info!("{} already created", save.display());
        return read_history_csv(save);
    }

    info!("reading statewide voter history file");
    let entries = read_county_history(state_voter_history_file.as_ref(), county_name)?;

    info!(rows = entries.len(), "saving to {}", save.display());
    if let Some(parent) = save.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(save).with_context(|| format!("creating {:?}", save))?;
    for e in &entries {
        wtr.serialize(e)?;
    }
    wtr.flush()?;
    Ok(entries)
}

fn read_county_history(path: &Path, county_name: &str) -> Result<Vec<HistoryEntry>> {
    let county = county_name.to_uppercase();
    let mut rdr = process::tab_reader(path, true)?;
    let proj = ColumnProjection::resolve(rdr.byte_headers()?, &HISTORY_COLUMNS, TextEncoding::Utf8)
        .with_context(|| format!("voter history header of {:?}", path))?;

    let mut entries = Vec::new();
    let mut record = ByteRecord::new();
    let mut statewide = 0usize;
    while rdr
        .read_byte_record(&mut record)
        .with_context(|| format!("reading {:?} near record {}", path, statewide + 1))?
    {
        statewide += 1;
        if proj.field(&record, 1).trim() != county {
            continue;
        }
        let mut fields = proj.project(&record).into_iter().map(|f| f.trim().to_string());
        let mut next = || fields.next().unwrap_or_default();
        entries.push(HistoryEntry {
            ncid: next(),
            county_desc: next(),
            voter_reg_num: next(),
            voted_party_cd: next(),
            election_lbl: next(),
        });
    }
    info!(statewide, county = entries.len(), "extracted county history");
    Ok(entries)
}

fn read_history_csv(path: &Path) -> Result<Vec<HistoryEntry>> {
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("opening history cache {:?}", path))?;
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("history cache {:?} row {}", path, i + 1)))
        .collect()
}
