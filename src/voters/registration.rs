// src/voters/registration.rs

use anyhow::{Context, Result};
use csv::ByteRecord;
use std::path::Path;
use tracing::{info, instrument};

use super::VoterRecord;
use crate::process::{self, collapse_whitespace, is_missing, ColumnProjection, TextEncoding};

/// Columns read from the statewide registration extract, in projection order.
pub const VOTER_COLUMNS: [&str; 11] = [
    "county_desc",
    "voter_reg_num",
    "res_street_address",
    "res_city_desc",
    "state_cd",
    "zip_code",
    "race_code",
    "ethnic_code",
    "gender_code",
    "party_cd",
    "ncid",
];

/// Outcome of loading one county from the statewide extract.
#[derive(Debug, Default)]
pub struct CountyVoters {
    pub voters: Vec<VoterRecord>,
    /// Rows in the statewide file.
    pub statewide: usize,
    /// County rows dropped for a missing street, city, state or zip.
    pub missing_address: usize,
}

/// Read the county's voters from the statewide extract (tab-delimited, ISO-8859-1).
///
/// Only county rows are kept in memory. Rows without a complete residential address are
/// dropped and street addresses have their whitespace collapsed.
#[instrument(level = "info", skip(data_file), fields(file = %data_file.as_ref().display()))]
pub fn read_county_voters<P: AsRef<Path>>(data_file: P, county_name: &str) -> Result<CountyVoters> {
    let data_file = data_file.as_ref();
    let county = county_name.to_uppercase();
    let mut rdr = process::tab_reader(data_file, true)?;
    let proj = ColumnProjection::resolve(rdr.byte_headers()?, &VOTER_COLUMNS, TextEncoding::Latin1)
        .with_context(|| format!("voter registration header of {:?}", data_file))?;

    let mut out = CountyVoters::default();
    let mut record = ByteRecord::new();
    while rdr
        .read_byte_record(&mut record)
        .with_context(|| format!("reading {:?} near record {}", data_file, out.statewide + 1))?
    {
        out.statewide += 1;
        if proj.field(&record, 0).trim() != county {
            continue;
        }
        match clean_row(proj.project(&record)) {
            Some(voter) => out.voters.push(voter),
            None => out.missing_address += 1,
        }
    }

    info!(
        statewide = out.statewide,
        county = out.voters.len(),
        missing_address = out.missing_address,
        "selected county voters"
    );
    Ok(out)
}

/// Build a voter from projected fields, or `None` when the address is incomplete.
fn clean_row(fields: Vec<String>) -> Option<VoterRecord> {
    let mut it = fields.into_iter();
    let mut next = || it.next().unwrap_or_default();
    let _county = next();
    let voter = VoterRecord {
        voter_reg_num: next().trim().to_string(),
        res_street_address: next(),
        res_city_desc: next().trim().to_string(),
        state_cd: next().trim().to_string(),
        zip_code: next().trim().to_string(),
        race_code: next().trim().to_string(),
        ethnic_code: next().trim().to_string(),
        gender_code: next().trim().to_string(),
        party_cd: next().trim().to_string(),
        ncid: next().trim().to_string(),
    };
    let incomplete = [
        &voter.res_street_address,
        &voter.res_city_desc,
        &voter.state_cd,
        &voter.zip_code,
    ]
    .iter()
    .any(|f| is_missing(f));
    if incomplete {
        return None;
    }
    Some(VoterRecord {
        res_street_address: collapse_whitespace(&voter.res_street_address),
        ..voter
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "county_id\tcounty_desc\tvoter_reg_num\tncid\tlast_name\tres_street_address\tres_city_desc\tstate_cd\tzip_code\trace_code\tethnic_code\tparty_cd\tgender_code";

    fn write_extract(rows: &[&str]) -> Result<tempfile::NamedTempFile> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        writeln!(tmp, "{}", HEADER)?;
        for r in rows {
            tmp.write_all(r.as_bytes())?;
            tmp.write_all(b"\n")?;
        }
        tmp.flush()?;
        Ok(tmp)
    }

    #[test]
    fn filters_county_and_drops_incomplete_addresses() -> Result<()> {
        let tmp = write_extract(&[
            "92\tWAKE\t000001\tAA1\tSMITH\t123   Main   St\tRALEIGH\tNC\t27601\tB\tNL\tDEM\tF",
            "92\tWAKE\t000002\tAA2\tJONES\t\tRALEIGH\tNC\t27601\tW\tNL\tREP\tM",
            "92\tWAKE\t000003\tAA3\tLEE\t9 Elm St\tRALEIGH\t\t27601\tW\tNL\tUNA\tM",
            "32\tDURHAM\t000004\tAA4\tKING\t1 Duke St\tDURHAM\tNC\t27701\tB\tNL\tDEM\tF",
        ])?;

        let loaded = read_county_voters(tmp.path(), "Wake")?;
        assert_eq!(loaded.statewide, 4);
        assert_eq!(loaded.missing_address, 2);
        assert_eq!(
            loaded.voters,
            vec![VoterRecord {
                voter_reg_num: "000001".into(),
                ncid: "AA1".into(),
                res_street_address: "123 Main St".into(),
                res_city_desc: "RALEIGH".into(),
                state_cd: "NC".into(),
                zip_code: "27601".into(),
                race_code: "B".into(),
                ethnic_code: "NL".into(),
                gender_code: "F".into(),
                party_cd: "DEM".into(),
            }]
        );
        Ok(())
    }

    #[test]
    fn decodes_latin1_bytes() -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        writeln!(tmp, "{}", HEADER)?;
        tmp.write_all(b"92\tWAKE\t000009\tAA9\tPE\xd1A\t1 Pe\xf1a Ct\tRALEIGH\tNC\t27601\tW\tHL\tDEM\tF\n")?;
        tmp.flush()?;

        let loaded = read_county_voters(tmp.path(), "WAKE")?;
        assert_eq!(loaded.voters[0].res_street_address, "1 Peña Ct");
        Ok(())
    }
}
