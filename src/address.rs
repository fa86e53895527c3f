// src/address.rs
//! NC SBE address points: statewide download and per-county subset.

use anyhow::{anyhow, Context, Result};
use csv::ByteRecord;
use reqwest::Client;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use crate::{
    fetch,
    process::{self, ColumnProjection, TextEncoding},
};

pub const SBOE_ADDRESS_URL: &str =
    "https://s3.amazonaws.com/dl.ncsbe.gov/ShapeFiles/address_points_sboe.zip";

/// Name of the statewide data file inside the archive.
pub const ADDRESS_DATA_FILE: &str = "address_points_sboe.txt";

/// Positional columns of the statewide file, which has no header row.
pub const ADDRESS_COLUMNS: [&str; 15] = [
    "county_id",
    "county",
    "st_address",
    "city",
    "zip",
    "house_no",
    "half_no",
    "st_pre",
    "st_name",
    "st_type",
    "st_suf",
    "lat_feet",
    "long_feet",
    "latitude",
    "longitude",
];

const COUNTY_COLUMN: usize = 1;

/// The columns of a county subset used for geocoding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddressPoint {
    pub st_address: String,
    pub city: String,
    pub zip: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Make sure the statewide address file is on disk under `output_folder` and return its path.
/// An existing extracted file anywhere below the folder is reused as is.
#[instrument(level = "info", skip(client, output_folder), fields(folder = %output_folder.as_ref().display()))]
pub async fn get_address_data<P: AsRef<Path>>(client: &Client, output_folder: P) -> Result<PathBuf> {
    let folder = output_folder.as_ref();
    if let Some(existing) = fetch::find_file(folder, ADDRESS_DATA_FILE)? {
        info!(path = %existing.display(), "address file already exists");
        return Ok(existing);
    }

    info!("retrieving address file from NC SBE server");
    fs::create_dir_all(folder).with_context(|| format!("creating {:?}", folder))?;
    let zip_path = fetch::download_zip(client, SBOE_ADDRESS_URL, folder).await?;
    info!("unpacking data");
    fetch::extract_zip(&zip_path, folder)?;
    fs::remove_file(&zip_path).with_context(|| format!("removing {:?}", zip_path))?;

    let extracted = fetch::find_file(folder, ADDRESS_DATA_FILE)?
        .ok_or_else(|| anyhow!("{} missing from {}", ADDRESS_DATA_FILE, SBOE_ADDRESS_URL))?;
    info!(path = %extracted.display(), "address data saved");
    Ok(extracted)
}

/// Write the rows of `state_address_file` for one county to `output_county_address_file`.
/// If the output already exists it is returned untouched.
#[instrument(level = "info", skip(state_address_file, output_county_address_file))]
pub fn subset_address_data<P: AsRef<Path>, Q: AsRef<Path>>(
    state_address_file: P,
    county_name: &str,
    output_county_address_file: Q,
) -> Result<PathBuf> {
    let out = output_county_address_file.as_ref().to_path_buf();
    if out.exists() {
        info!(path = %out.display(), "county file already extracted");
        return Ok(out);
    }

    let county = county_name.to_uppercase();
    let mut rdr = process::tab_reader(state_address_file.as_ref(), false)?;
    let all_columns = ColumnProjection::positional((0..ADDRESS_COLUMNS.len()).collect(), TextEncoding::Utf8);

    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(&out).with_context(|| format!("creating {:?}", out))?;
    wtr.write_record(ADDRESS_COLUMNS)?;

    let mut record = ByteRecord::new();
    let (mut total, mut kept) = (0usize, 0usize);
    while rdr
        .read_byte_record(&mut record)
        .with_context(|| format!("reading {:?} near record {}", state_address_file.as_ref(), total + 1))?
    {
        total += 1;
        if all_columns.field(&record, COUNTY_COLUMN) != county {
            continue;
        }
        wtr.write_record(all_columns.project(&record))?;
        kept += 1;
    }
    wtr.flush()?;

    info!(total, kept, "saved county address subset to {}", out.display());
    Ok(out)
}

/// Load the geocoding columns of a county subset.
pub fn read_address_points<P: AsRef<Path>>(path: P) -> Result<Vec<AddressPoint>> {
    let path = path.as_ref();
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("opening address file {:?}", path))?;
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("address file {:?} row {}", path, i + 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEWIDE: &str = "\
1\tALAMANCE\t5 ELM ST\tBURLINGTON\t27215\t5\t\t\tELM\tST\t\t1\t2\t36.1\t-79.4
92\tWAKE\t100 Main St\tRaleigh\t27601\t100\t\t\tMAIN\tST\t\t3\t4\t35.7\t-78.6
92\tWAKE\t7 OAK DR\tCARY\t27511\t7\t\t\tOAK\tDR\t\t5\t6\t\t
";

    #[test]
    fn subset_keeps_matching_county_with_header() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let state = dir.path().join(ADDRESS_DATA_FILE);
        fs::write(&state, STATEWIDE)?;
        let out = dir.path().join("scratch/wake_addresses.csv");

        let path = subset_address_data(&state, "wake", &out)?;
        assert_eq!(path, out);

        let text = fs::read_to_string(&out)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], ADDRESS_COLUMNS.join(","));
        assert!(lines[1].starts_with("92,WAKE,100 Main St,Raleigh,27601,"));

        let points = read_address_points(&out)?;
        assert_eq!(
            points[0],
            AddressPoint {
                st_address: "100 Main St".into(),
                city: "Raleigh".into(),
                zip: "27601".into(),
                latitude: Some(35.7),
                longitude: Some(-78.6),
            }
        );
        assert_eq!(points[1].latitude, None);
        Ok(())
    }

    #[test]
    fn leading_zeros_survive_as_text() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let state = dir.path().join(ADDRESS_DATA_FILE);
        fs::write(&state, "007\tWAKE\t1 A ST\tAPEX\t02750\t1\t\t\tA\tST\t\t0\t0\t35\t-78\n")?;
        let out = dir.path().join("wake.csv");
        subset_address_data(&state, "Wake", &out)?;
        let text = fs::read_to_string(&out)?;
        assert!(text.lines().nth(1).unwrap().starts_with("007,WAKE,1 A ST,APEX,02750,"));
        Ok(())
    }

    #[test]
    fn existing_subset_short_circuits() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("wake_addresses.csv");
        fs::write(&out, "cached")?;

        let missing_state = dir.path().join("does_not_exist.txt");
        let path = subset_address_data(&missing_state, "WAKE", &out)?;
        assert_eq!(path, out);
        assert_eq!(fs::read_to_string(&out)?, "cached");
        Ok(())
    }
}
