//! County voter layer: registration extract geocoded against SBE address points.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument};

use crate::{address, layer::GeoPoint};

pub mod geocode;
pub mod layer;
pub mod registration;

pub use geocode::{geocode, AddressIndex};
pub use layer::{read_voter_layer, write_voter_layer};
pub use registration::{read_county_voters, CountyVoters, VOTER_COLUMNS};

/// One registration row, keyed by `voter_reg_num`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub voter_reg_num: String,
    pub res_street_address: String,
    pub res_city_desc: String,
    pub state_cd: String,
    pub zip_code: String,
    pub race_code: String,
    pub ethnic_code: String,
    pub gender_code: String,
    pub party_cd: String,
    pub ncid: String,
}

/// A voter and the location of their residential address, if it matched an address point.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedVoter {
    pub record: VoterRecord,
    pub location: Option<GeoPoint>,
}

/// Build the geocoded voter layer for one county.
///
/// `data_file` is the statewide registration extract and `address_file` the county subset
/// produced by [`address::subset_address_data`]. With `out_shapefile` the layer is also saved.
#[instrument(level = "info", skip(data_file, address_file, out_shapefile))]
pub fn get_voter_data(
    data_file: &Path,
    address_file: &Path,
    county_name: &str,
    out_shapefile: Option<&Path>,
) -> Result<Vec<GeocodedVoter>> {
    info!("reading in the voter registration data file");
    let CountyVoters { voters, .. } = read_county_voters(data_file, county_name)?;

    info!("reading in address file {}", address_file.display());
    let index = AddressIndex::new(address::read_address_points(address_file)?);
    info!(addresses = index.len(), "indexed address points");

    let geocoded = geocode(voters, &index);
    drop(index);

    if let Some(path) = out_shapefile {
        info!("saving to {}", path.display());
        write_voter_layer(path, &geocoded, county_name)?;
    }
    Ok(geocoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn matching_address_places_voter_at_its_point() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let state_addresses = dir.path().join(address::ADDRESS_DATA_FILE);
        fs::write(
            &state_addresses,
            "92\tWAKE\t100 Main St\tRaleigh\t27601\t100\t\t\tMAIN\tST\t\t0\t0\t35.7\t-78.6\n",
        )?;
        let county_addresses = address::subset_address_data(
            &state_addresses,
            "Wake",
            dir.path().join("wake_addresses.csv"),
        )?;

        let voter_file = dir.path().join("ncvoter_Statewide.txt");
        fs::write(
            &voter_file,
            "county_desc\tvoter_reg_num\tncid\tres_street_address\tres_city_desc\tstate_cd\tzip_code\trace_code\tethnic_code\tgender_code\tparty_cd\n\
             WAKE\t000001\tAA1\t100  Main   St\tRaleigh\tNC\t27601\tW\tNL\tM\tUNA\n\
             WAKE\t000002\tAA2\t5 Lost Ln\tRaleigh\tNC\t27601\tB\tNL\tF\tDEM\n",
        )?;

        let out = dir.path().join("wake_voters.shp");
        let voters = get_voter_data(&voter_file, &county_addresses, "Wake", Some(out.as_path()))?;

        assert_eq!(voters.len(), 2);
        assert_eq!(voters[0].record.ncid, "AA1");
        assert_eq!(voters[0].location, Some(GeoPoint::new(-78.6, 35.7)));
        assert_eq!(voters[1].location, None);

        let reloaded = read_voter_layer(&out)?;
        assert_eq!(reloaded, voters);
        Ok(())
    }
}
