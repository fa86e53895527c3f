// src/voters/layer.rs

use anyhow::{Context, Result};
use shapefile::{Point, Shape};
use std::{fs, path::Path};
use tracing::{info, instrument, warn};

use super::{GeocodedVoter, VoterRecord};
use crate::layer::{self, Field, GeoPoint};

const VOTER_FIELDS: &[Field] = &[
    Field::Text("REG_NUM", 12),
    Field::Text("NCID", 12),
    Field::Text("STREET", 80),
    Field::Text("CITY", 40),
    Field::Text("STATE", 2),
    Field::Text("ZIP", 10),
    Field::Text("RACE", 3),
    Field::Text("ETHNIC", 3),
    Field::Text("GENDER", 3),
    Field::Text("PARTY", 3),
];

fn to_record(v: &VoterRecord) -> shapefile::dbase::Record {
    layer::record([
        ("REG_NUM", layer::text(&v.voter_reg_num, 12)),
        ("NCID", layer::text(&v.ncid, 12)),
        ("STREET", layer::text(&v.res_street_address, 80)),
        ("CITY", layer::text(&v.res_city_desc, 40)),
        ("STATE", layer::text(&v.state_cd, 2)),
        ("ZIP", layer::text(&v.zip_code, 10)),
        ("RACE", layer::text(&v.race_code, 3)),
        ("ETHNIC", layer::text(&v.ethnic_code, 3)),
        ("GENDER", layer::text(&v.gender_code, 3)),
        ("PARTY", layer::text(&v.party_cd, 3)),
    ])
}

fn from_record(rec: &shapefile::dbase::Record) -> VoterRecord {
    VoterRecord {
        voter_reg_num: layer::read_text(rec, "REG_NUM"),
        ncid: layer::read_text(rec, "NCID"),
        res_street_address: layer::read_text(rec, "STREET"),
        res_city_desc: layer::read_text(rec, "CITY"),
        state_cd: layer::read_text(rec, "STATE"),
        zip_code: layer::read_text(rec, "ZIP"),
        race_code: layer::read_text(rec, "RACE"),
        ethnic_code: layer::read_text(rec, "ETHNIC"),
        gender_code: layer::read_text(rec, "GENDER"),
        party_cd: layer::read_text(rec, "PARTY"),
    }
}

/// Persist voters as a point layer. Voters without a location go to the `_nogeom.csv` sidecar.
#[instrument(level = "info", skip(shp_path, voters), fields(shp = %shp_path.display()))]
pub fn write_voter_layer(shp_path: &Path, voters: &[GeocodedVoter], county_name: &str) -> Result<()> {
    if let Some(parent) = shp_path.parent() {
        fs::create_dir_all(parent)?;
    }
    layer::remove_layer(shp_path)?;

    let mut unlocated = Vec::new();
    {
        let mut writer = shapefile::Writer::from_path(shp_path, layer::table_builder(VOTER_FIELDS)?)
            .with_context(|| format!("creating {:?}", shp_path))?;
        for v in voters {
            match v.location {
                Some(p) => writer
                    .write_shape_and_record(&Point::from(p), &to_record(&v.record))
                    .with_context(|| format!("writing voter {}", v.record.voter_reg_num))?,
                None => unlocated.push(&v.record),
            }
        }
    }

    let sidecar = layer::nogeom_path(shp_path);
    let mut wtr =
        csv::Writer::from_path(&sidecar).with_context(|| format!("creating {:?}", sidecar))?;
    for record in &unlocated {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    info!(
        points = voters.len() - unlocated.len(),
        unlocated = unlocated.len(),
        "wrote voter layer"
    );

    layer::write_projection(shp_path)?;
    layer::write_metadata(
        shp_path,
        &format!(
            "Voter data for {} Co. extracted from\nNC SBE data on {{date}}",
            county_name
        ),
    )?;
    Ok(())
}

/// Load a voter layer written by [`write_voter_layer`], including its unlocated voters.
#[instrument(level = "info", skip(shp_path), fields(shp = %shp_path.display()))]
pub fn read_voter_layer(shp_path: &Path) -> Result<Vec<GeocodedVoter>> {
    let mut reader = shapefile::Reader::from_path(shp_path)
        .with_context(|| format!("opening voter layer {:?}", shp_path))?;
    let mut voters = Vec::new();
    for shape_record in reader.iter_shapes_and_records() {
        let (shape, record) = shape_record.context("reading voter point")?;
        let location = match shape {
            Shape::Point(p) => Some(GeoPoint::from(p)),
            Shape::NullShape => None,
            other => {
                warn!(shape = ?other.shapetype(), "unexpected shape in voter layer");
                None
            }
        };
        voters.push(GeocodedVoter {
            record: from_record(&record),
            location,
        });
    }

    let sidecar = layer::nogeom_path(shp_path);
    if sidecar.exists() {
        let mut rdr =
            csv::Reader::from_path(&sidecar).with_context(|| format!("opening {:?}", sidecar))?;
        for row in rdr.deserialize() {
            let record: VoterRecord = row.with_context(|| format!("reading {:?}", sidecar))?;
            voters.push(GeocodedVoter {
                record,
                location: None,
            });
        }
    }
    info!(voters = voters.len(), "read voter layer");
    Ok(voters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_layer_reloads_points_and_unlocated_voters() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let shp = dir.path().join("wake_voters.shp");
        let located = GeocodedVoter {
            record: VoterRecord {
                voter_reg_num: "000001".into(),
                ncid: "AA1".into(),
                res_street_address: "100 Main St".into(),
                res_city_desc: "Raleigh".into(),
                state_cd: "NC".into(),
                zip_code: "27601".into(),
                race_code: "B".into(),
                ethnic_code: "NL".into(),
                gender_code: "F".into(),
                party_cd: "DEM".into(),
            },
            location: Some(GeoPoint::new(-78.6, 35.7)),
        };
        let unlocated = GeocodedVoter {
            record: VoterRecord {
                voter_reg_num: "000002".into(),
                ncid: "AA2".into(),
                res_street_address: "1 Nowhere Rd".into(),
                ..located.record.clone()
            },
            location: None,
        };

        write_voter_layer(&shp, &[located.clone(), unlocated.clone()], "WAKE")?;
        let back = read_voter_layer(&shp)?;

        assert_eq!(back, vec![located, unlocated]);
        assert!(shp.with_extension("prj").exists());
        assert!(fs::read_to_string(shp.with_extension("txt"))?
            .starts_with("Voter data for WAKE Co. extracted from\n"));
        Ok(())
    }
}
