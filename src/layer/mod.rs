// src/layer/mod.rs
//! Shapefile sidecars and DBF field helpers shared by the block and voter layers.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// ESRI WKT for geographic NAD83, written next to every layer.
pub const NAD83_PRJ: &str = concat!(
    "GEOGCS[\"GCS_North_American_1983\",",
    "DATUM[\"D_North_American_1983\",",
    "SPHEROID[\"GRS_1980\",6378137.0,298.257222101]],",
    "PRIMEM[\"Greenwich\",0.0],",
    "UNIT[\"Degree\",0.0174532925199433]]"
);

/// A longitude/latitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Both coordinates present and finite.
    pub fn from_parts(longitude: Option<f64>, latitude: Option<f64>) -> Option<Self> {
        match (longitude, latitude) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Self::new(x, y)),
            _ => None,
        }
    }
}

impl From<GeoPoint> for shapefile::Point {
    fn from(p: GeoPoint) -> Self {
        shapefile::Point::new(p.longitude, p.latitude)
    }
}

impl From<shapefile::Point> for GeoPoint {
    fn from(p: shapefile::Point) -> Self {
        GeoPoint::new(p.x, p.y)
    }
}

/// Write the NAD83 `.prj` for `shp_path`.
pub fn write_projection(shp_path: &Path) -> Result<PathBuf> {
    let prj = shp_path.with_extension("prj");
    fs::write(&prj, NAD83_PRJ).with_context(|| format!("writing projection {:?}", prj))?;
    Ok(prj)
}

/// Write the `.txt` provenance note for `shp_path`; `{date}` in `body` becomes today's date.
pub fn write_metadata(shp_path: &Path, body: &str) -> Result<PathBuf> {
    let txt = shp_path.with_extension("txt");
    let today = Local::now().format("%Y-%m-%d").to_string();
    fs::write(&txt, body.replace("{date}", &today))
        .with_context(|| format!("writing metadata {:?}", txt))?;
    Ok(txt)
}

/// `<stem>_nogeom.csv` beside `shp_path`: rows that have attributes but no geometry.
pub fn nogeom_path(shp_path: &Path) -> PathBuf {
    let stem = shp_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layer".to_string());
    shp_path.with_file_name(format!("{}_nogeom.csv", stem))
}

/// The DBF attribute table layout of a layer.
pub enum Field {
    Text(&'static str, u8),
    Number(&'static str, u8, u8),
}

pub fn table_builder(fields: &[Field]) -> Result<TableWriterBuilder> {
    let mut builder = TableWriterBuilder::new();
    for field in fields {
        builder = match *field {
            Field::Text(name, width) => builder.add_character_field(field_name(name)?, width),
            Field::Number(name, width, decimals) => {
                builder.add_numeric_field(field_name(name)?, width, decimals)
            }
        };
    }
    Ok(builder)
}

fn field_name(name: &str) -> Result<FieldName> {
    FieldName::try_from(name).map_err(|e| anyhow!("invalid DBF field name {}: {:?}", name, e))
}

/// Character value cut to `width` bytes on a char boundary; blank values are written as null.
pub fn text(value: &str, width: usize) -> FieldValue {
    if value.is_empty() {
        return FieldValue::Character(None);
    }
    let mut end = value.len().min(width);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    FieldValue::Character(Some(value[..end].to_string()))
}

pub fn number(value: Option<f64>) -> FieldValue {
    FieldValue::Numeric(value)
}

/// Build a DBF record from `(field, value)` pairs.
pub fn record<I: IntoIterator<Item = (&'static str, FieldValue)>>(values: I) -> Record {
    let mut rec = Record::default();
    for (name, value) in values {
        rec.insert(name.to_string(), value);
    }
    rec
}

/// Read a character field; blank values read as an empty string.
pub fn read_text(rec: &Record, name: &str) -> String {
    match rec.get(name) {
        Some(FieldValue::Character(Some(s))) => s.trim().to_string(),
        Some(FieldValue::Memo(s)) => s.trim().to_string(),
        Some(FieldValue::Numeric(Some(n))) => n.to_string(),
        Some(FieldValue::Integer(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Read a numeric field of any DBF numeric type.
pub fn read_number(rec: &Record, name: &str) -> Option<f64> {
    match rec.get(name) {
        Some(FieldValue::Numeric(n)) => *n,
        Some(FieldValue::Float(f)) => f.map(f64::from),
        Some(FieldValue::Double(d)) => Some(*d),
        Some(FieldValue::Integer(i)) => Some(f64::from(*i)),
        Some(FieldValue::Character(Some(s))) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Remove a previous layer (`.shp/.shx/.dbf/.prj/.txt` and the no-geometry sidecar).
pub fn remove_layer(shp_path: &Path) -> Result<()> {
    for ext in ["shp", "shx", "dbf", "prj", "txt"] {
        let p = shp_path.with_extension(ext);
        if p.exists() {
            debug!(path = %p.display(), "removing stale layer file");
            fs::remove_file(&p).with_context(|| format!("removing {:?}", p))?;
        }
    }
    let sidecar = nogeom_path(shp_path);
    if sidecar.exists() {
        fs::remove_file(&sidecar).with_context(|| format!("removing {:?}", sidecar))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecars_sit_next_to_the_layer() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let shp = dir.path().join("wake_voters.shp");
        let prj = write_projection(&shp)?;
        let txt = write_metadata(&shp, "Voter data for WAKE Co. extracted from\nNC SBE data on {date}")?;

        assert_eq!(prj, dir.path().join("wake_voters.prj"));
        assert_eq!(fs::read_to_string(prj)?, NAD83_PRJ);
        let note = fs::read_to_string(txt)?;
        assert!(note.starts_with("Voter data for WAKE Co. extracted from\nNC SBE data on "));
        assert!(!note.contains("{date}"));
        assert_eq!(nogeom_path(&shp), dir.path().join("wake_voters_nogeom.csv"));
        Ok(())
    }

    #[test]
    fn text_is_cut_on_char_boundaries() {
        assert_eq!(text("ABCDEF", 4), FieldValue::Character(Some("ABCD".into())));
        assert_eq!(text("Jos\u{e9}", 4), FieldValue::Character(Some("Jos".into())));
        assert_eq!(text("", 4), FieldValue::Character(None));
    }

    #[test]
    fn point_requires_both_finite_coordinates() {
        assert_eq!(
            GeoPoint::from_parts(Some(-78.6), Some(35.7)),
            Some(GeoPoint::new(-78.6, 35.7))
        );
        assert_eq!(GeoPoint::from_parts(None, Some(35.7)), None);
        assert_eq!(GeoPoint::from_parts(Some(f64::NAN), Some(35.7)), None);
    }
}
