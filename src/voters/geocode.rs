// src/voters/geocode.rs

use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{GeocodedVoter, VoterRecord};
use crate::{address::AddressPoint, layer::GeoPoint};

/// Address match key: (street, city, zip).
type AddressKey = (String, String, String);

/// Lookup of address points by (street, city, zip).
pub struct AddressIndex {
    points: HashMap<AddressKey, Option<GeoPoint>>,
}

impl AddressIndex {
    /// Index the points; the first row for a repeated address wins.
    pub fn new(points: Vec<AddressPoint>) -> Self {
        let mut map = HashMap::with_capacity(points.len());
        let mut repeated = 0usize;
        for p in points {
            let location = GeoPoint::from_parts(p.longitude, p.latitude);
            let key = (p.st_address, p.city, p.zip.trim().to_string());
            if map.contains_key(&key) {
                repeated += 1;
                continue;
            }
            map.insert(key, location);
        }
        if repeated > 0 {
            debug!(repeated, "address points sharing a street/city/zip");
        }
        Self { points: map }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Coordinates for an address, `None` when unmatched or the point lacks coordinates.
    pub fn locate(&self, street: &str, city: &str, zip: &str) -> Option<GeoPoint> {
        self.points
            .get(&(street.to_string(), city.to_string(), zip.to_string()))
            .copied()
            .flatten()
    }
}

/// Left join of voters onto address points. Every voter is kept; unmatched ones get no location.
pub fn geocode(voters: Vec<VoterRecord>, index: &AddressIndex) -> Vec<GeocodedVoter> {
    let geocoded: Vec<GeocodedVoter> = voters
        .into_iter()
        .map(|record| {
            let location =
                index.locate(&record.res_street_address, &record.res_city_desc, &record.zip_code);
            GeocodedVoter { record, location }
        })
        .collect();

    let unmatched = geocoded.iter().filter(|v| v.location.is_none()).count();
    if unmatched > 0 {
        warn!(unmatched, total = geocoded.len(), "voters without an address match");
    }
    info!(matched = geocoded.len() - unmatched, "joined addresses to voters");
    geocoded
}
