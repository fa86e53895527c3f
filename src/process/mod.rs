// src/process/mod.rs
//! Shared readers for the tab-delimited SBE extracts.

use anyhow::{anyhow, Context, Result};
use csv::{ByteRecord, Reader, ReaderBuilder};
use std::{fs::File, io::BufReader, path::Path};

pub mod utils;

pub use utils::{collapse_whitespace, is_missing, TextEncoding};

/// Open a tab-delimited file. Ragged rows are tolerated; short rows read as empty fields.
pub fn tab_reader<P: AsRef<Path>>(path: P, has_headers: bool) -> Result<Reader<BufReader<File>>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("opening tab-delimited file {:?}", path))?;
    Ok(ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(BufReader::new(file)))
}

/// Positions of a fixed set of named columns inside a header row.
#[derive(Debug, Clone)]
pub struct ColumnProjection {
    indices: Vec<usize>,
    encoding: TextEncoding,
}

impl ColumnProjection {
    /// Resolve `wanted` against `headers`; every name must be present.
    pub fn resolve(headers: &ByteRecord, wanted: &[&str], encoding: TextEncoding) -> Result<Self> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| utils::clean_str(&encoding.decode(h)))
            .collect();
        let indices = wanted
            .iter()
            .map(|w| {
                names
                    .iter()
                    .position(|n| n == w)
                    .ok_or_else(|| anyhow!("column {:?} not found in header {:?}", w, names))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { indices, encoding })
    }

    /// Positional projection for header-less files.
    pub fn positional(indices: Vec<usize>, encoding: TextEncoding) -> Self {
        Self { indices, encoding }
    }

    /// Decode the projected fields of `record`, in `wanted` order.
    pub fn project(&self, record: &ByteRecord) -> Vec<String> {
        self.indices
            .iter()
            .map(|&i| record.get(i).map(|b| self.encoding.decode(b)).unwrap_or_default())
            .collect()
    }

    /// Decode a single projected field without materialising the rest.
    pub fn field(&self, record: &ByteRecord, slot: usize) -> String {
        self.indices
            .get(slot)
            .and_then(|&i| record.get(i))
            .map(|b| self.encoding.decode(b))
            .unwrap_or_default()
    }
}
