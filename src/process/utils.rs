/// Character set of a source extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, invalid sequences replaced.
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    pub fn decode(self, raw: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(raw).into_owned(),
            TextEncoding::Latin1 => raw.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Collapse every run of whitespace to a single space and trim both ends.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Empty or blank fields count as missing.
pub fn is_missing(raw: &str) -> bool {
    raw.trim().is_empty()
}
