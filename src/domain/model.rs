use crate::utils::error::{AstrogetError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One HDU's header: keyword to value.
pub type FitsHeader = Map<String, Value>;

/// One row returned by the archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub data: Map<String, Value>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    pub fn md5sum(&self) -> Option<&str> {
        self.get_str("md5sum")
    }
}

impl From<Map<String, Value>> for Record {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

/// Records from a search plus the info block the server prepends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Found {
    pub meta: Map<String, Value>,
    pub header: Map<String, Value>,
    pub records: Vec<Record>,
}

impl Found {
    pub fn from_json(value: Value) -> Result<Self> {
        let mut found = Found::default();

        match value {
            Value::Array(items) => {
                let mut items = items.into_iter().peekable();
                let has_info = matches!(
                    items.peek(),
                    Some(Value::Object(obj)) if obj.contains_key("META") || obj.contains_key("HEADER")
                );
                if has_info {
                    if let Some(Value::Object(info)) = items.next() {
                        found.take_info(info);
                    }
                }
                for item in items {
                    if let Value::Object(obj) = item {
                        found.records.push(Record::from(obj));
                    }
                }
            }
            Value::Object(mut obj) => match obj.remove("records") {
                Some(Value::Array(items)) => {
                    found.take_info(obj);
                    found.records = items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::Object(obj) => Some(Record::from(obj)),
                            _ => None,
                        })
                        .collect();
                }
                _ => {
                    return Err(AstrogetError::ProcessingError {
                        message: "Search response object has no 'records' array".to_string(),
                    })
                }
            },
            other => {
                return Err(AstrogetError::ProcessingError {
                    message: format!("Unexpected search response: {}", other),
                })
            }
        }

        Ok(found)
    }

    fn take_info(&mut self, mut info: Map<String, Value>) {
        if let Some(Value::Object(meta)) = info.remove("META") {
            self.meta = meta;
        }
        if let Some(Value::Object(header)) = info.remove("HEADER") {
            self.header = header;
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Values of `field` across all records that carry it.
    pub fn column(&self, field: &str) -> Vec<&Value> {
        self.records.iter().filter_map(|r| r.get(field)).collect()
    }
}

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Find Results: {} records", self.records.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecType {
    File,
    Hdu,
}

impl RecType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecType::File => "file",
            RecType::Hdu => "hdu",
        }
    }
}

/// A position on the sky in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPosition {
    pub ra: f64,
    pub dec: f64,
}

impl SkyPosition {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }
}

impl FromStr for SkyPosition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (ra, dec) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'RA,DEC' in degrees, got '{}'", s))?;
        let ra: f64 = ra
            .trim()
            .parse()
            .map_err(|e| format!("invalid RA '{}': {}", ra, e))?;
        let dec: f64 = dec
            .trim()
            .parse()
            .map_err(|e| format!("invalid DEC '{}': {}", dec, e))?;
        if !(-90.0..=90.0).contains(&dec) {
            return Err(format!("DEC {} is outside [-90, 90]", dec));
        }
        Ok(Self { ra, dec })
    }
}

impl fmt::Display for SkyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.ra, self.dec)
    }
}

/// One image region to cut out of an archived HDU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoutTarget {
    pub md5: String,
    pub hdu_idx: usize,
    pub ra: f64,
    pub dec: f64,
}

impl CutoutTarget {
    pub fn new(md5: impl Into<String>, hdu_idx: usize, ra: f64, dec: f64) -> Self {
        Self {
            md5: md5.into(),
            hdu_idx,
            ra,
            dec,
        }
    }

    /// Default file name for a single cutout, e.g. `subimage_<md5>_283_-30.fits`.
    pub fn default_filename(&self) -> String {
        format!(
            "subimage_{}_{}_{}.fits",
            self.md5,
            self.ra.trunc() as i64,
            self.dec.trunc() as i64
        )
    }
}
