use crate::domain::model::{FitsHeader, SkyPosition};
use serde::Serialize;
use serde_json::Value;

pub const HDU_CORNER_KEYS: [&str; 10] = [
    "CENRA1", "CENDEC1", "COR1RA1", "COR1DEC1", "COR2RA1", "COR2DEC1", "COR3RA1", "COR3DEC1",
    "COR4RA1", "COR4DEC1",
];
pub const RA_CORNER_KEYS: [&str; 4] = ["COR1RA1", "COR2RA1", "COR3RA1", "COR4RA1"];
pub const DEC_CORNER_KEYS: [&str; 4] = ["COR1DEC1", "COR2DEC1", "COR3DEC1", "COR4DEC1"];

/// Sky footprint of one HDU, from its corner keywords.
///
/// When the footprint straddles RA 0/360 the RA range is shifted so that
/// `ra_min` is negative and `ra_max` stays below 180.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HduBounds {
    pub hdu_idx: usize,
    pub center: SkyPosition,
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

impl HduBounds {
    pub fn from_header(hdu_idx: usize, header: &FitsHeader) -> Option<Self> {
        if !HDU_CORNER_KEYS.iter().all(|key| header.contains_key(*key)) {
            return None;
        }
        let center = SkyPosition::new(
            numeric(header.get("CENRA1")?)?,
            numeric(header.get("CENDEC1")?)?,
        );
        let mut ras = Vec::with_capacity(RA_CORNER_KEYS.len());
        for key in RA_CORNER_KEYS {
            ras.push(numeric(header.get(key)?)?);
        }
        let mut decs = Vec::with_capacity(DEC_CORNER_KEYS.len());
        for key in DEC_CORNER_KEYS {
            decs.push(numeric(header.get(key)?)?);
        }

        let (mut ra_min, mut ra_max) = min_max(&ras);
        if ra_max - ra_min > 180.0 {
            let shifted: Vec<f64> = ras
                .iter()
                .map(|ra| if *ra > 180.0 { ra - 360.0 } else { *ra })
                .collect();
            (ra_min, ra_max) = min_max(&shifted);
        }
        let (dec_min, dec_max) = min_max(&decs);

        Some(Self {
            hdu_idx,
            center,
            ra_min,
            ra_max,
            dec_min,
            dec_max,
        })
    }

    pub fn wraps(&self) -> bool {
        self.ra_min < 0.0
    }

    pub fn contains(&self, pos: SkyPosition) -> bool {
        let ra = if self.wraps() && pos.ra > 180.0 {
            pos.ra - 360.0
        } else {
            pos.ra
        };
        (self.ra_min..=self.ra_max).contains(&ra) && (self.dec_min..=self.dec_max).contains(&pos.dec)
    }
}

/// Bounds for every HDU whose header carries all corner keywords.
pub fn hdu_bounds(headers: &[FitsHeader]) -> Vec<HduBounds> {
    headers
        .iter()
        .enumerate()
        .filter_map(|(idx, header)| HduBounds::from_header(idx, header))
        .collect()
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}
