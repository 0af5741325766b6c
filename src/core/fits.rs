//! Minimal FITS reader: enough to list HDU headers and sanity check a
//! downloaded file. Data units are skipped, never decoded.

use crate::domain::model::FitsHeader;
use crate::utils::error::{AstrogetError, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

pub const BLOCK_SIZE: usize = 2880;
pub const CARD_SIZE: usize = 80;
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FitsValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FitsValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FitsValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FitsValue::Logical(b) => Value::Bool(*b),
            FitsValue::Integer(i) => Value::from(*i),
            FitsValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FitsValue::Text(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<FitsValue>,
    pub comment: Option<String>,
}

impl Card {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() != CARD_SIZE {
            return Err(invalid(format!("card is {} bytes, expected {}", raw.len(), CARD_SIZE)));
        }
        if !raw.iter().all(|b| (0x20..=0x7e).contains(b)) {
            return Err(invalid("card contains non-printable ASCII".to_string()));
        }
        // 上面已確認皆為 ASCII
        let text = std::str::from_utf8(raw).map_err(|e| invalid(e.to_string()))?;
        let keyword = text[..8].trim_end().to_string();

        if &text[8..10] != "= " {
            let rest = text[8..].trim();
            return Ok(Self {
                keyword,
                value: None,
                comment: (!rest.is_empty()).then(|| rest.to_string()),
            });
        }

        let (value, comment) = parse_value(&text[10..])?;
        Ok(Self {
            keyword,
            value,
            comment,
        })
    }
}

fn parse_value(field: &str) -> Result<(Option<FitsValue>, Option<String>)> {
    let trimmed = field.trim_start();

    if let Some(body) = trimmed.strip_prefix('\'') {
        let mut text = String::new();
        let mut chars = body.char_indices().peekable();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    text.push('\'');
                    chars.next();
                } else {
                    end = Some(i + 1);
                    break;
                }
            } else {
                text.push(c);
            }
        }
        let end = end.ok_or_else(|| invalid(format!("unterminated string in '{}'", field)))?;
        let comment = comment_after(&body[end..]);
        return Ok((Some(FitsValue::Text(text.trim_end().to_string())), comment));
    }

    let (raw, comment) = match trimmed.split_once('/') {
        Some((raw, comment)) => (raw.trim(), Some(comment.trim().to_string())),
        None => (trimmed.trim(), None),
    };

    let value = match raw {
        "" => None,
        "T" => Some(FitsValue::Logical(true)),
        "F" => Some(FitsValue::Logical(false)),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Some(FitsValue::Integer(i))
            } else if let Ok(f) = raw.replace(['D', 'd'], "E").parse::<f64>() {
                Some(FitsValue::Float(f))
            } else {
                // complex 等其他型別原樣保留
                Some(FitsValue::Text(raw.to_string()))
            }
        }
    };
    Ok((value, comment))
}

fn comment_after(rest: &str) -> Option<String> {
    rest.trim_start()
        .strip_prefix('/')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn invalid(message: String) -> AstrogetError {
    AstrogetError::InvalidFits { message }
}

/// One header/data unit: its cards plus where its data lives in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Hdu {
    pub index: usize,
    pub header_offset: usize,
    pub data_offset: usize,
    pub data_len: usize,
    pub cards: Vec<Card>,
}

impl Hdu {
    pub fn get(&self, keyword: &str) -> Option<&FitsValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .and_then(|c| c.value.as_ref())
    }

    pub fn is_primary(&self) -> bool {
        self.index == 0
    }

    /// Keyword/value pairs in the same shape the archive's header endpoint uses.
    pub fn to_header(&self) -> FitsHeader {
        let mut header = FitsHeader::new();
        for card in &self.cards {
            if let Some(value) = &card.value {
                header.insert(card.keyword.clone(), value.to_json());
            }
        }
        header
    }

    fn data_size(cards: &[Card]) -> Result<usize> {
        let get = |keyword: &str| {
            cards
                .iter()
                .find(|c| c.keyword == keyword)
                .and_then(|c| c.value.as_ref())
                .and_then(FitsValue::as_i64)
        };

        let naxis = get("NAXIS").unwrap_or(0);
        if naxis <= 0 {
            return Ok(0);
        }
        let bitpix = get("BITPIX").ok_or_else(|| invalid("missing BITPIX".to_string()))?;
        let overflow = || invalid("data size overflows".to_string());
        let mut elements: i64 = 1;
        for axis in 1..=naxis {
            let len = get(&format!("NAXIS{}", axis))
                .ok_or_else(|| invalid(format!("missing NAXIS{}", axis)))?;
            elements = elements.checked_mul(len).ok_or_else(overflow)?;
        }
        let pcount = get("PCOUNT").unwrap_or(0);
        let gcount = get("GCOUNT").unwrap_or(1);
        let bits = pcount
            .checked_add(elements)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bitpix.checked_abs()?))
            .ok_or_else(overflow)?;
        usize::try_from(bits / 8).map_err(|_| invalid(format!("negative data size {}", bits)))
    }
}

fn padded(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Walk every HDU in `bytes`.
pub fn read_hdus(bytes: &[u8]) -> Result<Vec<Hdu>> {
    let mut hdus = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let header_offset = offset;
        let mut cards = Vec::new();
        let mut ended = false;

        while !ended {
            let block = bytes
                .get(offset..offset + BLOCK_SIZE)
                .ok_or_else(|| invalid(format!("HDU {} header is truncated", hdus.len())))?;
            for raw in block.chunks(CARD_SIZE) {
                let card = Card::parse(raw)?;
                if card.keyword == "END" {
                    ended = true;
                    break;
                }
                if !card.keyword.is_empty() {
                    cards.push(card);
                }
            }
            offset += BLOCK_SIZE;
        }

        let data_len = Hdu::data_size(&cards)?;
        let data_offset = offset;
        let next = data_offset
            .checked_add(padded(data_len))
            .ok_or_else(|| invalid("data size overflows".to_string()))?;
        if next > bytes.len() {
            return Err(invalid(format!(
                "HDU {} data needs {} bytes but only {} remain",
                hdus.len(),
                padded(data_len),
                bytes.len() - data_offset
            )));
        }

        hdus.push(Hdu {
            index: hdus.len(),
            header_offset,
            data_offset,
            data_len,
            cards,
        });
        offset = next;
    }

    if hdus.is_empty() {
        return Err(invalid("file is empty".to_string()));
    }
    Ok(hdus)
}

pub fn read_headers(bytes: &[u8]) -> Result<Vec<FitsHeader>> {
    Ok(read_hdus(bytes)?.iter().map(Hdu::to_header).collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitsReport {
    pub hdu_count: usize,
    pub issues: Vec<String>,
}

impl FitsReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Structural checks on a FITS file; problems are collected, not raised.
pub fn check(bytes: &[u8]) -> FitsReport {
    let mut report = FitsReport::default();

    if bytes.is_empty() {
        report.issues.push("file is empty".to_string());
        return report;
    }
    if bytes.len() % BLOCK_SIZE != 0 {
        report.issues.push(format!(
            "file size {} is not a multiple of {}",
            bytes.len(),
            BLOCK_SIZE
        ));
    }
    if !bytes.starts_with(b"SIMPLE  =") {
        report
            .issues
            .push("first card is not SIMPLE".to_string());
    }

    let hdus = match read_hdus(bytes) {
        Ok(hdus) => hdus,
        Err(e) => {
            report.issues.push(e.to_string());
            return report;
        }
    };
    report.hdu_count = hdus.len();

    for hdu in &hdus {
        if hdu.is_primary() {
            if hdu.get("SIMPLE") != Some(&FitsValue::Logical(true)) {
                report.issues.push("primary HDU does not conform (SIMPLE != T)".to_string());
            }
        } else if hdu.cards.first().map(|c| c.keyword.as_str()) != Some("XTENSION") {
            report
                .issues
                .push(format!("HDU {} does not start with XTENSION", hdu.index));
        }

        for keyword in ["BITPIX", "NAXIS"] {
            if hdu.get(keyword).is_none() {
                report
                    .issues
                    .push(format!("HDU {} is missing {}", hdu.index, keyword));
            }
        }
        let naxis = hdu.get("NAXIS").and_then(FitsValue::as_i64).unwrap_or(0);
        for axis in 1..=naxis {
            let keyword = format!("NAXIS{}", axis);
            if hdu.get(&keyword).is_none() {
                report
                    .issues
                    .push(format!("HDU {} is missing {}", hdu.index, keyword));
            }
        }
    }

    report
}

pub async fn check_file<P: AsRef<Path>>(path: P) -> Result<FitsReport> {
    let bytes = tokio::fs::read(path).await?;
    Ok(check(&bytes))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn card(text: &str) -> String {
        format!("{:<80}", text)
    }

    /// Header block(s) from card strings, END appended, space padded.
    pub fn header_block(cards: &[&str]) -> Vec<u8> {
        let mut text: String = cards.iter().map(|c| card(c)).collect();
        text.push_str(&card("END"));
        let mut bytes = text.into_bytes();
        bytes.resize(padded(bytes.len()), b' ');
        bytes
    }

    pub fn data_block(len: usize) -> Vec<u8> {
        vec![0u8; padded(len)]
    }

    /// Primary with no data plus one 10x10 16-bit image extension.
    pub fn sample_file() -> Vec<u8> {
        let mut bytes = header_block(&[
            "SIMPLE  =                    T / conforms to FITS standard",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
            "EXTEND  =                    T",
            "OBJECT  = 'M 57''s field'     / target",
        ]);
        bytes.extend(header_block(&[
            "XTENSION= 'IMAGE   '",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =                   10",
            "NAXIS2  =                   10",
            "PCOUNT  =                    0",
            "GCOUNT  =                    1",
            "CENRA1  =           283.763875",
            "CRVAL2  =          -3.0479861D1",
        ]));
        bytes.extend(data_block(200));
        bytes
    }
}
