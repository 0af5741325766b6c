use crate::domain::model::{RecType, SkyPosition};
use crate::utils::error::Result;
use crate::utils::validation::validate_field_name;
use serde_json::{json, Value};
use std::str::FromStr;

pub const DEFAULT_FIND_LIMIT: usize = 500;
pub const DEFAULT_OUTFIELD: &str = "md5sum";

/// A search constraint: field name plus the values the server matches against.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub field: String,
    pub values: Vec<Value>,
}

impl Constraint {
    pub fn new(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            values,
        }
    }

    /// `[field, v1, v2, ...]` as sent in the find request body.
    pub fn to_search_term(&self) -> Value {
        let mut term = Vec::with_capacity(self.values.len() + 1);
        term.push(Value::String(self.field.clone()));
        term.extend(self.values.iter().cloned());
        Value::Array(term)
    }
}

// "field=v1,v2"
impl FromStr for Constraint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (field, values) = s
            .split_once('=')
            .ok_or_else(|| format!("expected 'FIELD=VALUE[,VALUE...]', got '{}'", s))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(format!("missing field name in '{}'", s));
        }
        let values = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(parse_scalar)
            .collect();
        Ok(Self::new(field, values))
    }
}

/// `007` is an identifier, not the number 7.
fn has_leading_zero(raw: &str) -> bool {
    let digits = raw.trim_start_matches(['-', '+']).as_bytes();
    digits.len() > 1 && digits[0] == b'0' && digits[1].is_ascii_digit()
}

fn parse_scalar(raw: &str) -> Value {
    if has_leading_zero(raw) {
        return Value::String(raw.to_string());
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Parameters of an advanced-search `find` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub outfields: Vec<String>,
    pub constraints: Vec<Constraint>,
    pub limit: Option<usize>,
    pub sort: Option<String>,
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outfields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outfields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn constrain(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.constraints.push(Constraint::new(field, values));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn effective_outfields(&self) -> Vec<String> {
        if self.outfields.is_empty() {
            vec![DEFAULT_OUTFIELD.to_string()]
        } else {
            self.outfields.clone()
        }
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_FIND_LIMIT)
    }

    /// HDU records are requested as soon as any field used is an `hdu:` field.
    pub fn rectype(&self) -> RecType {
        let outfields = self.effective_outfields();
        let uses_hdu = outfields
            .iter()
            .map(String::as_str)
            .chain(self.constraints.iter().map(|c| c.field.as_str()))
            .any(|field| field.starts_with("hdu:"));
        if uses_hdu {
            RecType::Hdu
        } else {
            RecType::File
        }
    }

    pub fn validate_fields(&self) -> Result<()> {
        for constraint in &self.constraints {
            validate_field_name("constraints", &constraint.field)?;
        }
        for field in &self.outfields {
            validate_field_name("outfields", field)?;
        }
        Ok(())
    }

    pub fn url_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("limit", self.effective_limit().to_string()),
            ("rectype", self.rectype().as_str().to_string()),
        ];
        if let Some(sort) = &self.sort {
            params.push(("sort", sort.clone()));
        }
        params
    }

    /// JSON body: `{"outfields": [...], "search": [[field, v...], ...]}`.
    pub fn search_spec(&self) -> Value {
        let search: Vec<Value> = self
            .constraints
            .iter()
            .map(Constraint::to_search_term)
            .collect();
        json!({
            "outfields": self.effective_outfields(),
            "search": search,
        })
    }
}

/// Parameters of a Simple Image Access HDU search.
#[derive(Debug, Clone, PartialEq)]
pub struct VoHduQuery {
    pub pos: SkyPosition,
    pub size: f64,
    pub instrument: Option<String>,
    pub obs_type: Option<String>,
    pub proc_type: Option<String>,
    pub format: Option<String>,
    pub verb: Option<u8>,
    pub limit: Option<usize>,
}

impl VoHduQuery {
    pub fn new(pos: SkyPosition, size: f64) -> Self {
        Self {
            pos,
            size,
            instrument: None,
            obs_type: None,
            proc_type: None,
            format: Some("ALL".to_string()),
            verb: Some(0),
            limit: None,
        }
    }

    pub fn instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    pub fn obs_type(mut self, obs_type: impl Into<String>) -> Self {
        self.obs_type = Some(obs_type.into());
        self
    }

    pub fn proc_type(mut self, proc_type: impl Into<String>) -> Self {
        self.proc_type = Some(proc_type.into());
        self
    }

    pub fn verb(mut self, verb: u8) -> Self {
        self.verb = Some(verb);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn url_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params.push(("format", "json".to_string()));
        params.push(("POS", self.pos.to_string()));
        params.push(("SIZE", self.size.to_string()));
        if let Some(instrument) = &self.instrument {
            params.push(("instrument", instrument.clone()));
        }
        if let Some(obs_type) = &self.obs_type {
            params.push(("obs_type", obs_type.clone()));
        }
        if let Some(proc_type) = &self.proc_type {
            params.push(("proc_type", proc_type.clone()));
        }
        if let Some(verb) = self.verb {
            params.push(("VERB", verb.to_string()));
        }
        if let Some(format) = &self.format {
            params.push(("FORMAT", format.clone()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_find_query() {
        let query = FindQuery::new();
        assert_eq!(query.effective_outfields(), vec!["md5sum"]);
        assert_eq!(query.rectype(), RecType::File);
        assert_eq!(
            query.url_params(),
            vec![("limit", "500".to_string()), ("rectype", "file".to_string())]
        );
        assert_eq!(query.search_spec(), json!({"outfields": ["md5sum"], "search": []}));
    }

    #[test]
    fn test_hdu_field_switches_rectype() {
        let query = FindQuery::new().outfields(["md5sum", "hdu:ra_center"]);
        assert_eq!(query.rectype(), RecType::Hdu);

        let query = FindQuery::new().constrain("hdu:dec_center", vec![json!(-31), json!(-29)]);
        assert_eq!(query.rectype(), RecType::Hdu);
    }

    #[test]
    fn test_search_spec_keeps_constraint_order() {
        let query = FindQuery::new()
            .outfields(["instrument", "url", "filesize"])
            .constrain("instrument", vec![json!("decam")])
            .constrain("filesize", vec![json!(1e9), json!(1e10)])
            .sort("md5sum")
            .limit(2);
        assert_eq!(
            query.search_spec(),
            json!({
                "outfields": ["instrument", "url", "filesize"],
                "search": [["instrument", "decam"], ["filesize", 1e9, 1e10]]
            })
        );
        assert_eq!(query.url_params()[2], ("sort", "md5sum".to_string()));
    }

    #[test]
    fn test_constraint_from_str() {
        let c: Constraint = "filesize=1000,1e10".parse().unwrap();
        assert_eq!(c.field, "filesize");
        assert_eq!(c.values, vec![json!(1000), json!(1e10)]);

        let c: Constraint = "obs_type=object".parse().unwrap();
        assert_eq!(c.values, vec![json!("object")]);

        let c: Constraint = "prop_id=007,0.5,0,-0042".parse().unwrap();
        assert_eq!(c.values, vec![json!("007"), json!(0.5), json!(0), json!("-0042")]);

        assert!("no-equals".parse::<Constraint>().is_err());
        assert!("=x".parse::<Constraint>().is_err());
    }

    #[test]
    fn test_validate_fields_rejects_bad_names() {
        let query = FindQuery::new().constrain("obs type", vec![json!("object")]);
        assert!(query.validate_fields().is_err());
    }

    #[test]
    fn test_vohdu_params() {
        let query = VoHduQuery::new(SkyPosition::new(194.1820667, 21.6826583), 0.4)
            .instrument("decam")
            .obs_type("object")
            .proc_type("instcal")
            .verb(3)
            .limit(9);
        let params = query.url_params();
        assert_eq!(params[0], ("limit", "9".to_string()));
        assert!(params.contains(&("POS", "194.1820667,21.6826583".to_string())));
        assert!(params.contains(&("SIZE", "0.4".to_string())));
        assert!(params.contains(&("VERB", "3".to_string())));
        assert!(params.contains(&("FORMAT", "ALL".to_string())));
    }

    #[test]
    fn test_vohdu_omits_missing_limit() {
        let params = VoHduQuery::new(SkyPosition::new(1.0, 2.0), 0.1).url_params();
        assert!(params.iter().all(|(k, _)| *k != "limit"));
        assert!(params.iter().all(|(k, _)| *k != "instrument"));
    }
}
