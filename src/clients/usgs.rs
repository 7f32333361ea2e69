//! USGS National Water Information System client
//!
//! Metadata comes from the `site` service in RDB format (tab-delimited
//! text with comment lines and a field-width row); observations come
//! from the `dv`/`iv` services as WaterML JSON. Site inventories are
//! retrieved per US state and concatenated.

use reqwest::Url;

use crate::clients::{
    json_scalar_to_string, progress_bar, unsupported, Client, ClientError, Frequency,
    MetadataQuery, ResolvedQuery, Source, Statistic, Variable,
};
use crate::core::http::HttpAgent;
use crate::core::table::Table;

const SITE_SERVICE: &str = "https://waterservices.usgs.gov/nwis/site/";
const DATA_SERVICE: &str = "https://waterservices.usgs.gov/nwis";

/// Postal codes accepted by the NWIS stateCd parameter
pub const STATE_CODES: &[&str] = &[
    "al", "ak", "az", "ar", "ca", "co", "ct", "de", "dc", "fl", "ga", "hi", "id", "il", "in",
    "ia", "ks", "ky", "la", "me", "md", "ma", "mi", "mn", "ms", "mo", "mt", "ne", "nv", "nh",
    "nj", "nm", "ny", "nc", "nd", "oh", "ok", "or", "pa", "ri", "sc", "sd", "tn", "tx", "ut",
    "vt", "va", "wa", "wv", "wi", "wy", "pr", "vi", "gu", "as", "mp",
];

pub struct UsgsClient;

impl Client for UsgsClient {
    fn source(&self) -> Source {
        Source::Usgs
    }

    fn site_column(&self) -> &'static str {
        "site_no"
    }

    fn variable_code(&self, variable: Variable) -> Result<String, ClientError> {
        Ok(match variable {
            Variable::Discharge => "00060".to_string(),
            Variable::Stage => "00065".to_string(),
        })
    }

    fn frequency_code(&self, frequency: Frequency) -> Result<Option<String>, ClientError> {
        match frequency {
            Frequency::Daily => Ok(Some("dv".to_string())),
            Frequency::Instantaneous => Ok(Some("iv".to_string())),
            Frequency::Monthly => Err(unsupported(
                self.source(),
                "frequency",
                frequency,
                &["daily", "instantaneous"],
            )),
        }
    }

    fn statistic_code(&self, _statistic: Statistic) -> Result<Option<String>, ClientError> {
        // The dv service always returns the published daily statistic
        Err(ClientError::NoStatistics {
            source: self.source(),
        })
    }

    fn fetch_metadata(
        &self,
        http: &HttpAgent,
        query: &MetadataQuery,
        quiet: bool,
    ) -> Result<Table, ClientError> {
        let variable = query
            .variable
            .map(|v| self.variable_code(v))
            .transpose()?;
        let states = parse_state_codes(&query.states)?;

        let pb = progress_bar(
            states.len() as u64,
            "Downloading site metadata",
            quiet,
        );

        let mut tables = Vec::with_capacity(states.len());
        for state in &states {
            let mut params = vec![("format", "rdb".to_string()), ("stateCd", state.clone())];
            if let Some(code) = &variable {
                params.push(("parameterCd", code.clone()));
            }
            let url = Url::parse_with_params(SITE_SERVICE, &params)
                .expect("site service URL is valid");
            let body = http.get(url.as_str())?;
            tables.push(parse_rdb(&body).ok_or_else(|| ClientError::Malformed {
                source: self.source(),
                message: format!("RDB response for state '{state}' has no header row"),
            })?);
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(Table::concat(tables)?)
    }

    fn fetch_site_data(
        &self,
        http: &HttpAgent,
        site: &str,
        query: &ResolvedQuery,
        _metadata: Option<&Table>,
    ) -> Result<Option<Table>, ClientError> {
        let service = query.frequency.as_deref().unwrap_or("dv");
        let mut params = vec![
            ("format", "json".to_string()),
            ("sites", site.to_string()),
            ("parameterCd", query.variable.clone()),
        ];
        if let Some(start) = query.start {
            params.push(("startDT", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = query.end {
            params.push(("endDT", end.format("%Y-%m-%d").to_string()));
        }
        let url = Url::parse_with_params(&format!("{DATA_SERVICE}/{service}/"), &params)
            .expect("data service URL is valid");

        let json = http.get_json(url.as_str())?;
        Ok(parse_waterml(site, &json))
    }
}

/// Validate user-supplied state codes; empty input means all states
pub fn parse_state_codes(states: &[String]) -> Result<Vec<String>, ClientError> {
    if states.is_empty() {
        return Ok(STATE_CODES.iter().map(|s| s.to_string()).collect());
    }
    let mut unrecognised = Vec::new();
    let mut codes = Vec::with_capacity(states.len());
    for state in states {
        let code = state.to_ascii_lowercase();
        if STATE_CODES.contains(&code.as_str()) {
            codes.push(code);
        } else {
            unrecognised.push(state.clone());
        }
    }
    if !unrecognised.is_empty() {
        return Err(ClientError::StateCode {
            codes: unrecognised.join(", "),
        });
    }
    Ok(codes)
}

/// Parse NWIS RDB text: comment lines start with '#', then a
/// tab-separated header row, then a field-width row, then data rows.
///
/// Returns None when no header row is present.
fn parse_rdb(text: &str) -> Option<Table> {
    let mut lines = text.lines().filter(|l| !l.starts_with('#'));

    let header = lines.next()?;
    let columns: Vec<&str> = header.split('\t').collect();
    let mut table = Table::new(columns.iter().map(|c| c.trim().to_string()));

    // Field-width specifier row (e.g. "5s\t15s\t..."), not data
    lines.next()?;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut row: Vec<String> = line.split('\t').map(String::from).collect();
        row.resize(columns.len(), String::new());
        row.truncate(columns.len());
        // Arity is enforced by the resize
        table.push_row(row).ok()?;
    }
    Some(table)
}

/// Flatten a WaterML-JSON response to (site_no, datetime, value,
/// qualifiers) rows. Returns None when the response holds no series.
fn parse_waterml(site: &str, json: &serde_json::Value) -> Option<Table> {
    let series = json
        .get("value")?
        .get("timeSeries")?
        .as_array()
        .filter(|s| !s.is_empty())?;

    let mut table = Table::new(["site_no", "datetime", "value", "qualifiers"]);
    for ts in series {
        let site_no = ts
            .pointer("/sourceInfo/siteCode/0/value")
            .and_then(|v| v.as_str())
            .unwrap_or(site)
            .to_string();
        let values = ts
            .pointer("/values/0/value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for obs in values {
            let qualifiers = obs
                .get("qualifiers")
                .and_then(|q| q.as_array())
                .map(|q| {
                    q.iter()
                        .map(json_scalar_to_string)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            let row = vec![
                site_no.clone(),
                obs.get("dateTime").map(json_scalar_to_string).unwrap_or_default(),
                obs.get("value").map(json_scalar_to_string).unwrap_or_default(),
                qualifiers,
            ];
            // Arity is fixed at four above
            table.push_row(row).ok()?;
        }
    }
    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variable_codes() {
        let client = UsgsClient;
        assert_eq!(client.variable_code(Variable::Discharge).unwrap(), "00060");
        assert_eq!(client.variable_code(Variable::Stage).unwrap(), "00065");
    }

    #[test]
    fn test_monthly_frequency_unsupported() {
        let client = UsgsClient;
        let err = client.frequency_code(Frequency::Monthly).unwrap_err();
        assert!(err.to_string().contains("monthly"));
    }

    #[test]
    fn test_statistics_unsupported() {
        let client = UsgsClient;
        let message = client.statistic_code(Statistic::Mean).unwrap_err().to_string();
        // The message names the source and ends with an explanation,
        // not a dangling empty list of valid values
        assert_eq!(
            message,
            "statistics are not selectable for usgs; each service returns its published statistic"
        );
    }

    #[test]
    fn test_parse_state_codes_all_by_default() {
        let codes = parse_state_codes(&[]).unwrap();
        assert_eq!(codes.len(), STATE_CODES.len());
    }

    #[test]
    fn test_parse_state_codes_validates() {
        let codes = parse_state_codes(&["MD".to_string(), "va".to_string()]).unwrap();
        assert_eq!(codes, vec!["md", "va"]);

        let err = parse_state_codes(&["md".to_string(), "zz".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "state code(s) zz not recognised");
    }

    #[test]
    fn test_parse_rdb() {
        let text = "\
# comment line
# another comment
agency_cd\tsite_no\tstation_nm
5s\t15s\t50s
USGS\t01646500\tPOTOMAC RIVER
USGS\t01647000\tROCK CREEK
";
        let table = parse_rdb(text).unwrap();
        assert_eq!(table.columns(), ["agency_cd", "site_no", "station_nm"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "site_no").unwrap(), "01646500");
    }

    #[test]
    fn test_parse_rdb_without_header() {
        assert!(parse_rdb("# only comments\n").is_none());
    }

    #[test]
    fn test_parse_waterml() {
        let json = json!({
            "value": {
                "timeSeries": [{
                    "sourceInfo": {"siteCode": [{"value": "01646500"}]},
                    "values": [{
                        "value": [
                            {"value": "120", "qualifiers": ["A"], "dateTime": "2020-01-01T00:00:00.000"},
                            {"value": "118", "qualifiers": ["A", "e"], "dateTime": "2020-01-02T00:00:00.000"}
                        ]
                    }]
                }]
            }
        });
        let table = parse_waterml("01646500", &json).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "value").unwrap(), "120");
        assert_eq!(table.value(1, "qualifiers").unwrap(), "A,e");
    }

    #[test]
    fn test_parse_waterml_empty_series() {
        let json = json!({"value": {"timeSeries": []}});
        assert!(parse_waterml("x", &json).is_none());
    }
}
