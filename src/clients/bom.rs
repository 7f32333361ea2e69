//! Australian Bureau of Meteorology Water Data Online client
//!
//! BOM exposes a kisters QueryServices endpoint. List requests return a
//! JSON array whose first element is the header row; timeseries value
//! requests return an object with a comma-joined `columns` string and a
//! `data` array. Fetching data is a two-step dance: resolve a
//! timeseries id for (parameter, station, ts name), then request the
//! values between two local-time bounds.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use reqwest::Url;

use crate::clients::{
    json_scalar_to_string, unsupported, Client, ClientError, Frequency, MetadataQuery,
    ResolvedQuery, Source, Statistic, Variable,
};
use crate::core::http::HttpAgent;
use crate::core::table::Table;

const BOM_URL: &str = "http://www.bom.gov.au/waterdata/services";

/// Continuous parameters published with DailyMean/Max/Min series
const CONTINUOUS_PARAMETERS: &[&str] = &[
    "Dry Air Temperature",
    "Relative Humidity",
    "Wind Speed",
    "Electrical Conductivity At 25C",
    "Turbidity",
    "pH",
    "Water Temperature",
    "Ground Water Level",
    "Water Course Level",
    "Water Course Discharge",
    "Storage Level",
    "Storage Volume",
];

/// Discrete parameters published as daily totals
const DISCRETE_PARAMETERS: &[&str] = &["Rainfall", "Evaporation"];

const DEFAULT_STATION_FIELDS: &[&str] = &[
    "station_name",
    "station_no",
    "station_id",
    "station_latitude",
    "station_longitude",
];

pub struct BomClient;

impl Client for BomClient {
    fn source(&self) -> Source {
        Source::Bom
    }

    fn site_column(&self) -> &'static str {
        "station_no"
    }

    fn variable_code(&self, variable: Variable) -> Result<String, ClientError> {
        Ok(match variable {
            Variable::Discharge => "Water Course Discharge".to_string(),
            // BOM publishes stage under "Water Course Level"
            Variable::Stage => "Water Course Level".to_string(),
        })
    }

    fn frequency_code(&self, frequency: Frequency) -> Result<Option<String>, ClientError> {
        match frequency {
            // Daily series are aggregated over 24 hours
            Frequency::Daily => Ok(Some("24HR".to_string())),
            _ => Err(unsupported(self.source(), "frequency", frequency, &["daily"])),
        }
    }

    fn statistic_code(&self, statistic: Statistic) -> Result<Option<String>, ClientError> {
        Ok(Some(
            match statistic {
                Statistic::Mean => "Mean",
                Statistic::Maximum => "Max",
                Statistic::Minimum => "Min",
            }
            .to_string(),
        ))
    }

    fn fetch_metadata(
        &self,
        http: &HttpAgent,
        query: &MetadataQuery,
        _quiet: bool,
    ) -> Result<Table, ClientError> {
        let parameter_type = self.variable_code(query.variable.unwrap_or_default())?;
        let params = vec![
            ("request", "getStationList".to_string()),
            ("parameterType_name", parameter_type),
            ("returnfields", DEFAULT_STATION_FIELDS.join(",")),
        ];
        let json = self.query(http, &params)?;
        self.table_from_header_rows(&json)
    }

    fn fetch_site_data(
        &self,
        http: &HttpAgent,
        site: &str,
        query: &ResolvedQuery,
        _metadata: Option<&Table>,
    ) -> Result<Option<Table>, ClientError> {
        let (start, end) = match (query.start, query.end) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                return Err(ClientError::MissingTimeRange {
                    source: self.source(),
                })
            }
        };

        let var = query.statistic.clone().unwrap_or_else(|| default_var(&query.variable));
        let aggregation = query.frequency.as_deref().unwrap_or("24HR");
        let ts_name = format!("DMQaQc.Merged.Daily{var}.{aggregation}");
        validate_ts_name(&query.variable, &ts_name)?;

        let tz = self.infer_timezone(http, &query.variable, site)?;
        let from = localize(start, tz).to_rfc3339();
        let to = localize(end, tz).to_rfc3339();

        let ts_id = self.timeseries_id(http, &query.variable, site, &ts_name)?;

        let params = vec![
            ("request", "getTimeseriesValues".to_string()),
            ("ts_id", ts_id),
            ("from", from),
            ("to", to),
            ("returnfields", "Timestamp,Value,Quality Code".to_string()),
        ];
        let json = self.query(http, &params)?;
        Ok(Some(self.values_table(&json)?))
    }
}

impl BomClient {
    /// Issue a QueryServices request with the base parameters applied
    fn query(
        &self,
        http: &HttpAgent,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, ClientError> {
        let mut all = vec![
            ("service", "kisters".to_string()),
            ("type", "QueryServices".to_string()),
            ("format", "json".to_string()),
        ];
        all.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let url = Url::parse_with_params(BOM_URL, &all).expect("BOM URL is valid");
        Ok(http.get_json(url.as_str())?)
    }

    /// Parse a list response: a JSON array whose first row is the header
    fn table_from_header_rows(&self, json: &serde_json::Value) -> Result<Table, ClientError> {
        let rows = json.as_array().ok_or_else(|| self.malformed("expected a JSON array"))?;
        if rows.first().and_then(|v| v.as_str()) == Some("No matches.") {
            return Err(ClientError::Api {
                source: self.source(),
                message: "no parameter type and station number match found".to_string(),
            });
        }
        let header = rows
            .first()
            .and_then(|v| v.as_array())
            .ok_or_else(|| self.malformed("missing header row"))?;
        let mut table = Table::new(header.iter().map(json_scalar_to_string));
        for row in &rows[1..] {
            let cells = row
                .as_array()
                .ok_or_else(|| self.malformed("row is not an array"))?;
            table.push_row(cells.iter().map(json_scalar_to_string).collect())?;
        }
        Ok(table)
    }

    /// Parse a getTimeseriesValues response into a Timestamp/Value/
    /// Quality Code table
    fn values_table(&self, json: &serde_json::Value) -> Result<Table, ClientError> {
        let block = json
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| self.malformed("empty timeseries response"))?;
        let columns: Vec<String> = block
            .get("columns")
            .and_then(|c| c.as_str())
            .ok_or_else(|| self.malformed("missing columns field"))?
            .split(',')
            .map(String::from)
            .collect();
        let data = block
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| self.malformed("missing data field"))?;

        if data.is_empty() {
            // Empty but well-formed, so callers still get the header
            return Ok(Table::new(["Timestamp", "Value", "Quality Code"]));
        }

        let mut table = Table::new(columns);
        for row in data {
            let cells = row
                .as_array()
                .ok_or_else(|| self.malformed("data row is not an array"))?;
            table.push_row(cells.iter().map(json_scalar_to_string).collect())?;
        }
        Ok(table)
    }

    /// Resolve the timeseries id for (parameter, station, ts name)
    fn timeseries_id(
        &self,
        http: &HttpAgent,
        parameter_type: &str,
        site: &str,
        ts_name: &str,
    ) -> Result<String, ClientError> {
        let params = vec![
            ("request", "getTimeseriesList".to_string()),
            ("parametertype_name", parameter_type.to_string()),
            ("ts_name", ts_name.to_string()),
            ("station_no", site.to_string()),
        ];
        let json = self.query(http, &params)?;
        let table = self.table_from_header_rows(&json)?;
        if table.is_empty() {
            return Err(ClientError::Api {
                source: self.source(),
                message: format!("no '{ts_name}' timeseries published for station {site}"),
            });
        }
        Ok(table
            .value(0, "ts_id")
            .ok_or_else(|| self.malformed("timeseries list has no ts_id column"))?
            .to_string())
    }

    /// Look up the station's jurisdiction and map it to a UTC offset
    fn infer_timezone(
        &self,
        http: &HttpAgent,
        parameter_type: &str,
        site: &str,
    ) -> Result<FixedOffset, ClientError> {
        let params = vec![
            ("request", "getStationList".to_string()),
            ("parameterType_name", parameter_type.to_string()),
            ("station_no", site.to_string()),
            ("returnfields", "custom_attributes".to_string()),
        ];
        let json = self.query(http, &params)?;
        let table = self.table_from_header_rows(&json)?;
        if table.is_empty() {
            return Err(ClientError::Api {
                source: self.source(),
                message: format!("station number {site} is invalid"),
            });
        }
        let owner = table.value(0, "DATA_OWNER_NAME").unwrap_or("");
        let jurisdiction = owner.split(" -").next().unwrap_or("");
        Ok(jurisdiction_offset(jurisdiction))
    }

    fn malformed(&self, message: &str) -> ClientError {
        ClientError::Malformed {
            source: self.source(),
            message: message.to_string(),
        }
    }
}

/// Default aggregation variable when no statistic is requested:
/// discrete parameters publish totals, continuous ones means
fn default_var(parameter_type: &str) -> String {
    if DISCRETE_PARAMETERS.contains(&parameter_type) {
        "Total".to_string()
    } else {
        "Mean".to_string()
    }
}

/// Check a ts name against the daily series BOM actually publishes for
/// the parameter type
fn validate_ts_name(parameter_type: &str, ts_name: &str) -> Result<(), ClientError> {
    let valid: Vec<&str> = if CONTINUOUS_PARAMETERS.contains(&parameter_type) {
        let mut v = vec![
            "DMQaQc.Merged.DailyMean.24HR",
            "DMQaQc.Merged.DailyMax.24HR",
            "DMQaQc.Merged.DailyMin.24HR",
        ];
        if parameter_type == "Water Course Discharge" {
            v.push("DMQaQc.Merged.DailyMean.09HR");
        }
        v
    } else if DISCRETE_PARAMETERS.contains(&parameter_type) {
        vec![
            "DMQaQc.Merged.DailyTotal.09HR",
            "DMQaQc.Merged.DailyTotal.24HR",
        ]
    } else {
        Vec::new()
    };

    if valid.contains(&ts_name) {
        Ok(())
    } else {
        Err(ClientError::Api {
            source: Source::Bom,
            message: format!(
                "invalid combination of parameter type, statistic and aggregation: {ts_name}"
            ),
        })
    }
}

/// Jurisdictions map to DST-free zones, so fixed offsets suffice
fn jurisdiction_offset(jurisdiction: &str) -> FixedOffset {
    let east = |secs| FixedOffset::east_opt(secs).expect("offset is in range");
    match jurisdiction {
        // AEST, no daylight saving in Queensland
        "ACT" | "ACTNSW" | "NSW" | "QLD" | "TAS" | "VIC" => east(10 * 3600),
        // ACST
        "SA" | "NT" => east(9 * 3600 + 1800),
        // AWST
        "WA" => east(8 * 3600),
        _ => east(0),
    }
}

/// Interpret the naive clock time of a UTC instant as local time in
/// the station's zone (date bounds are given in station-local time)
fn localize(instant: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    offset
        .from_local_datetime(&instant.naive_utc())
        .single()
        .expect("fixed offsets have unambiguous local times")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variable_codes() {
        let client = BomClient;
        assert_eq!(
            client.variable_code(Variable::Discharge).unwrap(),
            "Water Course Discharge"
        );
        assert_eq!(
            client.variable_code(Variable::Stage).unwrap(),
            "Water Course Level"
        );
    }

    #[test]
    fn test_only_daily_frequency() {
        let client = BomClient;
        assert_eq!(
            client.frequency_code(Frequency::Daily).unwrap().unwrap(),
            "24HR"
        );
        assert!(client.frequency_code(Frequency::Monthly).is_err());
    }

    #[test]
    fn test_validate_ts_name() {
        validate_ts_name("Water Course Discharge", "DMQaQc.Merged.DailyMean.24HR").unwrap();
        validate_ts_name("Water Course Discharge", "DMQaQc.Merged.DailyMean.09HR").unwrap();
        validate_ts_name("Rainfall", "DMQaQc.Merged.DailyTotal.24HR").unwrap();

        // 09HR means are discharge-only
        assert!(validate_ts_name("Water Course Level", "DMQaQc.Merged.DailyMean.09HR").is_err());
        assert!(validate_ts_name("Rainfall", "DMQaQc.Merged.DailyMean.24HR").is_err());
        assert!(validate_ts_name("Unknown", "DMQaQc.Merged.DailyMean.24HR").is_err());
    }

    #[test]
    fn test_default_var() {
        assert_eq!(default_var("Water Course Discharge"), "Mean");
        assert_eq!(default_var("Rainfall"), "Total");
    }

    #[test]
    fn test_jurisdiction_offsets() {
        assert_eq!(jurisdiction_offset("QLD").local_minus_utc(), 10 * 3600);
        assert_eq!(jurisdiction_offset("NT").local_minus_utc(), 9 * 3600 + 1800);
        assert_eq!(jurisdiction_offset("WA").local_minus_utc(), 8 * 3600);
        assert_eq!(jurisdiction_offset("elsewhere").local_minus_utc(), 0);
    }

    #[test]
    fn test_localize_keeps_clock_time() {
        let instant = crate::core::time::parse_time("2020-01-01").unwrap();
        let local = localize(instant, jurisdiction_offset("QLD"));
        assert_eq!(local.to_rfc3339(), "2020-01-01T00:00:00+10:00");
    }

    #[test]
    fn test_table_from_header_rows() {
        let client = BomClient;
        let json = json!([
            ["station_no", "station_name"],
            ["410730", "Cotter R. at Gingera"]
        ]);
        let table = client.table_from_header_rows(&json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0, "station_no").unwrap(), "410730");
    }

    #[test]
    fn test_no_matches_is_api_error() {
        let client = BomClient;
        let err = client.table_from_header_rows(&json!(["No matches."])).unwrap_err();
        assert!(matches!(err, ClientError::Api { .. }));
    }

    #[test]
    fn test_values_table() {
        let client = BomClient;
        let json = json!([{
            "columns": "Timestamp,Value,Quality Code",
            "data": [["2020-01-01T00:00:00+10:00", 1.23, 10]]
        }]);
        let table = client.values_table(&json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0, "Value").unwrap(), "1.23");
    }

    #[test]
    fn test_values_table_empty_keeps_header() {
        let client = BomClient;
        let json = json!([{ "columns": "Timestamp,Value,Quality Code", "data": [] }]);
        let table = client.values_table(&json).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns(), ["Timestamp", "Value", "Quality Code"]);
    }
}
