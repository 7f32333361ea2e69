//! Eaufrance Hub'Eau hydrometrie client
//!
//! Hub'Eau serves elaborated hydrometric observations (daily and
//! monthly aggregates) as paginated JSON. Each endpoint accepts a fixed
//! set of query parameters; responses carry a record count, a `data`
//! array and, for partial responses, a `next` link. The API refuses
//! queries matching more than 20000 records, so daily downloads are
//! chunked into windows that stay under the limit.
//!
//! Elaborated quantities are named by a grandeur code composed from the
//! variable (Q or H), the statistic (m, IX or IN) and the aggregation
//! period (nJ for daily, M for monthly), giving QmnJ, QmM, QIXnJ,
//! QIXM, QINnJ, QINM, HIXnJ and HIXM.

use chrono::{DateTime, Duration, Utc};
use console::style;
use reqwest::Url;

use crate::clients::{
    json_scalar_to_string, unsupported, Client, ClientError, Frequency, MetadataQuery,
    ResolvedQuery, Source, Statistic, Variable,
};
use crate::core::http::HttpAgent;
use crate::core::table::Table;
use crate::core::time::{parse_time, validate_range};

const API_URL: &str = "https://hubeau.eaufrance.fr";

/// Hard limit on records per query, enforced server-side
const MAX_RECORDS: i64 = 20_000;

/// A Hub'Eau endpoint and the query parameters it accepts
struct Endpoint {
    name: &'static str,
    path: &'static str,
    fields: &'static [&'static str],
}

const STATIONS: Endpoint = Endpoint {
    name: "stations",
    path: "api/v2/hydrometrie/referentiel/stations",
    fields: &[
        "bbox",
        "code_commune_station",
        "code_cours_eau",
        "code_departement",
        "code_region",
        "code_sandre_reseau_station",
        "code_site",
        "code_station",
        "date_fermeture_station",
        "date_ouverture_station",
        "distance",
        "en_service",
        "fields",
        "format",
        "latitude",
        "libelle_cours_eau",
        "libelle_site",
        "libelle_station",
        "longitude",
        "page",
        "size",
    ],
};

const OBS_ELAB: Endpoint = Endpoint {
    name: "obs_elab",
    path: "api/v2/hydrometrie/obs_elab",
    fields: &[
        "bbox",
        "code_entite",
        "cursor",
        "date_debut_obs_elab",
        "date_fin_obs_elab",
        "distance",
        "fields",
        "grandeur_hydro_elab",
        "latitude",
        "longitude",
        "resultat_max",
        "resultat_min",
        "size",
    ],
};

pub struct EaufranceClient;

impl Client for EaufranceClient {
    fn source(&self) -> Source {
        Source::Eaufrance
    }

    fn site_column(&self) -> &'static str {
        "code_station"
    }

    fn variable_code(&self, variable: Variable) -> Result<String, ClientError> {
        Ok(match variable {
            Variable::Discharge => "Q".to_string(),
            Variable::Stage => "H".to_string(),
        })
    }

    fn frequency_code(&self, frequency: Frequency) -> Result<Option<String>, ClientError> {
        match frequency {
            Frequency::Daily => Ok(Some("nJ".to_string())),
            Frequency::Monthly => Ok(Some("M".to_string())),
            Frequency::Instantaneous => Err(unsupported(
                self.source(),
                "frequency",
                frequency,
                &["daily", "monthly"],
            )),
        }
    }

    fn statistic_code(&self, statistic: Statistic) -> Result<Option<String>, ClientError> {
        Ok(Some(
            match statistic {
                Statistic::Mean => "m",
                Statistic::Maximum => "IX",
                Statistic::Minimum => "IN",
            }
            .to_string(),
        ))
    }

    /// Compose the grandeur code from variable, statistic and
    /// frequency. Stage has no mean or minimum aggregates.
    fn resolve_query(
        &self,
        query: &crate::clients::DataQuery,
    ) -> Result<ResolvedQuery, ClientError> {
        validate_range(query.start, query.end)?;
        if query.start.is_none() || query.end.is_none() {
            return Err(ClientError::MissingTimeRange {
                source: self.source(),
            });
        }

        let statistic = query.statistic.unwrap_or(match query.variable {
            Variable::Discharge => Statistic::Mean,
            Variable::Stage => Statistic::Maximum,
        });
        if query.variable == Variable::Stage && statistic != Statistic::Maximum {
            return Err(ClientError::StageStatistic);
        }

        let variable = self.variable_code(query.variable)?;
        let stat = self
            .statistic_code(statistic)?
            .unwrap_or_default();
        let freq = self
            .frequency_code(query.frequency)?
            .unwrap_or_default();

        Ok(ResolvedQuery {
            variable: format!("{variable}{stat}{freq}"),
            frequency: None,
            statistic: None,
            start: query.start,
            end: query.end,
        })
    }

    fn fetch_metadata(
        &self,
        http: &HttpAgent,
        _query: &MetadataQuery,
        _quiet: bool,
    ) -> Result<Table, ClientError> {
        let records = self.api_query(http, &STATIONS, &[])?;
        // The station network membership field is verbose and rarely
        // useful in an inventory
        table_from_records(&records, &["code_sandre_reseau_station"]).ok_or_else(|| {
            ClientError::Api {
                source: self.source(),
                message: "the station referential returned no records".to_string(),
            }
        })
    }

    fn fetch_site_data(
        &self,
        http: &HttpAgent,
        site: &str,
        query: &ResolvedQuery,
        metadata: Option<&Table>,
    ) -> Result<Option<Table>, ClientError> {
        let grandeur = normalize_grandeur(&query.variable);
        let (start, end) = match (query.start, query.end) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                return Err(ClientError::MissingTimeRange {
                    source: self.source(),
                })
            }
        };

        // Clamp the window to the station's period of record when the
        // metadata is at hand; a station closed before the requested
        // start has nothing to offer
        let (start, end) = match clamp_to_station(metadata, site, start, end) {
            Some(window) => window,
            None => return Ok(None),
        };

        let mut records = Vec::new();
        if grandeur.ends_with("nJ") {
            for (chunk_start, chunk_end) in chunk_windows(start, end) {
                let chunk = self.obs_elab_query(http, site, &grandeur, chunk_start, chunk_end)?;
                records.extend(chunk);
            }
        } else {
            // Monthly series fit in a single query for any realistic
            // period of record
            records = self.obs_elab_query(http, site, &grandeur, start, end)?;
        }

        Ok(table_from_records(&records, &[]))
    }
}

impl EaufranceClient {
    fn obs_elab_query(
        &self,
        http: &HttpAgent,
        site: &str,
        grandeur: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<serde_json::Value>, ClientError> {
        self.api_query(
            http,
            &OBS_ELAB,
            &[
                ("code_entite", site.to_string()),
                ("date_debut_obs_elab", start.format("%Y-%m-%d").to_string()),
                ("date_fin_obs_elab", end.format("%Y-%m-%d").to_string()),
                ("grandeur_hydro_elab", grandeur.to_string()),
            ],
        )
    }

    /// Query an endpoint, validating parameters and following
    /// pagination links until the full record set is collected
    fn api_query(
        &self,
        http: &HttpAgent,
        endpoint: &Endpoint,
        params: &[(&str, String)],
    ) -> Result<Vec<serde_json::Value>, ClientError> {
        for (name, _) in params {
            if !endpoint.fields.contains(name) {
                return Err(ClientError::UnknownParameter {
                    name: name.to_string(),
                    endpoint: endpoint.name.to_string(),
                });
            }
        }

        let base = format!("{API_URL}/{}", endpoint.path);
        let mut url = Url::parse_with_params(&base, params)
            .map_err(|e| self.malformed(&e.to_string()))?
            .to_string();

        let mut records = Vec::new();
        loop {
            let (status, body) = http.get_with_status(&url)?;
            let content: serde_json::Value =
                serde_json::from_str(&body).map_err(|e| self.malformed(&e.to_string()))?;

            if status >= 400 {
                return Err(self.api_error(status, &url, &content));
            }

            let count = content.get("count").and_then(|c| c.as_i64()).unwrap_or(0);
            if count > MAX_RECORDS {
                return Err(ClientError::RecordLimit {
                    count,
                    limit: MAX_RECORDS,
                });
            }
            if count == 0 {
                break;
            }

            if let Some(data) = content.get("data").and_then(|d| d.as_array()) {
                records.extend(data.iter().cloned());
            }

            match content.get("next").and_then(|n| n.as_str()) {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }

        Ok(records)
    }

    /// Build the error for a 4xx/5xx response, surfacing per-field
    /// messages when the API provides them
    fn api_error(&self, status: u16, url: &str, content: &serde_json::Value) -> ClientError {
        let mut message = format!("error {status} on query {url}");
        if let Some(field_errors) = content.get("field_errors").and_then(|f| f.as_array()) {
            let details: Vec<String> = field_errors
                .iter()
                .map(|fe| {
                    format!(
                        "{}: {}",
                        fe.get("field").map(json_scalar_to_string).unwrap_or_default(),
                        fe.get("message").map(json_scalar_to_string).unwrap_or_default(),
                    )
                })
                .collect();
            if !details.is_empty() {
                message = format!("{message}. Error on parameters: {}", details.join("; "));
            }
        }
        ClientError::Api {
            source: self.source(),
            message,
        }
    }

    fn malformed(&self, message: &str) -> ClientError {
        ClientError::Malformed {
            source: self.source(),
            message: message.to_string(),
        }
    }
}

/// Rewrite the deprecated QmJ grandeur to its current name
pub(crate) fn normalize_grandeur(grandeur: &str) -> String {
    if grandeur == "QmJ" {
        eprintln!(
            "{} the grandeur 'QmJ' is deprecated, using 'QmnJ' instead",
            style("warning:").yellow().bold()
        );
        "QmnJ".to_string()
    } else {
        grandeur.to_string()
    }
}

/// Clamp a time window to a station's opening and closure dates, read
/// from the metadata table. Returns None when no data can exist.
fn clamp_to_station(
    metadata: Option<&Table>,
    site: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let mut start = start;
    let mut end = end;

    if let Some(meta) = metadata {
        if let Some(row) = meta.find_row("code_station", site) {
            let cell = |name: &str| {
                meta.column_index(name)
                    .and_then(|i| row.get(i))
                    .map(String::as_str)
            };
            if let Some(opened) = nonempty(cell("date_ouverture_station")) {
                if let Ok(opened) = parse_time(opened) {
                    start = start.max(opened);
                }
            }
            if let Some(closed) = nonempty(cell("date_fermeture_station")) {
                if let Ok(closed) = parse_time(closed) {
                    end = end.min(closed);
                }
            }
        }
    }

    if start > end {
        None
    } else {
        Some((start, end))
    }
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Split a daily window into inclusive chunks of at most MAX_RECORDS
/// daily records each. Bounds are inclusive, so a chunk spanning N
/// days holds N + 1 records.
fn chunk_windows(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let n_days = (end.date_naive() - start.date_naive()).num_days();
    let chunk_days = n_days.min(MAX_RECORDS - 1).max(0);

    let mut windows = Vec::new();
    let mut chunk_start = start;
    while chunk_start <= end {
        let chunk_end = (chunk_start + Duration::days(chunk_days)).min(end);
        windows.push((chunk_start, chunk_end));
        chunk_start = chunk_end + Duration::days(1);
    }
    windows
}

/// Build a table from JSON records, using the sorted union of their
/// keys as columns. Returns None when there are no records.
fn table_from_records(records: &[serde_json::Value], drop: &[&str]) -> Option<Table> {
    if records.is_empty() {
        return None;
    }

    let mut columns: Vec<String> = Vec::new();
    for record in records {
        if let Some(map) = record.as_object() {
            for key in map.keys() {
                if !drop.contains(&key.as_str()) && !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns.sort();

    let mut table = Table::new(columns.clone());
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|c| record.get(c).map(json_scalar_to_string).unwrap_or_default())
            .collect();
        // Arity matches the column list by construction
        table.push_row(row).ok()?;
    }
    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::DataQuery;
    use crate::core::cache::HttpCache;
    use crate::core::Config;
    use serde_json::json;

    /// Agent whose responses come from a pre-filled cache, so no
    /// request ever leaves the process
    fn cached_agent(cache: HttpCache) -> HttpAgent {
        let config = Config {
            rate_limit: Some(1000.0),
            retries: Some(1),
            backoff: Some(0.0),
            ..Config::default()
        };
        HttpAgent::new(&config, Some(cache)).unwrap()
    }

    fn query(
        variable: Variable,
        frequency: Frequency,
        statistic: Option<Statistic>,
    ) -> DataQuery {
        DataQuery {
            variable,
            frequency,
            statistic,
            start: Some(parse_time("2000-01-01").unwrap()),
            end: Some(parse_time("2010-01-01").unwrap()),
        }
    }

    #[test]
    fn test_grandeur_composition() {
        let client = EaufranceClient;
        let cases = [
            (Variable::Discharge, Frequency::Daily, None, "QmnJ"),
            (Variable::Discharge, Frequency::Monthly, None, "QmM"),
            (
                Variable::Discharge,
                Frequency::Daily,
                Some(Statistic::Maximum),
                "QIXnJ",
            ),
            (
                Variable::Discharge,
                Frequency::Monthly,
                Some(Statistic::Minimum),
                "QINM",
            ),
            (Variable::Stage, Frequency::Daily, None, "HIXnJ"),
            (
                Variable::Stage,
                Frequency::Monthly,
                Some(Statistic::Maximum),
                "HIXM",
            ),
        ];
        for (variable, frequency, statistic, expected) in cases {
            let resolved = client
                .resolve_query(&query(variable, frequency, statistic))
                .unwrap();
            assert_eq!(resolved.variable, expected);
        }
    }

    #[test]
    fn test_stage_mean_and_minimum_rejected() {
        let client = EaufranceClient;
        for statistic in [Statistic::Mean, Statistic::Minimum] {
            let err = client
                .resolve_query(&query(Variable::Stage, Frequency::Daily, Some(statistic)))
                .unwrap_err();
            assert!(matches!(err, ClientError::StageStatistic));
        }
    }

    #[test]
    fn test_time_range_required() {
        let client = EaufranceClient;
        let err = client.resolve_query(&DataQuery::default()).unwrap_err();
        assert!(matches!(err, ClientError::MissingTimeRange { .. }));
    }

    #[test]
    fn test_instantaneous_unsupported() {
        let client = EaufranceClient;
        let err = client
            .resolve_query(&query(Variable::Discharge, Frequency::Instantaneous, None))
            .unwrap_err();
        assert!(err.to_string().contains("instantaneous"));
    }

    #[test]
    fn test_normalize_grandeur() {
        assert_eq!(normalize_grandeur("QmJ"), "QmnJ");
        assert_eq!(normalize_grandeur("QmnJ"), "QmnJ");
        assert_eq!(normalize_grandeur("HIXM"), "HIXM");
    }

    #[test]
    fn test_chunk_windows_short_range_is_one_chunk() {
        let start = parse_time("2020-01-01").unwrap();
        let end = parse_time("2020-12-31").unwrap();
        let windows = chunk_windows(start, end);
        assert_eq!(windows, vec![(start, end)]);
    }

    #[test]
    fn test_chunk_windows_cover_long_range() {
        let start = parse_time("1900-01-01").unwrap();
        let end = parse_time("2020-01-01").unwrap();
        let windows = chunk_windows(start, end);
        assert!(windows.len() > 1);
        assert_eq!(windows.first().unwrap().0, start);
        assert_eq!(windows.last().unwrap().1, end);
        for (chunk_start, chunk_end) in &windows {
            assert!(chunk_start <= chunk_end);
            let records = (chunk_end.date_naive() - chunk_start.date_naive()).num_days() + 1;
            assert!(records <= MAX_RECORDS);
        }
    }

    #[test]
    fn test_chunk_windows_exact_limit_splits() {
        // A window of MAX_RECORDS days spans MAX_RECORDS + 1 inclusive
        // daily records, so it must not fit in one chunk
        let start = parse_time("1900-01-01").unwrap();
        let end = start + Duration::days(MAX_RECORDS);
        let windows = chunk_windows(start, end);
        assert!(windows.len() >= 2);
        assert_eq!(windows.last().unwrap().1, end);
        for (chunk_start, chunk_end) in &windows {
            let records = (chunk_end.date_naive() - chunk_start.date_naive()).num_days() + 1;
            assert!(records <= MAX_RECORDS);
        }
    }

    #[test]
    fn test_clamp_to_station() {
        let mut meta = Table::new([
            "code_station",
            "date_ouverture_station",
            "date_fermeture_station",
        ]);
        meta.push_row(vec![
            "H0203020".to_string(),
            "1990-06-01".to_string(),
            "2005-03-01".to_string(),
        ])
        .unwrap();

        let start = parse_time("1980-01-01").unwrap();
        let end = parse_time("2020-01-01").unwrap();
        let (s, e) = clamp_to_station(Some(&meta), "H0203020", start, end).unwrap();
        assert_eq!(s, parse_time("1990-06-01").unwrap());
        assert_eq!(e, parse_time("2005-03-01").unwrap());

        // Station closed before the requested window
        let late_start = parse_time("2010-01-01").unwrap();
        assert!(clamp_to_station(Some(&meta), "H0203020", late_start, end).is_none());

        // Unknown station and absent metadata leave the window alone
        assert_eq!(
            clamp_to_station(Some(&meta), "XXXXXX", start, end),
            Some((start, end))
        );
        assert_eq!(clamp_to_station(None, "H0203020", start, end), Some((start, end)));
    }

    #[test]
    fn test_api_query_follows_next_links() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = HttpCache::open_at(&tmp.path().join("cache.db")).unwrap();

        let first =
            "https://hubeau.eaufrance.fr/api/v2/hydrometrie/obs_elab?code_entite=H0203020";
        let second =
            "https://hubeau.eaufrance.fr/api/v2/hydrometrie/obs_elab?code_entite=H0203020&cursor=p2";
        cache
            .store(
                first,
                &json!({
                    "count": 3,
                    "data": [{"resultat": 1.0}, {"resultat": 2.0}],
                    "next": second,
                })
                .to_string(),
            )
            .unwrap();
        cache
            .store(
                second,
                &json!({
                    "count": 3,
                    "data": [{"resultat": 3.0}],
                    "next": null,
                })
                .to_string(),
            )
            .unwrap();

        let http = cached_agent(cache);
        let records = EaufranceClient
            .api_query(&http, &OBS_ELAB, &[("code_entite", "H0203020".to_string())])
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["resultat"], 3.0);
    }

    #[test]
    fn test_api_query_rejects_over_limit_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = HttpCache::open_at(&tmp.path().join("cache.db")).unwrap();

        let url = "https://hubeau.eaufrance.fr/api/v2/hydrometrie/obs_elab?code_entite=H0203020";
        cache
            .store(url, &json!({"count": 20001, "data": []}).to_string())
            .unwrap();

        let http = cached_agent(cache);
        let err = EaufranceClient
            .api_query(&http, &OBS_ELAB, &[("code_entite", "H0203020".to_string())])
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::RecordLimit {
                count: 20001,
                limit: 20000
            }
        ));
    }

    #[test]
    fn test_api_query_rejects_unknown_parameter() {
        let http = HttpAgent::new(&Config::default(), None).unwrap();
        let err = EaufranceClient
            .api_query(&http, &OBS_ELAB, &[("code_station", "X".to_string())])
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownParameter { .. }));
    }

    #[test]
    fn test_table_from_records() {
        let records = vec![
            json!({"code_station": "H0203020", "resultat": 12.5, "code_sandre_reseau_station": ["x"]}),
            json!({"code_station": "H0203020", "date_obs_elab": "2020-01-01"}),
        ];
        let table = table_from_records(&records, &["code_sandre_reseau_station"]).unwrap();
        assert_eq!(
            table.columns(),
            ["code_station", "date_obs_elab", "resultat"]
        );
        assert_eq!(table.value(0, "resultat").unwrap(), "12.5");
        assert_eq!(table.value(1, "date_obs_elab").unwrap(), "2020-01-01");
        assert_eq!(table.value(0, "date_obs_elab").unwrap(), "");

        assert!(table_from_records(&[], &[]).is_none());
    }
}
