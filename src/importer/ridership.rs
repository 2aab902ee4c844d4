use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use clap::ArgMatches;
use itertools::Itertools;
use mysql::*;
use serde::Deserialize;
use serde_json::Value;
use simple_error::bail;

use super::{parse_count, seoul_today, Importer};
use crate::dictionary::StationDictionary;
use crate::fetch::{self, ApiRows};
use crate::importer::batch::BatchedUpsert;
use crate::types::{BatchSummary, RidershipRecord, RowOutcome};
use crate::{parse_compact_date, storage, FnResult, OrError};

const API_SERVICE: &str = "CardSubwayStatsNew";

/// The service's per-call maximum. One day has around 600 station/line rows,
/// so a single page always covers it.
const API_PAGE_SIZE: u32 = 1000;

const UPDATE_RIDERSHIP: &str = r"UPDATE `ridership_daily`
    SET
        `boardings` = :boardings,
        `alightings` = :alightings,
        `total` = :total
    WHERE
        `date` = :date AND
        `line_code` = :line_code AND
        `station_name_std` = :station_name_std;";

const INSERT_RIDERSHIP: &str = r"INSERT IGNORE INTO `ridership_daily`
        (`date`, `line_code`, `station_name_std`, `boardings`, `alightings`, `total`)
    VALUES
        (:date, :line_code, :station_name_std, :boardings, :alightings, :total);";

/// One raw row of the daily ridership service. The upstream renamed every
/// field at some point, so both generations are accepted.
#[derive(Debug, Deserialize)]
struct RawRidershipRow {
    #[serde(default, rename = "USE_YMD", alias = "USE_DT")]
    date: String,
    #[serde(default, rename = "SBWY_ROUT_LN_NM", alias = "LINE_NUM")]
    line: String,
    #[serde(default, rename = "SBWY_STNS_NM", alias = "SUB_STA_NM")]
    station: String,
    #[serde(default, rename = "GTON_TNOPE", alias = "RIDE_PASGR_NUM")]
    boardings: Value,
    #[serde(default, rename = "GTOFF_TNOPE", alias = "ALIGHT_PASGR_NUM")]
    alightings: Value,
}

/// The merged per-station records of one day, together with how many raw
/// rows went into each of them.
struct DayAggregate {
    records: HashMap<(String, String), RidershipRecord>,
    contributions: HashMap<(String, String), u32>,
}

pub struct RidershipImporter<'a> {
    importer: &'a Importer<'a>,
    args: &'a ArgMatches,
}

impl<'a> RidershipImporter<'a> {
    pub fn new(importer: &'a Importer<'a>, args: &'a ArgMatches) -> RidershipImporter<'a> {
        RidershipImporter { importer, args }
    }

    pub fn run(&self) -> FnResult<()> {
        if let Some(date_text) = self.args.get_one::<String>("date") {
            return self.run_explicit_date(date_text);
        }
        if let Some(from_text) = self.args.get_one::<String>("from") {
            let to_text = self.args.get_one::<String>("to").unwrap(); // clap enforces the pairing
            return self.run_range(from_text, to_text);
        }
        self.run_backscan()
    }

    /// Imports exactly one date. A day without published data is an error
    /// here, because the caller asked for this date and nothing else.
    fn run_explicit_date(&self, date_text: &str) -> FnResult<()> {
        let date = parse_compact_date(date_text)?;
        match self.ingest_day(date)? {
            Some(summary) => {
                println!("Ridership for {}: {}.", date.format("%Y-%m-%d"), summary);
                Ok(())
            }
            None => bail!(
                "The ridership service has no data for {}.",
                date.format("%Y-%m-%d")
            ),
        }
    }

    /// Imports every date of an inclusive range. Days without data are
    /// reported and skipped, since ranges commonly reach into the service's
    /// publication lag.
    fn run_range(&self, from_text: &str, to_text: &str) -> FnResult<()> {
        let from = parse_compact_date(from_text)?;
        let to = parse_compact_date(to_text)?;
        if from > to {
            bail!("The --from date must not be after the --to date.");
        }

        let mut totals = BatchSummary::new();
        let mut days_with_data = 0;
        let mut date = from;
        while date <= to {
            match self.ingest_day(date)? {
                Some(summary) => {
                    println!("Ridership for {}: {}.", date.format("%Y-%m-%d"), summary);
                    totals.merge(&summary);
                    days_with_data += 1;
                }
                None => eprintln!(
                    "No ridership data for {}, skipping.",
                    date.format("%Y-%m-%d")
                ),
            }
            date = date.succ_opt().or_error("Date out of range")?;
        }

        if days_with_data == 0 {
            bail!("The ridership service has no data anywhere in the given range.");
        }
        println!("Imported {} days in total: {}.", days_with_data, totals);
        Ok(())
    }

    /// Scans backwards from yesterday and imports the most recent day that
    /// has published data. The service usually lags a few days behind.
    fn run_backscan(&self) -> FnResult<()> {
        let days = *self.args.get_one::<u32>("days").unwrap(); // has a default
        let today = seoul_today();
        for offset in 1..=days {
            let date = today - Duration::days(offset as i64);
            if let Some(summary) = self.ingest_day(date)? {
                println!("Ridership for {}: {}.", date.format("%Y-%m-%d"), summary);
                return Ok(());
            }
            eprintln!(
                "No ridership data for {} yet, trying the day before.",
                date.format("%Y-%m-%d")
            );
        }
        bail!("No ridership data found within the last {} days.", days);
    }

    /// Imports one day worth of ridership rows. Returns None if the service
    /// has no data for that date.
    fn ingest_day(&self, date: NaiveDate) -> FnResult<Option<BatchSummary>> {
        let main = self.importer.main;
        let url = format!(
            "http://openapi.seoul.go.kr:8088/{}/json/{}/1/{}/{}",
            main.api_key,
            API_SERVICE,
            API_PAGE_SIZE,
            date.format("%Y%m%d")
        );
        let body = fetch::fetch_json(&main.agent, &url, self.importer.verbose)?;

        let mut summary = BatchSummary::new();
        let raw_rows = match fetch::api_rows(&body, API_SERVICE) {
            ApiRows::Rows(rows) => decode_rows(rows, &mut summary),
            ApiRows::NoData(message) => {
                if self.importer.verbose {
                    println!(
                        "Service answered without rows for {}: {}",
                        date.format("%Y-%m-%d"),
                        message
                    );
                }
                return Ok(None);
            }
        };

        // The dictionary pass commits on its own before any aggregation, so
        // identities survive even if the count batch fails later on.
        let mut conn = main.pool.get_conn()?;
        let mut dictionary = StationDictionary::load(&mut conn)?;
        let known_identities = dictionary.len();
        for raw in &raw_rows {
            if raw.station.trim().is_empty() || raw.line.trim().is_empty() {
                continue; // tallied as a skip in the aggregation pass
            }
            dictionary.upsert_identity(&raw.station, &raw.line);
        }
        dictionary.recompute_transfer_flags();
        dictionary.persist(main.pool.get_conn()?)?;
        if self.importer.verbose {
            println!(
                "Station dictionary holds {} identities ({} new).",
                dictionary.len(),
                dictionary.len() - known_identities
            );
        }

        let aggregate = aggregate_rows(&raw_rows, &dictionary, &mut summary);

        let date_string = date.format("%Y-%m-%d").to_string();
        let existing = storage::ridership_keys_for_date(&mut conn, &date_string)?;
        let mut batch = BatchedUpsert::new(
            "ridership",
            main.pool.get_conn()?,
            &[UPDATE_RIDERSHIP, INSERT_RIDERSHIP],
        )?;
        for (key, record) in aggregate
            .records
            .iter()
            .sorted_by_key(|(key, _)| (*key).clone())
        {
            let outcome = if existing.contains(key) {
                RowOutcome::Updated
            } else {
                RowOutcome::Added
            };
            for _ in 0..aggregate.contributions[key] {
                summary.record(outcome);
            }
            batch.add_parameter_set(Params::from(params! {
                "date" => record.date.format("%Y-%m-%d").to_string(),
                "line_code" => record.line_code.clone(),
                "station_name_std" => record.station_name_std.clone(),
                "boardings" => record.boardings,
                "alightings" => record.alightings,
                "total" => record.total
            }));
        }
        batch.write_to_database()?;

        Ok(Some(summary))
    }
}

fn decode_rows(rows: &[Value], summary: &mut BatchSummary) -> Vec<RawRidershipRow> {
    let mut raw_rows = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value::<RawRidershipRow>(row.clone()) {
            Ok(raw) => raw_rows.push(raw),
            Err(e) => {
                eprintln!("Skipping unreadable ridership row: {}", e);
                summary.record(RowOutcome::SkippedMissingField);
            }
        }
    }
    raw_rows
}

/// Resolves and merges raw rows into per-(line, station) records. Raw rows
/// that normalize onto the same canonical key are summed, so re-ingesting
/// the same source rows reproduces identical records.
fn aggregate_rows(
    raw_rows: &[RawRidershipRow],
    dictionary: &StationDictionary,
    summary: &mut BatchSummary,
) -> DayAggregate {
    let mut records: HashMap<(String, String), RidershipRecord> = HashMap::new();
    let mut contributions: HashMap<(String, String), u32> = HashMap::new();

    for raw in raw_rows {
        let station_raw = raw.station.trim();
        let line_raw = raw.line.trim();
        if station_raw.is_empty() || line_raw.is_empty() || raw.date.trim().is_empty() {
            summary.record(RowOutcome::SkippedMissingField);
            continue;
        }
        let identity = match dictionary.resolve(station_raw, line_raw) {
            Some(identity) => identity,
            None => {
                eprintln!(
                    "No station identity for {} / {}, skipping.",
                    station_raw, line_raw
                );
                summary.record(RowOutcome::SkippedUnresolvedStation);
                continue;
            }
        };
        let row_date = match NaiveDate::parse_from_str(raw.date.trim(), "%Y%m%d") {
            Ok(row_date) => row_date,
            Err(_) => {
                eprintln!("Unreadable date {:?} in ridership row, skipping.", raw.date);
                summary.record(RowOutcome::SkippedMalformedDate);
                continue;
            }
        };
        let boardings = parse_count(&raw.boardings);
        let alightings = parse_count(&raw.alightings);

        let key = (
            identity.line_code.clone(),
            identity.station_name_std.clone(),
        );
        records
            .entry(key.clone())
            .and_modify(|record| {
                record.boardings += boardings;
                record.alightings += alightings;
                record.total = record.boardings + record.alightings;
            })
            .or_insert_with(|| {
                RidershipRecord::new(
                    row_date,
                    identity.line_code.clone(),
                    identity.station_name_std.clone(),
                    boardings,
                    alightings,
                )
            });
        *contributions.entry(key).or_insert(0) += 1;
    }

    DayAggregate {
        records,
        contributions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(date: &str, line: &str, station: &str, boardings: Value, alightings: Value) -> RawRidershipRow {
        RawRidershipRow {
            date: date.to_string(),
            line: line.to_string(),
            station: station.to_string(),
            boardings,
            alightings,
        }
    }

    fn dictionary_for(rows: &[RawRidershipRow]) -> StationDictionary {
        let mut dictionary = StationDictionary::new();
        for row in rows {
            if !row.station.trim().is_empty() && !row.line.trim().is_empty() {
                dictionary.upsert_identity(&row.station, &row.line);
            }
        }
        dictionary.recompute_transfer_flags();
        dictionary
    }

    #[test]
    fn test_decodes_both_field_generations() {
        let current: RawRidershipRow = serde_json::from_value(json!({
            "USE_YMD": "20240105",
            "SBWY_ROUT_LN_NM": "2호선",
            "SBWY_STNS_NM": "강남",
            "GTON_TNOPE": "23152",
            "GTOFF_TNOPE": 22907
        }))
        .unwrap();
        assert_eq!(current.date, "20240105");
        assert_eq!(current.line, "2호선");
        assert_eq!(current.station, "강남");
        assert_eq!(parse_count(&current.boardings), 23152);
        assert_eq!(parse_count(&current.alightings), 22907);

        let legacy: RawRidershipRow = serde_json::from_value(json!({
            "USE_DT": "20200105",
            "LINE_NUM": "9호선",
            "SUB_STA_NM": "염창",
            "RIDE_PASGR_NUM": "10110.0",
            "ALIGHT_PASGR_NUM": "n/a"
        }))
        .unwrap();
        assert_eq!(legacy.date, "20200105");
        assert_eq!(legacy.line, "9호선");
        assert_eq!(parse_count(&legacy.boardings), 10110);
        assert_eq!(parse_count(&legacy.alightings), 0);
    }

    #[test]
    fn test_missing_fields_decode_to_defaults() {
        let row: RawRidershipRow = serde_json::from_value(json!({ "JOB_YMD": "20240106" })).unwrap();
        assert_eq!(row.date, "");
        assert_eq!(row.line, "");
        assert_eq!(row.station, "");
        assert_eq!(parse_count(&row.boardings), 0);
    }

    #[test]
    fn test_aggregate_merges_canonical_duplicates() {
        let rows = vec![
            raw("20240105", "2호선", "서울역(1호선)", json!("100"), json!("200")),
            raw("20240105", "2호선", "서울역", json!(50), json!(50)),
            raw("20240105", "9호선", "염창", json!("10"), json!("20")),
        ];
        let dictionary = dictionary_for(&rows);
        let mut summary = BatchSummary::new();
        let aggregate = aggregate_rows(&rows, &dictionary, &mut summary);

        assert_eq!(aggregate.records.len(), 2);
        let merged = &aggregate.records[&("LINE2".to_string(), "서울역".to_string())];
        assert_eq!(merged.boardings, 150);
        assert_eq!(merged.alightings, 250);
        assert_eq!(merged.total, 400);
        assert_eq!(
            aggregate.contributions[&("LINE2".to_string(), "서울역".to_string())],
            2
        );
        assert_eq!(summary.skipped(), 0);

        // aggregating the same source rows again reproduces identical records
        let again = aggregate_rows(&rows, &dictionary, &mut BatchSummary::new());
        assert_eq!(again.records, aggregate.records);
    }

    #[test]
    fn test_aggregate_skips_malformed_rows() {
        let rows = vec![
            raw("20240105", "2호선", "", json!("100"), json!("200")),
            raw("borken", "2호선", "강남", json!("100"), json!("200")),
            raw("20240105", "2호선", "강남", json!("1"), json!("2")),
        ];
        let dictionary = dictionary_for(&rows);
        let mut summary = BatchSummary::new();
        let aggregate = aggregate_rows(&rows, &dictionary, &mut summary);

        assert_eq!(aggregate.records.len(), 1);
        assert_eq!(summary.skipped_missing_field, 1);
        assert_eq!(summary.skipped_malformed_date, 1);
    }

    #[test]
    fn test_aggregate_skips_unresolved_stations() {
        let rows = vec![raw("20240105", "2호선", "강남", json!(1), json!(2))];
        let empty_dictionary = StationDictionary::new();
        let mut summary = BatchSummary::new();
        let aggregate = aggregate_rows(&rows, &empty_dictionary, &mut summary);

        assert!(aggregate.records.is_empty());
        assert_eq!(summary.skipped_unresolved_station, 1);
    }
}
