use std::collections::HashMap;

use chrono::NaiveDate;
use clap::ArgMatches;
use mysql::prelude::*;
use mysql::*;

use super::Analyser;
use crate::importer::CITY_CODE;
use crate::storage;
use crate::types::{DayKind, DayKindPair, ImpactReport, RidershipRecord};
use crate::FnResult;

/// The calculator only replaces stored reports when at least this many
/// classified weather days are available.
pub const MIN_WEATHER_DAYS: usize = 10;

/// Count and sum of the daily totals of one group of days.
#[derive(Clone, Copy, Default)]
struct CountSum {
    count: u32,
    sum: u64,
}

impl CountSum {
    fn add(&mut self, value: u32) {
        self.count += 1;
        self.sum += value as u64;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }
}

/// Recomputes all reports from the stored ridership and weather data. With
/// too few weather days the stored reports are left untouched, a thin data
/// basis must not wipe out an older, better report set.
pub fn run_rain_impact(analyser: &Analyser) -> FnResult<()> {
    let mut conn = analyser.main.pool.get_conn()?;

    let weather = storage::weather_for_city(&mut conn, CITY_CODE)?;
    if weather.len() < MIN_WEATHER_DAYS {
        println!(
            "Only {} classified weather days for {}, need at least {}. Keeping the stored reports.",
            weather.len(),
            CITY_CODE,
            MIN_WEATHER_DAYS
        );
        return Ok(());
    }
    let weather_by_date: HashMap<NaiveDate, bool> = weather
        .iter()
        .map(|day| (day.date, day.is_rainy))
        .collect();

    let records = storage::all_ridership(&mut conn)?;
    let reports = compute_reports(&records, &weather_by_date);

    persist_reports(&mut conn, &reports)?;
    println!(
        "Stored {} rain impact reports, computed from {} ridership records over {} weather days.",
        reports.len(),
        records.len(),
        weather.len()
    );
    Ok(())
}

/// Prints the stored reports, most affected first.
pub fn run_list(analyser: &Analyser, args: &ArgMatches) -> FnResult<()> {
    let mut conn = analyser.main.pool.get_conn()?;
    let reports = if args.get_flag("by-line") {
        storage::line_reports(&mut conn)?
    } else {
        storage::list_reports(&mut conn, args.get_one::<String>("line").map(|line| line.as_str()))?
    };

    if reports.is_empty() {
        println!("No reports stored. Run the rain-impact analysis first.");
        return Ok(());
    }

    println!("line_code; station; rain_impact_index; created_at");
    for report in &reports {
        println!(
            "{}; {}; {:.2}; {}",
            report.line_code,
            report.station_name_std.as_deref().unwrap_or("-"),
            report.rain_impact_index,
            report
                .created_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| String::from("-"))
        );
    }
    Ok(())
}

/// Computes one report per (line, station) from the ridership records that
/// fall on classified weather days. The index is the rainy-day mean of the
/// daily totals as a percentage of the dry-day mean, rounded to two decimal
/// places. Groups that lack rainy days, dry days or any dry traffic yield
/// no report.
fn compute_reports(
    records: &[RidershipRecord],
    weather_by_date: &HashMap<NaiveDate, bool>,
) -> Vec<ImpactReport> {
    let mut groups: HashMap<(String, String), DayKindPair<CountSum>> = HashMap::new();
    for record in records {
        let is_rainy = match weather_by_date.get(&record.date) {
            Some(is_rainy) => *is_rainy,
            None => continue, // no weather for that day, the record can't be classified
        };
        let group = groups
            .entry((record.line_code.clone(), record.station_name_std.clone()))
            .or_default();
        group[DayKind::of(is_rainy)].add(record.total);
    }

    let mut reports: Vec<ImpactReport> = Vec::new();
    for ((line_code, station_name_std), pair) in groups {
        let rainy_mean = match pair[DayKind::Rainy].mean() {
            Some(mean) => mean,
            None => continue,
        };
        let dry_mean = match pair[DayKind::Dry].mean() {
            Some(mean) => mean,
            None => continue,
        };
        if dry_mean <= 0.0 {
            continue;
        }
        reports.push(ImpactReport {
            line_code,
            station_name_std: Some(station_name_std),
            rain_impact_index: (rainy_mean / dry_mean * 100.0 * 100.0).round() / 100.0,
            created_at: None,
        });
    }

    reports.sort_by(|a, b| {
        b.rain_impact_index
            .partial_cmp(&a.rain_impact_index)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.line_code.cmp(&b.line_code))
            .then_with(|| a.station_name_std.cmp(&b.station_name_std))
    });
    reports
}

/// Replaces the stored reports with the given set. The replacement is
/// all-or-nothing, a failed run leaves the previous reports in place.
fn persist_reports(conn: &mut PooledConn, reports: &[ImpactReport]) -> FnResult<()> {
    let mut tx = conn.start_transaction(TxOpts::default())?;
    tx.query_drop(r"DELETE FROM `rain_impact_reports`;")?;
    let statement = tx.prep(
        r"INSERT INTO `rain_impact_reports`
            (`line_code`, `station_name_std`, `rain_impact_index`, `created_at`)
        VALUES
            (:line_code, :station_name_std, :rain_impact_index, NOW());",
    )?;
    for report in reports {
        tx.exec_drop(
            &statement,
            params! {
                "line_code" => report.line_code.clone(),
                "station_name_std" => report.station_name_std.clone().unwrap_or_default(),
                "rain_impact_index" => report.rain_impact_index
            },
        )?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn record(day: u32, line: &str, station: &str, total: u32) -> RidershipRecord {
        RidershipRecord::new(date(day), line.to_string(), station.to_string(), total, 0)
    }

    fn weather(rainy_days: &[u32], dry_days: &[u32]) -> HashMap<NaiveDate, bool> {
        let mut map = HashMap::new();
        for day in rainy_days {
            map.insert(date(*day), true);
        }
        for day in dry_days {
            map.insert(date(*day), false);
        }
        map
    }

    #[test]
    fn test_index_compares_rainy_and_dry_means() {
        let records = vec![
            record(1, "LINE2", "강남", 100),
            record(2, "LINE2", "강남", 200),
            record(3, "LINE2", "강남", 50),
            record(4, "LINE2", "강남", 50),
        ];
        let reports = compute_reports(&records, &weather(&[1, 2], &[3, 4]));

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].line_code, "LINE2");
        assert_eq!(reports[0].station_name_std.as_deref(), Some("강남"));
        assert_eq!(reports[0].rain_impact_index, 300.0);
    }

    #[test]
    fn test_two_weeks_of_stable_traffic() {
        let rainy_days: Vec<u32> = (1..=6).collect();
        let dry_days: Vec<u32> = (7..=12).collect();
        let mut records = Vec::new();
        for day in &rainy_days {
            records.push(record(*day, "LINE2", "강남", 1200));
        }
        for day in &dry_days {
            records.push(record(*day, "LINE2", "강남", 1000));
        }
        let reports = compute_reports(&records, &weather(&rainy_days, &dry_days));

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].rain_impact_index, 120.0);
    }

    #[test]
    fn test_rounding_to_two_decimals() {
        let records = vec![
            record(1, "LINE2", "강남", 100),
            record(2, "LINE2", "강남", 300),
        ];
        let reports = compute_reports(&records, &weather(&[1], &[2]));
        assert_eq!(reports[0].rain_impact_index, 33.33);
    }

    #[test]
    fn test_groups_without_both_day_kinds_are_dropped() {
        let only_rainy = vec![record(1, "LINE2", "강남", 100)];
        assert!(compute_reports(&only_rainy, &weather(&[1], &[])).is_empty());

        let only_dry = vec![record(2, "LINE2", "강남", 100)];
        assert!(compute_reports(&only_dry, &weather(&[], &[2])).is_empty());
    }

    #[test]
    fn test_zero_dry_traffic_yields_no_report() {
        let records = vec![
            record(1, "LINE2", "강남", 100),
            record(2, "LINE2", "강남", 0),
        ];
        assert!(compute_reports(&records, &weather(&[1], &[2])).is_empty());
    }

    #[test]
    fn test_unclassified_days_are_ignored() {
        let records = vec![
            record(1, "LINE2", "강남", 100),
            record(2, "LINE2", "강남", 50),
            record(20, "LINE2", "강남", 99999), // no weather for that day
        ];
        let reports = compute_reports(&records, &weather(&[1], &[2]));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].rain_impact_index, 200.0);
    }

    #[test]
    fn test_reports_are_sorted_most_affected_first() {
        let records = vec![
            record(1, "LINE2", "강남", 100),
            record(2, "LINE2", "강남", 100),
            record(1, "LINE2", "역삼", 300),
            record(2, "LINE2", "역삼", 100),
            record(1, "LINE9", "염창", 100),
            record(2, "LINE9", "염창", 100),
        ];
        let reports = compute_reports(&records, &weather(&[1], &[2]));

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].station_name_std.as_deref(), Some("역삼"));
        assert_eq!(reports[0].rain_impact_index, 300.0);
        // equal indices fall back to line and station order
        assert_eq!(reports[1].line_code, "LINE2");
        assert_eq!(reports[1].station_name_std.as_deref(), Some("강남"));
        assert_eq!(reports[2].line_code, "LINE9");
    }

    #[test]
    fn test_recomputation_is_deterministic() {
        let records = vec![
            record(1, "LINE2", "강남", 123),
            record(2, "LINE2", "강남", 77),
            record(1, "LINE9", "염창", 10),
            record(2, "LINE9", "염창", 30),
        ];
        let map = weather(&[1], &[2]);
        assert_eq!(
            compute_reports(&records, &map),
            compute_reports(&records, &map)
        );
    }
}
