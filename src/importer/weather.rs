use chrono::NaiveDate;
use clap::ArgMatches;
use mysql::*;
use serde::Deserialize;
use simple_error::bail;

use super::{seoul_today, Importer, CITY_CODE};
use crate::fetch;
use crate::importer::batch::BatchedUpsert;
use crate::types::{BatchSummary, RowOutcome, WeatherDay};
use crate::{storage, FnResult};

// Open-Meteo grid point for central Seoul, served by the KMA model.
const LATITUDE: f32 = 37.56;
const LONGITUDE: f32 = 127.0;

const UPDATE_WEATHER: &str = r"UPDATE `weather_daily`
    SET
        `is_rainy` = :is_rainy,
        `rain_mm` = :rain_mm,
        `avg_temp` = :avg_temp
    WHERE
        `date` = :date AND
        `city_code` = :city_code;";

const INSERT_WEATHER: &str = r"INSERT IGNORE INTO `weather_daily`
        (`date`, `city_code`, `is_rainy`, `rain_mm`, `avg_temp`)
    VALUES
        (:date, :city_code, :is_rainy, :rain_mm, :avg_temp);";

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    daily: DailySeries,
}

/// The parallel arrays of the Open-Meteo "daily" block. Individual readings
/// may be null, and whole arrays may be missing from the response.
#[derive(Debug, Deserialize)]
struct DailySeries {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f32>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f32>>,
    #[serde(default)]
    rain_sum: Vec<Option<f32>>,
}

pub struct WeatherImporter<'a> {
    importer: &'a Importer<'a>,
    args: &'a ArgMatches,
}

impl<'a> WeatherImporter<'a> {
    pub fn new(importer: &'a Importer<'a>, args: &'a ArgMatches) -> WeatherImporter<'a> {
        WeatherImporter { importer, args }
    }

    pub fn run(&self) -> FnResult<()> {
        let main = self.importer.main;
        let past_days = *self.args.get_one::<u32>("past-days").unwrap(); // has a default
        let url = format!(
            "https://api.open-meteo.com/v1/forecast?latitude={}&longitude={}\
            &daily=weather_code,temperature_2m_max,temperature_2m_min,rain_sum\
            &models=kma_seamless&timezone=Asia%2FSeoul&past_days={}&forecast_days=1",
            LATITUDE, LONGITUDE, past_days
        );
        let body = fetch::fetch_json(&main.agent, &url, self.importer.verbose)?;
        let response: OpenMeteoResponse = serde_json::from_value(body)?;

        let mut summary = BatchSummary::new();
        let days = observation_days(&response.daily, seoul_today(), &mut summary);
        if days.is_empty() {
            bail!("The weather service sent no usable observation days.");
        }
        if self.importer.verbose {
            println!(
                "{} of {} observation days were rainy.",
                days.iter().filter(|day| day.is_rainy).count(),
                days.len()
            );
        }

        let mut conn = main.pool.get_conn()?;
        let known_dates = storage::weather_dates(&mut conn, CITY_CODE)?;
        let mut batch = BatchedUpsert::new(
            "weather",
            main.pool.get_conn()?,
            &[UPDATE_WEATHER, INSERT_WEATHER],
        )?;
        for day in &days {
            let date_string = day.date.format("%Y-%m-%d").to_string();
            summary.record(if known_dates.contains(&date_string) {
                RowOutcome::Updated
            } else {
                RowOutcome::Added
            });
            batch.add_parameter_set(Params::from(params! {
                "date" => date_string,
                "city_code" => day.city_code.clone(),
                "is_rainy" => day.is_rainy,
                "rain_mm" => day.rain_mm,
                "avg_temp" => day.avg_temp
            }));
        }
        batch.write_to_database()?;

        println!("Weather for {}: {}.", CITY_CODE, summary);
        Ok(())
    }
}

/// Turns the parallel arrays into one WeatherDay per past date. Dates after
/// `today` come from the forecast part of the response and are dropped,
/// only observed days belong in the database.
fn observation_days(
    series: &DailySeries,
    today: NaiveDate,
    summary: &mut BatchSummary,
) -> Vec<WeatherDay> {
    let mut days = Vec::with_capacity(series.time.len());
    for (index, date_text) in series.time.iter().enumerate() {
        let date = match NaiveDate::parse_from_str(date_text, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => {
                eprintln!(
                    "Unreadable date {:?} in weather response, skipping.",
                    date_text
                );
                summary.record(RowOutcome::SkippedMalformedDate);
                continue;
            }
        };
        if date > today {
            continue;
        }
        days.push(WeatherDay::from_observation(
            date,
            CITY_CODE,
            value_at(&series.rain_sum, index),
            value_at(&series.temperature_2m_max, index),
            value_at(&series.temperature_2m_min, index),
        ));
    }
    days
}

fn value_at(series: &[Option<f32>], index: usize) -> Option<f32> {
    series.get(index).copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observation_days_drop_forecast_rows() {
        let response: OpenMeteoResponse = serde_json::from_value(json!({
            "daily": {
                "time": ["2024-01-02", "2024-01-03", "2024-01-04"],
                "temperature_2m_max": [3.1, null, 5.0],
                "temperature_2m_min": [-2.3, -4.0, 0.0],
                "rain_sum": [5.5, null, 1.0]
            }
        }))
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let mut summary = BatchSummary::new();
        let days = observation_days(&response.daily, today, &mut summary);

        assert_eq!(days.len(), 2);
        assert!(days[0].is_rainy);
        assert_eq!(days[0].rain_mm, 5.5);
        assert_eq!(days[0].avg_temp, Some((3.1 + -2.3) / 2.0));
        assert!(!days[1].is_rainy);
        assert_eq!(days[1].rain_mm, 0.0);
        assert_eq!(days[1].avg_temp, None);
        assert_eq!(summary.skipped(), 0);
    }

    #[test]
    fn test_observation_days_survive_missing_arrays() {
        let series: DailySeries = serde_json::from_value(json!({
            "time": ["2024-01-02", "not a date"]
        }))
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let mut summary = BatchSummary::new();
        let days = observation_days(&series, today, &mut summary);

        assert_eq!(days.len(), 1);
        assert!(!days[0].is_rainy);
        assert_eq!(days[0].avg_temp, None);
        assert_eq!(summary.skipped_malformed_date, 1);
    }
}
