pub mod batch;
mod lost_items;
mod ridership;
mod weather;

use chrono::{Duration, NaiveDate, Utc};
use clap::{value_parser, Arg, ArgMatches, Command};
use serde_json::Value;

use crate::{FnResult, Main};

use lost_items::LostItemImporter;
use ridership::RidershipImporter;
use weather::WeatherImporter;

/// City code that all weather rows and reports are keyed by.
pub const CITY_CODE: &str = "SEOUL";

pub struct Importer<'a> {
    main: &'a Main,
    args: &'a ArgMatches,
    verbose: bool,
}

impl<'a> Importer<'a> {
    pub fn get_subcommand() -> Command {
        Command::new("sync")
            .about("Fetches upstream data and writes it into the database.")
            .subcommand_required(true)
            .subcommand(
                Command::new("ridership")
                    .about("Imports daily subway boarding and alighting counts from the Seoul open data service.")
                    .long_about(
                        "Imports daily subway boarding and alighting counts from the Seoul open data service. \
                        Without further arguments, the most recent days are scanned backwards and the newest \
                        day that has published data is imported. The station dictionary is updated from the \
                        same rows before any counts are written.",
                    )
                    .arg(
                        Arg::new("date")
                            .short('d')
                            .long("date")
                            .value_name("YYYYMMDD")
                            .conflicts_with_all(["from", "to"])
                            .help("Imports exactly this date and fails if the service has no data for it."),
                    )
                    .arg(
                        Arg::new("from")
                            .long("from")
                            .value_name("YYYYMMDD")
                            .requires("to")
                            .help("First date of an inclusive range to import."),
                    )
                    .arg(
                        Arg::new("to")
                            .long("to")
                            .value_name("YYYYMMDD")
                            .requires("from")
                            .help("Last date of an inclusive range to import."),
                    )
                    .arg(
                        Arg::new("days")
                            .long("days")
                            .value_name("COUNT")
                            .default_value("7")
                            .value_parser(value_parser!(u32).range(1..))
                            .conflicts_with_all(["date", "from", "to"])
                            .help("How many days to scan backwards when no explicit date is given."),
                    ),
            )
            .subcommand(
                Command::new("weather")
                    .about("Imports daily weather observations for Seoul from Open-Meteo.")
                    .arg(
                        Arg::new("past-days")
                            .long("past-days")
                            .value_name("COUNT")
                            .default_value("92")
                            .value_parser(value_parser!(u32).range(1..=92))
                            .help("How many past days to request from the weather service."),
                    ),
            )
            .subcommand(
                Command::new("lost-items")
                    .about("Imports lost item records from the Seoul open data service."),
            )
            .subcommand(
                Command::new("lost-items-file")
                    .about("Imports lost item records from a local CSV file.")
                    .long_about(
                        "Imports lost item records from a local CSV file. The file may use either the \
                        canonical English column names or the Korean export headers. Rows are matched \
                        to existing records by item_id, so re-importing the same file is harmless.",
                    )
                    .arg(
                        Arg::new("file")
                            .index(1)
                            .value_name("FILE")
                            .required(true)
                            .help("Path of the CSV file to import."),
                    ),
            )
    }

    pub fn new(main: &'a Main, args: &'a ArgMatches) -> Importer<'a> {
        Importer {
            main,
            args,
            verbose: main.verbose,
        }
    }

    /// Runs the sync stage that is selected via the command line args
    pub fn run(&mut self) -> FnResult<()> {
        match self.args.subcommand() {
            Some(("ridership", sub_args)) => RidershipImporter::new(self, sub_args).run(),
            Some(("weather", sub_args)) => WeatherImporter::new(self, sub_args).run(),
            Some(("lost-items", sub_args)) => LostItemImporter::new(self, sub_args).run_api(),
            Some(("lost-items-file", sub_args)) => LostItemImporter::new(self, sub_args).run_file(),
            _ => panic!("Invalid arguments."),
        }
    }
}

/// Current date in Seoul. KST is UTC+9 without daylight saving, so a fixed
/// offset is all we need.
pub fn seoul_today() -> NaiveDate {
    (Utc::now() + Duration::hours(9)).date_naive()
}

/// Coerces a count field that may arrive as a number, a numeric string or
/// garbage into a non-negative integer. Anything unparseable counts as zero.
pub fn parse_count(value: &Value) -> u32 {
    match value {
        Value::Number(number) => number.as_f64().map(clamp_count).unwrap_or(0),
        Value::String(text) => parse_count_text(text),
        _ => 0,
    }
}

pub fn parse_count_text(text: &str) -> u32 {
    text.trim().parse::<f64>().map(clamp_count).unwrap_or(0)
}

fn clamp_count(value: f64) -> u32 {
    if value > 0.0 {
        value.round() as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(&json!(23152)), 23152);
        assert_eq!(parse_count(&json!("23152")), 23152);
        assert_eq!(parse_count(&json!("23152.0")), 23152);
        assert_eq!(parse_count(&json!(-5)), 0);
        assert_eq!(parse_count(&json!("")), 0);
        assert_eq!(parse_count(&json!("n/a")), 0);
        assert_eq!(parse_count(&json!(null)), 0);
        assert_eq!(parse_count_text(" 42 "), 42);
    }
}
