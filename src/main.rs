#[macro_use]
extern crate lazy_static;

mod analyser;
mod dictionary;
mod fetch;
mod importer;
mod names;
mod storage;
mod types;

use std::error::Error;
use std::fmt;
use std::process;

use chrono::NaiveDate;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mysql::*;
use simple_error::SimpleError;

use analyser::Analyser;
use importer::Importer;

pub type FnResult<R> = std::result::Result<R, Box<dyn Error>>;

/// Converts Option or Result values into FnResults, attaching a message
/// that tells what went wrong.
pub trait OrError<T> {
    fn or_error(self, message: &str) -> FnResult<T>;
}

impl<T> OrError<T> for Option<T> {
    fn or_error(self, message: &str) -> FnResult<T> {
        match self {
            Some(value) => Ok(value),
            None => Err(Box::new(SimpleError::new(message))),
        }
    }
}

impl<T, E: fmt::Display> OrError<T> for std::result::Result<T, E> {
    fn or_error(self, message: &str) -> FnResult<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(Box::new(SimpleError::new(format!("{}: {}", message, e)))),
        }
    }
}

/// Error for broken configuration. Kept as its own type so that main can
/// exit with a different code than for runtime failures.
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: String) -> ConfigError {
        ConfigError { message }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}", self.message)
    }
}

impl Error for ConfigError {}

/// Parses the compact YYYYMMDD date format the Seoul services use in their
/// URLs and arguments.
pub fn parse_compact_date(text: &str) -> FnResult<NaiveDate> {
    match NaiveDate::parse_from_str(text.trim(), "%Y%m%d") {
        Ok(date) => Ok(date),
        Err(_) => Err(Box::new(ConfigError::new(format!(
            "Not a valid YYYYMMDD date: {}",
            text
        )))),
    }
}

pub struct Main {
    pub pool: Pool,
    pub args: ArgMatches,
    pub verbose: bool,
    pub api_key: String,
    pub agent: ureq::Agent,
}

fn main() {
    let instance = match Main::new() {
        Ok(instance) => instance,
        Err(e) => exit_with_error(e),
    };
    if let Err(e) = instance.run() {
        exit_with_error(e);
    }
}

fn exit_with_error(error: Box<dyn Error>) -> ! {
    eprintln!("Error: {}", error);
    if error.downcast_ref::<ConfigError>().is_some() {
        process::exit(2);
    }
    process::exit(1);
}

impl Main {
    /// Gets the command line arguments and opens the database pool that all
    /// stages share.
    fn new() -> FnResult<Main> {
        let args = Main::get_main_args().get_matches();
        let verbose = args.get_flag("verbose");
        let api_key = args.get_one::<String>("api-key").unwrap().clone(); // has a default
        let pool = Main::open_pool(&args)?;
        Ok(Main {
            pool,
            args,
            verbose,
            api_key,
            agent: fetch::default_agent(),
        })
    }

    /// Runs the subcommand that is selected via the command line args
    fn run(&self) -> FnResult<()> {
        storage::ensure_schema(&mut self.pool.get_conn()?)?;
        match self.args.subcommand() {
            Some(("sync", sub_args)) => Importer::new(self, sub_args).run(),
            Some(("analyse", sub_args)) => Analyser::new(self, sub_args).run(),
            _ => panic!("Invalid arguments."),
        }
    }

    fn get_main_args() -> Command {
        Command::new("pickuplog")
            .about("Collects Seoul subway lost item, ridership and weather data and computes rain impact statistics.")
            .subcommand_required(true)
            .subcommand(Importer::get_subcommand())
            .subcommand(Analyser::get_subcommand())
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::SetTrue)
                    .global(true)
                    .help("Prints more progress information."),
            )
            .arg(
                Arg::new("host")
                    .long("host")
                    .env("DB_HOST")
                    .value_name("HOST")
                    .default_value("localhost")
                    .help("Host of the database server."),
            )
            .arg(
                Arg::new("port")
                    .long("port")
                    .env("DB_PORT")
                    .value_name("PORT")
                    .default_value("3306")
                    .value_parser(value_parser!(u16))
                    .help("Port of the database server."),
            )
            .arg(
                Arg::new("user")
                    .long("user")
                    .env("DB_USER")
                    .value_name("USER")
                    .default_value("root")
                    .help("User for the database server."),
            )
            .arg(
                Arg::new("password")
                    .long("password")
                    .env("DB_PASSWORD")
                    .value_name("PASSWORD")
                    .default_value("")
                    .help("Password for the database server."),
            )
            .arg(
                Arg::new("database")
                    .long("database")
                    .env("DB_DATABASE")
                    .value_name("DATABASE")
                    .default_value("pickuplog")
                    .help("Name of the database."),
            )
            .arg(
                Arg::new("api-key")
                    .long("api-key")
                    .env("SEOUL_API_KEY")
                    .value_name("KEY")
                    .default_value("sample")
                    .help("Authentication key for the Seoul open data services."),
            )
    }

    /// A connection that can't be opened counts as a configuration problem,
    /// the coordinates are checked before any stage starts working.
    fn open_pool(args: &ArgMatches) -> FnResult<Pool> {
        let builder = OptsBuilder::new()
            .ip_or_hostname(args.get_one::<String>("host").cloned())
            .tcp_port(*args.get_one::<u16>("port").unwrap()) // has a default
            .user(args.get_one::<String>("user").cloned())
            .pass(args.get_one::<String>("password").cloned())
            .db_name(args.get_one::<String>("database").cloned());
        match Pool::new(builder) {
            Ok(pool) => Ok(pool),
            Err(e) => Err(Box::new(ConfigError::new(format!(
                "Could not open a database connection with the given coordinates: {}",
                e
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_date() {
        assert_eq!(
            parse_compact_date("20240105").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
        assert_eq!(
            parse_compact_date(" 20240105 ").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
        assert!(parse_compact_date("2024-01-05").is_err());
        assert!(parse_compact_date("20241332").is_err());
        let error = parse_compact_date("borken").unwrap_err();
        assert!(error.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_or_error_messages() {
        let missing: Option<u32> = None;
        let error = missing.or_error("it is missing").unwrap_err();
        assert_eq!(error.to_string(), "it is missing");
        assert_eq!(Some(5).or_error("unused").unwrap(), 5);

        let failed: std::result::Result<u32, String> = Err("inner".to_string());
        let error = failed.or_error("outer").unwrap_err();
        assert_eq!(error.to_string(), "outer: inner");
    }
}
