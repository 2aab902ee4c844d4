mod rain_impact;

use clap::{Arg, ArgAction, ArgMatches, Command};

use rain_impact::{run_list, run_rain_impact};

use crate::FnResult;
use crate::Main;

pub struct Analyser<'a> {
    main: &'a Main,
    args: &'a ArgMatches,
}

impl<'a> Analyser<'a> {
    pub fn get_subcommand() -> Command {
        Command::new("analyse")
            .about("Computes and lists rain impact statistics from the imported data.")
            .subcommand_required(true)
            .subcommand(
                Command::new("rain-impact")
                    .about("Recomputes the rain impact index for every line and station.")
                    .long_about(
                        "Recomputes the rain impact index for every line and station and replaces \
                        the stored reports with the result. Ridership records are split into rainy \
                        and dry days using the imported weather, and the index compares the mean \
                        daily traffic of the two groups.",
                    ),
            )
            .subcommand(
                Command::new("list")
                    .about("Prints the stored rain impact reports.")
                    .arg(
                        Arg::new("line")
                            .short('l')
                            .long("line")
                            .value_name("LINE_CODE")
                            .help("Only prints reports of this line, e.g. LINE2."),
                    )
                    .arg(
                        Arg::new("by-line")
                            .long("by-line")
                            .action(ArgAction::SetTrue)
                            .conflicts_with("line")
                            .help("Prints one averaged report per line instead of one per station."),
                    ),
            )
    }

    pub fn new(main: &'a Main, args: &'a ArgMatches) -> Analyser<'a> {
        Analyser { main, args }
    }

    /// Runs the analysis that is selected via the command line args
    pub fn run(&mut self) -> FnResult<()> {
        match self.args.subcommand() {
            Some(("rain-impact", _sub_args)) => run_rain_impact(self),
            Some(("list", sub_args)) => run_list(self, sub_args),
            _ => panic!("Invalid arguments."),
        }
    }
}
