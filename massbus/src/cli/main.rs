mod console;
mod error;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser, ValueEnum};
use log::{info, LevelFilter};
use massbus::{Config, InMemoryInterface, MassbusInterface, Server};
use simplelog::{ConfigBuilder, LevelPadding, WriteLogger};
use std::fs::File;
use std::io::{self, BufRead};
use std::sync::Arc;
use time::macros::format_description;

use crate::error::CliError;

const BUSES: &str = "bus";
const UNITS: &str = "unit";
const ATTACHMENTS: &str = "attach";
const LOG_PATH: &str = "log-path";
const LOG_LEVEL: &str = "log-level";

/// Possible log levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone, ValueEnum)]
enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
}

fn cli() -> Command {
    // Hack to make the build dirty when the toml changes.
    include_str!("../../Cargo.toml");

    clap::command!()
        .name("mbs")
        .max_term_width(100)
        .after_help("\
This is the MASSBUS server. Each --bus creates a bus, each --unit connects \
a drive to one and each --attach loads an image file into a unit, which \
then comes online unless 'offline' is given. Once running, the server reads \
operator commands from standard input until 'quit' or end of input; type \
'help' for a list.")
        .arg(Arg::new(BUSES)
            .help("A bus to create, as NAME:MODE where MODE is disk, tape \
                   or network (e.g. A:disk).")
            .short('b')
            .long("bus")
            .action(ArgAction::Append)
            .required(true))
        .arg(Arg::new(UNITS)
            .help("A drive to connect, as UNIT=TYPE[,alias=NAME][,serial=N]\
                   [,16bit|18bit] (e.g. A0=RP06,alias=SYS).")
            .short('u')
            .long("unit")
            .action(ArgAction::Append))
        .arg(Arg::new(ATTACHMENTS)
            .help("An image to attach, as UNIT=PATH[,ro][,shared][,offline]. \
                   UNIT may be an alias.")
            .short('a')
            .long("attach")
            .action(ArgAction::Append))
        .arg(Arg::new(LOG_PATH)
            .help("If set, a debug log will be written to the given path.")
            .short('l')
            .long("log")
            .action(ArgAction::Set))
        .arg(Arg::new(LOG_LEVEL)
            .help("Set the log level. Has no effect without \
                   specifying --log as well. Case insensitive.")
            .short('L')
            .long("log-level")
            .action(ArgAction::Set)
            .default_value("INFO")
            .value_parser(value_parser!(LogLevel))
            .ignore_case(true))
}

/// Initialise logging to the given file.
fn init_logging(logfile: File, level: LevelFilter) -> Result<(), CliError> {
    let config = ConfigBuilder::new()
        .set_level_padding(LevelPadding::Right)
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_custom(format_description!(
            "[hour]:[minute]:[second].[subsecond digits:6]"))
        .build();

    WriteLogger::init(level, config, logfile)
        .map_err(|e| CliError(format!("Failed to initialise logging: {}", e)))
}

/// Every value given for a repeatable option.
fn values<'a>(args: &'a ArgMatches, id: &str) -> impl Iterator<Item = &'a str> {
    args.get_many::<String>(id).into_iter().flatten().map(String::as_str)
}

/// Main run function; returns an exit code.
fn run(args: ArgMatches, input: impl BufRead) -> u8 {
    return match _run(args, input) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e.0);
            1
        }
    };

    fn _run(args: ArgMatches, input: impl BufRead) -> Result<(), CliError> {
        // Initialise logging if configured.
        if let Some(log_path) = args.get_one::<String>(LOG_PATH) {
            let logfile = File::create(log_path)
                .map_err(|e| CliError(format!("Failed to create log file: {}", e)))?;
            let level = match args.get_one::<LogLevel>(LOG_LEVEL) {
                Some(LogLevel::TRACE) => LevelFilter::Trace,
                Some(LogLevel::DEBUG) => LevelFilter::Debug,
                Some(LogLevel::INFO) | None => LevelFilter::Info,
                Some(LogLevel::WARN) => LevelFilter::Warn,
            };
            init_logging(logfile, level)?;
        }

        let config = Config::parse(values(&args, BUSES), values(&args, UNITS),
                                   values(&args, ATTACHMENTS))?;

        // Every bus gets a loopback transport.
        let mut server = Server::new();
        server.configure(&config, |spec| {
            Arc::new(InMemoryInterface::new(spec.mode)) as Arc<dyn MassbusInterface>
        })?;
        server.start()?;
        info!("Server running.");

        let mut stdout = io::stdout();
        console::run(&server, input, &mut stdout)?;

        server.stop();
        info!("Server stopped.");
        Ok(())
    }
}

fn main() {
    let args = cli().get_matches();
    std::process::exit(run(args, io::stdin().lock()).into());
}

#[cfg(test)]
mod tests {
    use super::*;

    use ntest::timeout;
    use std::fs;
    use tempfile;

    macro_rules! invoke {
        ($input:expr; $($args:expr),+) => {{
            let args = cli().try_get_matches_from(
                    vec!["mbs".to_string(), $($args.to_string()),*])
                .unwrap();
            run(args, $input.as_bytes())
        }}
    }

    /// A full session: configure, attach, quit.
    #[test]
    #[timeout(5000)]
    fn test_session() {
        let tempdir = tempfile::tempdir().unwrap();
        let image = tempdir.path().join("pack.dsk");
        let log = tempdir.path().join("mbs.log");
        let attach = format!("A0={}", image.display());
        let ret = invoke!("show\nquit\n"; "-b", "A:disk", "-b", "B:tape", "-u", "A0=RP06",
                          "-u", "B0=TU78", "-a", attach, "-l", log.display(), "-L", "debug");
        assert_eq!(ret, 0);
        assert!(fs::metadata(&image).is_ok());
        let log = fs::read_to_string(log).unwrap();
        assert!(log.contains("Server running."), "{}", log);
    }

    /// Configuration errors give a failing exit code.
    #[test]
    #[timeout(5000)]
    fn test_bad_configuration() {
        assert_eq!(invoke!(""; "-b", "A:disk", "-u", "A0=RP99"), 1);
        assert_eq!(invoke!(""; "-b", "A:disk", "-u", "A0=TU78"), 1);
        assert_eq!(invoke!(""; "-b", "A:floppy"), 1);
        assert_eq!(invoke!(""; "-b", "A:disk", "-u", "A0=RP06", "-a", "A1=x.dsk"), 1);
    }

    /// The command line itself is checked by clap.
    #[test]
    fn test_arguments() {
        assert!(cli().try_get_matches_from(vec!["mbs"]).is_err());
        assert!(cli().try_get_matches_from(vec!["mbs", "-b", "A:disk", "-L", "loud"]).is_err());
        let args = cli().try_get_matches_from(vec!["mbs", "-b", "A:disk", "-L", "Trace"]).unwrap();
        assert_eq!(args.get_one::<LogLevel>(LOG_LEVEL), Some(&LogLevel::TRACE));
        let args = cli().try_get_matches_from(vec!["mbs", "-b", "A:disk", "-b", "B:tape"]).unwrap();
        assert_eq!(values(&args, BUSES).collect::<Vec<_>>(), vec!["A:disk", "B:tape"]);
        assert_eq!(values(&args, UNITS).count(), 0);
    }
}
