use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

/// Sends a spreadsheet of addresses to the geocoding service and saves the
/// enriched workbook it returns.
#[derive(Debug, Parser)]
#[command(name = "geocoder", version, about)]
pub struct Cli {
    /// Spreadsheet to process (.xlsx, .xls or .xlsm).
    pub file: PathBuf,

    /// Base URL of the geocoding service.
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Use the one-shot endpoint instead of the event stream.
    #[arg(long)]
    pub one_shot: bool,

    /// Only geocode rows in this province.
    #[arg(long)]
    pub province: Option<String>,

    /// Only geocode rows in this municipality.
    #[arg(long)]
    pub municipality: Option<String>,

    /// Directory the result is saved into.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// RON file with defaults for the options above.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write the diagnostic log to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Print only the final summary.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "geocoder",
            "direcciones.xlsx",
            "--one-shot",
            "--province",
            "Madrid",
            "-o",
            "out",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.file, PathBuf::from("direcciones.xlsx"));
        assert!(cli.one_shot);
        assert_eq!(cli.province.as_deref(), Some("Madrid"));
        assert_eq!(cli.municipality, None);
        assert_eq!(cli.output, Some(PathBuf::from("out")));
        assert_eq!(LevelFilter::from(cli.log_level), LevelFilter::Debug);
        assert!(!cli.quiet);
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["geocoder"]).is_err());
    }
}
