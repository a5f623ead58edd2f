//! Parsing Options.
//! `--command {action}` or `-k` selects `analyze`, `simulate` or `all`.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("malformed flags: {0}")]
    Shellwords(#[from] shellwords::MismatchedQuotes),
    #[error(transparent)]
    Clap(#[from] clap::Error),
    #[error("unsupported command {0:?}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    Analyze,
    Simulate,
    #[default]
    All,
}

impl Action {
    pub fn analyzes(self) -> bool {
        matches!(self, Action::Analyze | Action::All)
    }

    pub fn simulates(self) -> bool {
        matches!(self, Action::Simulate | Action::All)
    }
}

fn make_options_parser() -> Command {
    Command::new("pn-sim")
        .no_binary_name(true)
        .args_override_self(true)
        .version("v0.1.0")
        .about("Petri net simulator and structural analyzer")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Net snapshot (.json or .ron)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Engine configuration (TOML)")
                .default_value("pn-sim.toml"),
        )
        .arg(
            Arg::new("command")
                .short('k')
                .long("command")
                .help("What to run")
                .default_value("all")
                .value_parser(["analyze", "simulate", "all"]),
        )
        .arg(
            Arg::new("ticks")
                .short('t')
                .long("ticks")
                .help("Number of simulation ticks")
                .default_value("200")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Path to file where the analysis report will be stored"),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .help("Write the net as Graphviz dot"),
        )
        .arg(
            Arg::new("lenient")
                .long("lenient")
                .action(ArgAction::SetTrue)
                .help("Skip malformed snapshot elements instead of failing"),
        )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub action: Action,
    pub input: Option<PathBuf>,
    pub config: PathBuf,
    pub ticks: usize,
    pub output: Option<PathBuf>,
    pub dot: Option<PathBuf>,
    pub lenient: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            action: Action::All,
            input: None,
            config: PathBuf::from("pn-sim.toml"),
            ticks: 200,
            output: None,
            dot: None,
            lenient: false,
        }
    }
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, OptionsError> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, OptionsError> {
        let matches = make_options_parser().try_get_matches_from(flags.iter())?;
        let action = match matches.get_one::<String>("command").map(String::as_str) {
            Some("analyze") => Action::Analyze,
            Some("simulate") => Action::Simulate,
            Some("all") | None => Action::All,
            Some(other) => return Err(OptionsError::UnsupportedCommand(other.to_string())),
        };
        let path = |id: &str| matches.get_one::<String>(id).map(PathBuf::from);

        Ok(Options {
            action,
            input: path("input"),
            config: path("config").unwrap_or_else(|| PathBuf::from("pn-sim.toml")),
            ticks: matches.get_one::<usize>("ticks").copied().unwrap_or(200),
            output: path("output"),
            dot: path("dot"),
            lenient: matches.get_flag("lenient"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::parse_from_args(&[]).unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_parse_from_str() {
        let options =
            Options::parse_from_str("-i 'nets/my net.json' -k simulate -t 50 --lenient").unwrap();
        assert_eq!(options.input, Some(PathBuf::from("nets/my net.json")));
        assert_eq!(options.action, Action::Simulate);
        assert_eq!(options.ticks, 50);
        assert!(options.lenient);
        assert!(!options.action.analyzes());
    }

    #[test]
    fn test_later_flags_win() {
        let options = Options::parse_from_str("-t 5 -t 7").unwrap();
        assert_eq!(options.ticks, 7);
    }

    #[test]
    fn test_parse_from_str_err() {
        assert!(Options::parse_from_str("-k unknown").is_err());
        assert!(Options::parse_from_str("-i 'unterminated").is_err());
        assert!(Options::parse_from_str("-t many").is_err());
    }
}
