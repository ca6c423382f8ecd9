use crate::history::{HistoryConfig, ReadFailurePolicy, DEFAULT_HISTORY_SIZE};
use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};

pub const ARG_HISTORY_SIZE: &str = "history-size";
pub const ARG_READ_FAILURE: &str = "read-failure";
pub const ARG_CHECK_AND_SET: &str = "check-and-set";

fn validator_read_failure() -> ValueParser {
    ValueParser::from(|value: &str| value.parse::<ReadFailurePolicy>())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HISTORY_SIZE)
                .long(ARG_HISTORY_SIZE)
                .help("Number of previous passwords remembered per user")
                .env("PWHISTORY_HISTORY_SIZE")
                .default_value("4")
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new(ARG_READ_FAILURE)
                .long(ARG_READ_FAILURE)
                .help("When Vault can't be read: open accepts the password, closed refuses it")
                .env("PWHISTORY_READ_FAILURE")
                .default_value("open")
                .value_parser(validator_read_failure()),
        )
        .arg(
            Arg::new(ARG_CHECK_AND_SET)
                .long(ARG_CHECK_AND_SET)
                .help("Refuse to overwrite a history changed by a concurrent request")
                .env("PWHISTORY_CHECK_AND_SET")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug)]
pub struct Options {
    pub config: HistoryConfig,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let size = matches
            .get_one::<u16>(ARG_HISTORY_SIZE)
            .map_or(DEFAULT_HISTORY_SIZE, |size| usize::from(*size));

        let read_failure = matches
            .get_one::<ReadFailurePolicy>(ARG_READ_FAILURE)
            .copied()
            .unwrap_or_default();

        let config = HistoryConfig::new()
            .with_size(size)
            .with_read_failure(read_failure)
            .with_check_and_set(matches.get_flag(ARG_CHECK_AND_SET));

        Self { config }
    }
}
