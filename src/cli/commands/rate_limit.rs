use clap::{Arg, ArgMatches, Command};

pub const ARG_RATE_LIMIT_DEFAULT: &str = "rate-limit-default";
pub const ARG_RATE_LIMIT_DEFAULT_PERIOD: &str = "rate-limit-default-period-seconds";
pub const ARG_RATE_LIMIT_CRITICAL: &str = "rate-limit-critical";
pub const ARG_RATE_LIMIT_CRITICAL_PERIOD: &str = "rate-limit-critical-period-seconds";

#[derive(Debug)]
pub struct Options {
    pub default_limit: u64,
    pub default_period_seconds: u64,
    pub critical_limit: u64,
    pub critical_period_seconds: u64,
}

impl Options {
    /// Parse rate limit arguments from matches.
    ///
    /// # Errors
    /// Currently infallible.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get = |id: &str, default: u64| matches.get_one::<u64>(id).copied().unwrap_or(default);
        Ok(Self {
            default_limit: get(ARG_RATE_LIMIT_DEFAULT, 60),
            default_period_seconds: get(ARG_RATE_LIMIT_DEFAULT_PERIOD, 60),
            critical_limit: get(ARG_RATE_LIMIT_CRITICAL, 3),
            critical_period_seconds: get(ARG_RATE_LIMIT_CRITICAL_PERIOD, 60),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_DEFAULT)
                .long(ARG_RATE_LIMIT_DEFAULT)
                .help("Requests allowed per period on token and user routes")
                .env("OTPGATE_RATE_LIMIT_DEFAULT")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_DEFAULT_PERIOD)
                .long(ARG_RATE_LIMIT_DEFAULT_PERIOD)
                .help("Default bucket window in seconds")
                .env("OTPGATE_RATE_LIMIT_DEFAULT_PERIOD_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_CRITICAL)
                .long(ARG_RATE_LIMIT_CRITICAL)
                .help("Requests allowed per period on registration routes")
                .env("OTPGATE_RATE_LIMIT_CRITICAL")
                .default_value("3")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_CRITICAL_PERIOD)
                .long(ARG_RATE_LIMIT_CRITICAL_PERIOD)
                .help("Critical bucket window in seconds")
                .env("OTPGATE_RATE_LIMIT_CRITICAL_PERIOD_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
