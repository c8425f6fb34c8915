use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub mod auth;
pub mod hash;
pub mod logging;
pub mod rate_limit;

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str =
        Box::leak(format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str());

    let command = Command::new("otpgate")
        .about("Passwordless OTP onboarding and bearer token lifecycle service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("OTPGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("OTPGATE_DSN")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("cache-url")
                .long("cache-url")
                .help("Redis connection string for OTP codes, sessions and rate limits")
                .env("OTPGATE_CACHE_URL")
                .default_value("redis://127.0.0.1:6379"),
        )
        .arg(
            Arg::new("cache-timeout-seconds")
                .long("cache-timeout-seconds")
                .help("Timeout for each cache operation in seconds")
                .env("OTPGATE_CACHE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("trusted-proxies")
                .long("trusted-proxies")
                .help("Comma separated proxy addresses allowed to set X-Forwarded-For and X-Real-IP")
                .env("OTPGATE_TRUSTED_PROXIES"),
        );

    let command = auth::with_args(command);
    let command = hash::with_args(command);
    let command = rate_limit::with_args(command);
    logging::with_args(command)
}
