//! Token signing, OTP and registration session arguments.

use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_ISSUER: &str = "jwt-issuer";
pub const ARG_JWT_AUDIENCE: &str = "jwt-audience";
pub const ARG_JWT_ALGORITHM: &str = "jwt-algorithm";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";
pub const ARG_OTP_LENGTH: &str = "otp-length";
pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_OTP_WEBHOOK_URL: &str = "otp-webhook-url";
pub const ARG_REGISTRATION_SESSION_TTL_SECONDS: &str = "registration-session-ttl-seconds";
pub const ARG_REGISTRATION_SESSION_POLICY: &str = "registration-session-policy";

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_algorithm: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub otp_length: usize,
    pub otp_ttl_seconds: u64,
    pub otp_webhook_url: Option<String>,
    pub registration_session_ttl_seconds: u64,
    pub registration_session_policy: String,
}

impl Options {
    /// Parse token and registration arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let jwt_secret = match matches.get_one::<String>(ARG_JWT_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };

        let get_string = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();

        Ok(Self {
            jwt_secret,
            jwt_issuer: get_string(ARG_JWT_ISSUER),
            jwt_audience: get_string(ARG_JWT_AUDIENCE),
            jwt_algorithm: get_string(ARG_JWT_ALGORITHM),
            access_token_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(3600),
            refresh_token_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(604_800),
            otp_length: matches.get_one::<usize>(ARG_OTP_LENGTH).copied().unwrap_or(5),
            otp_ttl_seconds: matches
                .get_one::<u64>(ARG_OTP_TTL_SECONDS)
                .copied()
                .unwrap_or(120),
            otp_webhook_url: matches
                .get_one::<String>(ARG_OTP_WEBHOOK_URL)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
            registration_session_ttl_seconds: matches
                .get_one::<u64>(ARG_REGISTRATION_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(120),
            registration_session_policy: get_string(ARG_REGISTRATION_SESSION_POLICY),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_jwt_args(command);
    let command = with_otp_args(command);
    with_registration_args(command)
}

fn with_jwt_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign access and refresh tokens")
                .env("OTPGATE_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_JWT_ISSUER)
                .long(ARG_JWT_ISSUER)
                .help("Token issuer (iss)")
                .env("OTPGATE_JWT_ISSUER")
                .default_value("otpgate"),
        )
        .arg(
            Arg::new(ARG_JWT_AUDIENCE)
                .long(ARG_JWT_AUDIENCE)
                .help("Token audience (aud)")
                .env("OTPGATE_JWT_AUDIENCE")
                .default_value("localhost"),
        )
        .arg(
            Arg::new(ARG_JWT_ALGORITHM)
                .long(ARG_JWT_ALGORITHM)
                .help("Signing algorithm: HS256, HS384 or HS512")
                .env("OTPGATE_JWT_ALGORITHM")
                .default_value("HS256"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("OTPGATE_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token TTL in seconds")
                .env("OTPGATE_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_otp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_LENGTH)
                .long(ARG_OTP_LENGTH)
                .help("Number of digits in a one-time code")
                .env("OTPGATE_OTP_LENGTH")
                .default_value("5")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("One-time code TTL in seconds")
                .env("OTPGATE_OTP_TTL_SECONDS")
                .default_value("120")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OTP_WEBHOOK_URL)
                .long(ARG_OTP_WEBHOOK_URL)
                .help("Webhook that delivers one-time codes; codes are only logged when unset")
                .env("OTPGATE_OTP_WEBHOOK_URL"),
        )
}

fn with_registration_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REGISTRATION_SESSION_TTL_SECONDS)
                .long(ARG_REGISTRATION_SESSION_TTL_SECONDS)
                .help("Pending registration session TTL in seconds")
                .env("OTPGATE_REGISTRATION_SESSION_TTL_SECONDS")
                .default_value("120")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REGISTRATION_SESSION_POLICY)
                .long(ARG_REGISTRATION_SESSION_POLICY)
                .help("What a wrong code does to the session: reusable or single-attempt")
                .env("OTPGATE_REGISTRATION_SESSION_POLICY")
                .default_value("reusable"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn command() -> Command {
        with_args(Command::new("otpgate"))
    }

    #[test]
    fn defaults_apply() {
        temp_env::with_vars(
            [
                ("OTPGATE_JWT_SECRET", Some("secret")),
                ("OTPGATE_OTP_WEBHOOK_URL", None),
                ("OTPGATE_JWT_ALGORITHM", None),
                ("OTPGATE_REGISTRATION_SESSION_POLICY", None),
            ],
            || {
                let matches = command().get_matches_from(vec!["otpgate"]);
                let options = Options::parse(&matches).expect("options");
                assert_eq!(options.jwt_secret.expose_secret(), "secret");
                assert_eq!(options.jwt_issuer, "otpgate");
                assert_eq!(options.jwt_audience, "localhost");
                assert_eq!(options.jwt_algorithm, "HS256");
                assert_eq!(options.access_token_ttl_seconds, 3600);
                assert_eq!(options.refresh_token_ttl_seconds, 604_800);
                assert_eq!(options.otp_length, 5);
                assert_eq!(options.otp_ttl_seconds, 120);
                assert_eq!(options.otp_webhook_url, None);
                assert_eq!(options.registration_session_ttl_seconds, 120);
                assert_eq!(options.registration_session_policy, "reusable");
            },
        );
    }

    #[test]
    fn missing_secret_is_rejected() {
        temp_env::with_vars([("OTPGATE_JWT_SECRET", None::<&str>)], || {
            let matches = command().get_matches_from(vec!["otpgate"]);
            let err = Options::parse(&matches).expect_err("secret is required");
            assert!(err
                .to_string()
                .contains("missing required argument: --jwt-secret"));
        });
    }

    #[test]
    fn blank_secret_is_rejected() {
        temp_env::with_vars([("OTPGATE_JWT_SECRET", Some("  "))], || {
            let matches = command().get_matches_from(vec!["otpgate"]);
            assert!(Options::parse(&matches).is_err());
        });
    }

    #[test]
    fn flags_override_env() {
        temp_env::with_vars(
            [
                ("OTPGATE_JWT_SECRET", Some("from-env")),
                ("OTPGATE_OTP_LENGTH", Some("6")),
            ],
            || {
                let matches = command().get_matches_from(vec![
                    "otpgate",
                    "--jwt-secret",
                    "from-flag",
                    "--otp-length",
                    "8",
                    "--registration-session-policy",
                    "single-attempt",
                    "--otp-webhook-url",
                    "http://127.0.0.1:9000/otp",
                ]);
                let options = Options::parse(&matches).expect("options");
                assert_eq!(options.jwt_secret.expose_secret(), "from-flag");
                assert_eq!(options.otp_length, 8);
                assert_eq!(options.registration_session_policy, "single-attempt");
                assert_eq!(
                    options.otp_webhook_url.as_deref(),
                    Some("http://127.0.0.1:9000/otp")
                );
            },
        );
    }

    #[test]
    fn zero_ttl_is_rejected_by_parser() {
        temp_env::with_vars([("OTPGATE_JWT_SECRET", Some("secret"))], || {
            let result = command().try_get_matches_from(vec![
                "otpgate",
                "--access-token-ttl-seconds",
                "0",
            ]);
            assert!(result.is_err());
        });
    }
}
