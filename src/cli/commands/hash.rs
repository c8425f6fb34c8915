//! Refresh token hashing arguments.

use clap::{Arg, ArgMatches, Command};

pub const ARG_HASH_DRIVER: &str = "hash-driver";
pub const ARG_ARGON2_MEMORY_KIB: &str = "argon2-memory-kib";
pub const ARG_ARGON2_ITERATIONS: &str = "argon2-iterations";
pub const ARG_ARGON2_PARALLELISM: &str = "argon2-parallelism";
pub const ARG_PBKDF2_ITERATIONS: &str = "pbkdf2-iterations";
pub const ARG_BCRYPT_COST: &str = "bcrypt-cost";
pub const ARG_SCRYPT_LOG_N: &str = "scrypt-log-n";
pub const ARG_SCRYPT_R: &str = "scrypt-r";
pub const ARG_SCRYPT_P: &str = "scrypt-p";

#[derive(Debug)]
pub struct Options {
    pub driver: String,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    pub pbkdf2_iterations: u32,
    pub bcrypt_cost: u32,
    pub scrypt_log_n: u8,
    pub scrypt_r: u32,
    pub scrypt_p: u32,
}

impl Options {
    /// Parse hashing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the driver is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let driver = match matches.get_one::<String>(ARG_HASH_DRIVER) {
            Some(value) if !value.trim().is_empty() => value.clone(),
            _ => anyhow::bail!("missing required argument: --{ARG_HASH_DRIVER}"),
        };
        let get_u32 = |id: &str, default: u32| matches.get_one::<u32>(id).copied().unwrap_or(default);

        Ok(Self {
            driver,
            argon2_memory_kib: get_u32(ARG_ARGON2_MEMORY_KIB, 65_536),
            argon2_iterations: get_u32(ARG_ARGON2_ITERATIONS, 3),
            argon2_parallelism: get_u32(ARG_ARGON2_PARALLELISM, 4),
            pbkdf2_iterations: get_u32(ARG_PBKDF2_ITERATIONS, 600_000),
            bcrypt_cost: get_u32(ARG_BCRYPT_COST, 12),
            scrypt_log_n: matches.get_one::<u8>(ARG_SCRYPT_LOG_N).copied().unwrap_or(15),
            scrypt_r: get_u32(ARG_SCRYPT_R, 8),
            scrypt_p: get_u32(ARG_SCRYPT_P, 3),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command.arg(
        Arg::new(ARG_HASH_DRIVER)
            .long(ARG_HASH_DRIVER)
            .help("Refresh token hash driver: argon2, pbkdf2, scrypt, bcrypt or sha256")
            .env("OTPGATE_HASH_DRIVER")
            .default_value("argon2"),
    );
    let command = with_argon2_args(command);
    with_legacy_args(command)
}

fn with_argon2_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ARGON2_MEMORY_KIB)
                .long(ARG_ARGON2_MEMORY_KIB)
                .help("Argon2 memory cost in KiB")
                .env("OTPGATE_ARGON2_MEMORY_KIB")
                .default_value("65536")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_ITERATIONS)
                .long(ARG_ARGON2_ITERATIONS)
                .help("Argon2 iterations")
                .env("OTPGATE_ARGON2_ITERATIONS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_PARALLELISM)
                .long(ARG_ARGON2_PARALLELISM)
                .help("Argon2 lanes")
                .env("OTPGATE_ARGON2_PARALLELISM")
                .default_value("4")
                .value_parser(clap::value_parser!(u32)),
        )
}

fn with_legacy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PBKDF2_ITERATIONS)
                .long(ARG_PBKDF2_ITERATIONS)
                .help("PBKDF2-SHA256 iterations")
                .env("OTPGATE_PBKDF2_ITERATIONS")
                .default_value("600000")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_BCRYPT_COST)
                .long(ARG_BCRYPT_COST)
                .help("bcrypt cost factor (4-31)")
                .env("OTPGATE_BCRYPT_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_SCRYPT_LOG_N)
                .long(ARG_SCRYPT_LOG_N)
                .help("scrypt CPU/memory cost as log2(N)")
                .env("OTPGATE_SCRYPT_LOG_N")
                .default_value("15")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new(ARG_SCRYPT_R)
                .long(ARG_SCRYPT_R)
                .help("scrypt block size")
                .env("OTPGATE_SCRYPT_R")
                .default_value("8")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_SCRYPT_P)
                .long(ARG_SCRYPT_P)
                .help("scrypt parallelism")
                .env("OTPGATE_SCRYPT_P")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        temp_env::with_vars([("OTPGATE_HASH_DRIVER", None::<&str>)], || {
            let matches = with_args(Command::new("otpgate")).get_matches_from(vec!["otpgate"]);
            let options = Options::parse(&matches).expect("options");
            assert_eq!(options.driver, "argon2");
            assert_eq!(options.argon2_memory_kib, 65_536);
            assert_eq!(options.argon2_iterations, 3);
            assert_eq!(options.argon2_parallelism, 4);
            assert_eq!(options.pbkdf2_iterations, 600_000);
            assert_eq!(options.bcrypt_cost, 12);
            assert_eq!(options.scrypt_log_n, 15);
            assert_eq!(options.scrypt_r, 8);
            assert_eq!(options.scrypt_p, 3);
        });
    }

    #[test]
    fn env_selects_driver() {
        temp_env::with_vars(
            [
                ("OTPGATE_HASH_DRIVER", Some("bcrypt")),
                ("OTPGATE_BCRYPT_COST", Some("10")),
            ],
            || {
                let matches =
                    with_args(Command::new("otpgate")).get_matches_from(vec!["otpgate"]);
                let options = Options::parse(&matches).expect("options");
                assert_eq!(options.driver, "bcrypt");
                assert_eq!(options.bcrypt_cost, 10);
            },
        );
    }
}
