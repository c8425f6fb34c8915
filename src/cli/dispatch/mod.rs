//! Map validated CLI arguments to an action.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, hash, rate_limit};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let cache_url = matches
        .get_one::<String>("cache-url")
        .cloned()
        .context("missing required argument: --cache-url")?;
    let cache_timeout_seconds = matches
        .get_one::<u64>("cache-timeout-seconds")
        .copied()
        .unwrap_or(5);
    let trusted_proxies = matches.get_one::<String>("trusted-proxies").cloned();

    let auth_opts = auth::Options::parse(matches)?;
    let hash_opts = hash::Options::parse(matches)?;
    let rate_limit_opts = rate_limit::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        cache_url,
        cache_timeout_seconds,
        trusted_proxies,
        auth: auth_opts,
        hash: hash_opts,
        rate_limit: rate_limit_opts,
    }))
}
