//! # otpgate (OTP onboarding & bearer token lifecycle)
//!
//! `otpgate` registers users by mobile number and national id with a short-lived
//! one-time code, then issues paired access/refresh JWTs and manages their lifecycle.
//!
//! ## Registration
//!
//! `send-otp` validates the input, parks a pending session in the cache and delivers
//! a numeric code. `verify-otp` checks the code, creates the user and returns the
//! first credential pair. Codes and sessions live only in the cache and expire on
//! their own TTL.
//!
//! ## Tokens
//!
//! Every credential pair is persisted in `PostgreSQL` with both tokens hashed
//! (Argon2 by default). A bearer token is accepted only when its signature and
//! expiry are valid **and** its record is still live and matches the stored hash.
//! Refreshing rotates the pair; revocation soft-deletes records.
//!
//! ## Rate limiting
//!
//! Registration routes share a small `critical` bucket; token and user routes use
//! the `default` bucket. Exceeded writes get `429`, reads are let through.

pub mod api;
pub mod cache;
pub mod cli;
pub mod error;
pub mod hash;
pub mod otp;
pub mod rate_limit;
pub mod registration;
pub mod token;
pub mod users;

pub use error::{Error, ErrorKind, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{ensure, Context};
    use std::{fs, path::PathBuf};

    // Normalize SQL to avoid brittle formatting checks in schema tests.
    fn canonical_schema() -> anyhow::Result<String> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("sql/schema.sql");
        let sql = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SQL file at {}", path.display()))?;
        Ok(sql
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_lowercase())
            .collect())
    }

    #[test]
    fn schema_sql_matches_repositories() -> anyhow::Result<()> {
        let canonical = canonical_schema()?;
        for snippet in [
            "createtableifnotexistsusers(",
            "createtableifnotexistsaccess_tokens(",
            "is_activebooleannotnulldefaulttrue",
            "owner_typetextnotnull",
            "refresh_tokentextnotnull",
            "last_used_attimestamptz,",
            "deleted_attimestamptz",
            "users_mobile_keyonusers(mobile)wheredeleted_atisnull",
        ] {
            ensure!(canonical.contains(snippet), "schema is missing {snippet}");
        }
        Ok(())
    }

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
