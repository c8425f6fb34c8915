//! One-way hashing of token secrets.
//!
//! Every stored hash is self-describing: `<driver>:<params>$<salt>$<digest>`
//! (bcrypt stores its own modular-crypt string after the prefix). Verification
//! always uses the driver and parameters recorded in the stored value, so
//! records written before a configuration change keep verifying.

mod drivers;

use anyhow::{anyhow, Result};
use std::{fmt, str::FromStr};

pub(crate) const SALT_LEN: usize = 16;
pub(crate) const OUTPUT_LEN: usize = 32;

const DEFAULT_ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const DEFAULT_ARGON2_ITERATIONS: u32 = 3;
const DEFAULT_ARGON2_PARALLELISM: u32 = 4;
const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
const DEFAULT_BCRYPT_COST: u32 = 12;
const DEFAULT_SCRYPT_LOG_N: u8 = 15;
const DEFAULT_SCRYPT_R: u32 = 8;
const DEFAULT_SCRYPT_P: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashDriver {
    Argon2,
    Pbkdf2,
    Scrypt,
    Bcrypt,
    Sha256,
}

impl HashDriver {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Argon2 => "argon2",
            Self::Pbkdf2 => "pbkdf2",
            Self::Scrypt => "scrypt",
            Self::Bcrypt => "bcrypt",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashDriver {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "argon2" | "argon2id" => Ok(Self::Argon2),
            "pbkdf2" => Ok(Self::Pbkdf2),
            "scrypt" => Ok(Self::Scrypt),
            "bcrypt" => Ok(Self::Bcrypt),
            "sha256" => Ok(Self::Sha256),
            other => Err(anyhow!("unknown hash driver: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HashConfig {
    driver: HashDriver,
    argon2_memory_kib: u32,
    argon2_iterations: u32,
    argon2_parallelism: u32,
    pbkdf2_iterations: u32,
    bcrypt_cost: u32,
    scrypt_log_n: u8,
    scrypt_r: u32,
    scrypt_p: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self::new(HashDriver::Argon2)
    }
}

impl HashConfig {
    #[must_use]
    pub const fn new(driver: HashDriver) -> Self {
        Self {
            driver,
            argon2_memory_kib: DEFAULT_ARGON2_MEMORY_KIB,
            argon2_iterations: DEFAULT_ARGON2_ITERATIONS,
            argon2_parallelism: DEFAULT_ARGON2_PARALLELISM,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            scrypt_log_n: DEFAULT_SCRYPT_LOG_N,
            scrypt_r: DEFAULT_SCRYPT_R,
            scrypt_p: DEFAULT_SCRYPT_P,
        }
    }

    #[must_use]
    pub const fn with_argon2(mut self, memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        self.argon2_memory_kib = memory_kib;
        self.argon2_iterations = iterations;
        self.argon2_parallelism = parallelism;
        self
    }

    #[must_use]
    pub const fn with_pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub const fn with_scrypt(mut self, log_n: u8, r: u32, p: u32) -> Self {
        self.scrypt_log_n = log_n;
        self.scrypt_r = r;
        self.scrypt_p = p;
        self
    }

    #[must_use]
    pub const fn driver(&self) -> HashDriver {
        self.driver
    }
}

/// Hashes and verifies secrets with the configured driver.
///
/// Hashing is CPU bound; async callers should run it on the blocking pool.
#[derive(Clone, Debug)]
pub struct Hasher {
    config: HashConfig,
}

impl Hasher {
    /// Build a hasher, rejecting parameters the driver would refuse later.
    ///
    /// # Errors
    /// Returns an error if the configured parameters are out of range.
    pub fn new(config: HashConfig) -> Result<Self> {
        match config.driver {
            HashDriver::Argon2 => {
                drivers::argon2_params(
                    config.argon2_memory_kib,
                    config.argon2_iterations,
                    config.argon2_parallelism,
                )?;
            }
            HashDriver::Scrypt => {
                drivers::scrypt_params(config.scrypt_log_n, config.scrypt_r, config.scrypt_p)?;
            }
            HashDriver::Pbkdf2 if config.pbkdf2_iterations == 0 => {
                return Err(anyhow!("pbkdf2 iterations must be greater than zero"));
            }
            HashDriver::Bcrypt if !(4..=31).contains(&config.bcrypt_cost) => {
                return Err(anyhow!("bcrypt cost must be between 4 and 31"));
            }
            _ => {}
        }
        Ok(Self { config })
    }

    #[must_use]
    pub const fn driver(&self) -> HashDriver {
        self.config.driver
    }

    /// Hash `secret` with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if the underlying primitive fails.
    pub fn hash(&self, secret: &str) -> Result<String> {
        let config = &self.config;
        let encoded = match config.driver {
            HashDriver::Argon2 => drivers::argon2_hash(
                secret,
                config.argon2_memory_kib,
                config.argon2_iterations,
                config.argon2_parallelism,
            )?,
            HashDriver::Pbkdf2 => drivers::pbkdf2_hash(secret, config.pbkdf2_iterations),
            HashDriver::Scrypt => drivers::scrypt_hash(
                secret,
                config.scrypt_log_n,
                config.scrypt_r,
                config.scrypt_p,
            )?,
            HashDriver::Bcrypt => drivers::bcrypt_hash(secret, config.bcrypt_cost)?,
            HashDriver::Sha256 => drivers::sha256_hash(secret),
        };
        Ok(format!("{}:{encoded}", config.driver))
    }

    /// Check `secret` against a stored hash in constant time.
    ///
    /// # Errors
    /// Returns an error if the stored value is malformed or names an unknown driver.
    pub fn verify(&self, secret: &str, stored: &str) -> Result<bool> {
        verify(secret, stored)
    }
}

/// Verify against a stored hash without a configured [`Hasher`].
///
/// # Errors
/// Returns an error if the stored value is malformed or names an unknown driver.
pub fn verify(secret: &str, stored: &str) -> Result<bool> {
    let (driver, encoded) = stored
        .split_once(':')
        .ok_or_else(|| anyhow!("stored hash is missing its driver prefix"))?;
    match driver.parse::<HashDriver>()? {
        HashDriver::Argon2 => drivers::argon2_verify(secret, encoded),
        HashDriver::Pbkdf2 => drivers::pbkdf2_verify(secret, encoded),
        HashDriver::Scrypt => drivers::scrypt_verify(secret, encoded),
        HashDriver::Bcrypt => drivers::bcrypt_verify(secret, encoded),
        HashDriver::Sha256 => drivers::sha256_verify(secret, encoded),
    }
}
