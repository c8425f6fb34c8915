use anyhow::{anyhow, Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64ct::{Base64, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::{OUTPUT_LEN, SALT_LEN};

fn salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

fn encode(params: &str, salt: &[u8], digest: &[u8]) -> String {
    format!(
        "{params}${}${}",
        Base64::encode_string(salt),
        Base64::encode_string(digest)
    )
}

struct Decoded<'a> {
    params: &'a str,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

fn decode(encoded: &str) -> Result<Decoded<'_>> {
    let mut parts = encoded.splitn(3, '$');
    let (Some(params), Some(salt), Some(digest)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(anyhow!("stored hash must be <params>$<salt>$<digest>"));
    };
    Ok(Decoded {
        params,
        salt: Base64::decode_vec(salt).map_err(|e| anyhow!("invalid salt encoding: {e}"))?,
        digest: Base64::decode_vec(digest).map_err(|e| anyhow!("invalid digest encoding: {e}"))?,
    })
}

/// Read a numeric `name=value` entry out of a comma separated parameter list.
fn param<T: std::str::FromStr>(params: &str, name: &str) -> Result<T> {
    let raw = params
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .ok_or_else(|| anyhow!("missing hash parameter: {name}"))?;
    raw.parse::<T>()
        .map_err(|_| anyhow!("invalid hash parameter {name}={raw}"))
}

fn matches(expected: &[u8], actual: &[u8]) -> bool {
    expected.ct_eq(actual).into()
}

pub(super) fn argon2_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Params> {
    Params::new(memory_kib, iterations, parallelism, Some(OUTPUT_LEN))
        .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))
}

fn argon2_derive(secret: &str, salt: &[u8], params: Params, len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(secret.as_bytes(), salt, &mut out)
        .map_err(|e| anyhow!("argon2 hashing failed: {e}"))?;
    Ok(out)
}

pub(super) fn argon2_hash(
    secret: &str,
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
) -> Result<String> {
    let params = argon2_params(memory_kib, iterations, parallelism)?;
    let salt = salt();
    let digest = argon2_derive(secret, &salt, params, OUTPUT_LEN)?;
    Ok(encode(
        &format!("m={memory_kib},t={iterations},p={parallelism}"),
        &salt,
        &digest,
    ))
}

pub(super) fn argon2_verify(secret: &str, encoded: &str) -> Result<bool> {
    let stored = decode(encoded)?;
    let params = Params::new(
        param(stored.params, "m")?,
        param(stored.params, "t")?,
        param(stored.params, "p")?,
        Some(stored.digest.len()),
    )
    .map_err(|e| anyhow!("invalid stored argon2 parameters: {e}"))?;
    let digest = argon2_derive(secret, &stored.salt, params, stored.digest.len())?;
    Ok(matches(&stored.digest, &digest))
}

pub(super) fn pbkdf2_hash(secret: &str, iterations: u32) -> String {
    let salt = salt();
    let mut digest = [0u8; OUTPUT_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), &salt, iterations, &mut digest);
    encode(&format!("i={iterations}"), &salt, &digest)
}

pub(super) fn pbkdf2_verify(secret: &str, encoded: &str) -> Result<bool> {
    let stored = decode(encoded)?;
    let iterations: u32 = param(stored.params, "i")?;
    if iterations == 0 || stored.digest.is_empty() {
        return Err(anyhow!("invalid stored pbkdf2 hash"));
    }
    let mut digest = vec![0u8; stored.digest.len()];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), &stored.salt, iterations, &mut digest);
    Ok(matches(&stored.digest, &digest))
}

pub(super) fn scrypt_params(log_n: u8, r: u32, p: u32) -> Result<scrypt::Params> {
    if log_n == 0 || log_n >= 64 || r == 0 || p == 0 {
        return Err(anyhow!("invalid scrypt parameters: ln={log_n}, r={r}, p={p}"));
    }
    scrypt::Params::new(log_n, r, p, OUTPUT_LEN)
        .map_err(|e| anyhow!("invalid scrypt parameters: {e}"))
}

pub(super) fn scrypt_hash(secret: &str, log_n: u8, r: u32, p: u32) -> Result<String> {
    let params = scrypt_params(log_n, r, p)?;
    let salt = salt();
    let mut digest = [0u8; OUTPUT_LEN];
    scrypt::scrypt(secret.as_bytes(), &salt, &params, &mut digest)
        .map_err(|e| anyhow!("scrypt hashing failed: {e}"))?;
    Ok(encode(&format!("ln={log_n},r={r},p={p}"), &salt, &digest))
}

pub(super) fn scrypt_verify(secret: &str, encoded: &str) -> Result<bool> {
    let stored = decode(encoded)?;
    let params = scrypt_params(
        param(stored.params, "ln")?,
        param(stored.params, "r")?,
        param(stored.params, "p")?,
    )?;
    if stored.digest.len() != OUTPUT_LEN {
        return Err(anyhow!("invalid stored scrypt digest length"));
    }
    let mut digest = [0u8; OUTPUT_LEN];
    scrypt::scrypt(secret.as_bytes(), &stored.salt, &params, &mut digest)
        .map_err(|e| anyhow!("scrypt hashing failed: {e}"))?;
    Ok(matches(&stored.digest, &digest))
}

// bcrypt truncates input at 72 bytes and JWTs are longer than that.
fn bcrypt_prehash(secret: &str) -> String {
    Sha256::digest(secret.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub(super) fn bcrypt_hash(secret: &str, cost: u32) -> Result<String> {
    bcrypt::hash(bcrypt_prehash(secret), cost).context("bcrypt hashing failed")
}

pub(super) fn bcrypt_verify(secret: &str, encoded: &str) -> Result<bool> {
    bcrypt::verify(bcrypt_prehash(secret), encoded).context("invalid stored bcrypt hash")
}

fn sha256_digest(secret: &str, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

pub(super) fn sha256_hash(secret: &str) -> String {
    let salt = salt();
    encode("", &salt, &sha256_digest(secret, &salt))
}

pub(super) fn sha256_verify(secret: &str, encoded: &str) -> Result<bool> {
    let stored = decode(encoded)?;
    Ok(matches(&stored.digest, &sha256_digest(secret, &stored.salt)))
}
