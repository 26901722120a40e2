use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::app_error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix seconds>,v1=<hex hmac>`
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

/// Oldest accepted notification age, seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

fn compute(secret: &SecretString, timestamp: &str, body: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signs `body` as sent at `timestamp`
pub fn sign(secret: &SecretString, timestamp: i64, body: &[u8]) -> AppResult<String> {
    let ts = timestamp.to_string();
    let signature = compute(secret, &ts, body)?;
    Ok(format!("t={},v1={}", ts, signature))
}

/// Checks a signature header against the raw body.
///
/// Several `v1` entries may be present (secret rotation); any match is enough.
/// Every failure is reported as `SignatureInvalid`.
pub fn verify(
    secret: &SecretString,
    signature_header: Option<&str>,
    body: &[u8],
    now: i64,
) -> AppResult<()> {
    let header = signature_header
        .ok_or_else(|| AppError::SignatureInvalid("missing signature header".into()))?;

    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| AppError::SignatureInvalid("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(AppError::SignatureInvalid("missing signature".into()));
    }

    let expected = compute(secret, timestamp, body)?;
    if !signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected))
    {
        return Err(AppError::SignatureInvalid("signature mismatch".into()));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| AppError::SignatureInvalid("invalid timestamp".into()))?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::SignatureInvalid("timestamp outside tolerance".into()));
    }

    Ok(())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
