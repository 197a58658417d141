//! Provider normalizers.
//!
//! One explicit mapping function per provider, behind a single
//! `Normalizer` trait selected by provider tag. Normalization is pure:
//! no store access, no clock, no randomness. A payload that cannot
//! yield an external id, a timestamp, or any identity signal is
//! rejected here — never stored with null critical fields.

mod glofox;
mod starling;
mod stripe;

pub use glofox::GlofoxNormalizer;
pub use starling::StarlingNormalizer;
pub use stripe::StripeNormalizer;

use crate::error::{EngineError, EngineResult};
use crate::transaction::{CanonicalTransaction, Provider};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

pub trait Normalizer {
    fn provider(&self) -> Provider;

    /// Turn a raw provider payload into the canonical shape.
    /// Pure; `Err(Malformed)` for payloads missing critical fields.
    fn normalize(&self, raw: &Value) -> EngineResult<CanonicalTransaction>;
}

pub fn normalizer_for(provider: Provider) -> &'static dyn Normalizer {
    match provider {
        Provider::Stripe => &StripeNormalizer,
        Provider::Glofox => &GlofoxNormalizer,
        Provider::Starling => &StarlingNormalizer,
    }
}

// ── Shared payload plumbing ────────────────────────────────────────

/// First non-empty string among the named keys of a JSON object.
pub(crate) fn pluck_str<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        obj.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

/// First present number among the named keys, as i64 (rounded).
pub(crate) fn pluck_i64(obj: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| {
        let v = obj.get(*key)?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))
    })
}

/// A timestamp that may arrive as an RFC 3339 string or a unix epoch
/// in seconds or milliseconds.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(s) = value.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    let n = value.as_i64()?;
    // Millisecond epochs are 13 digits; anything that large gets scaled.
    let secs = if n.abs() >= 100_000_000_000 { n / 1000 } else { n };
    Utc.timestamp_opt(secs, 0).single()
}

pub(crate) fn pluck_timestamp(obj: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| parse_timestamp(obj.get(*key)?))
}

pub(crate) fn malformed(provider: Provider, detail: impl Into<String>) -> EngineError {
    EngineError::Malformed {
        provider: provider.as_str().to_string(),
        detail: detail.into(),
    }
}

/// Uppercased currency code with a provider-appropriate fallback.
pub(crate) fn currency_or(obj: &Value, keys: &[&str], fallback: &str) -> String {
    pluck_str(obj, keys)
        .map(str::to_uppercase)
        .unwrap_or_else(|| fallback.to_string())
}
