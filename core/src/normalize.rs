//! Text normalization for identity signals.
//!
//! Every comparison the matching engine makes goes through one of these
//! functions, on both sides. Raw provider text is never compared directly.

/// Suffixes dropped from names so "Acme Ltd" and "Acme Limited" collide.
const COMPANY_SUFFIXES: &[&str] = &[
    "ltd", "limited", "inc", "llc", "co", "company", "plc", "gmbh",
];

/// Lowercased, trimmed email. Empty input collapses to None.
pub fn normalize_email(value: Option<&str>) -> Option<String> {
    let cleaned = value?.trim().to_lowercase();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Digits-only phone. "+44 7700 900123" and "07700900123" compare on
/// their digit strings; everything else is stripped.
pub fn normalize_phone(value: Option<&str>) -> Option<String> {
    let digits: String = value?.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Full-name key: lowercase, punctuation to spaces, company suffixes
/// dropped, whitespace collapsed.
pub fn normalize_name(value: Option<&str>) -> Option<String> {
    let raw = value?;
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '.' || c == ',' { ' ' } else { c })
        .collect::<String>()
        .to_lowercase();
    let parts: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|part| !COMPANY_SUFFIXES.contains(part))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Counterparty mapping key: lowercase with whitespace collapsed.
/// Punctuation is kept — bank labels like "J SMITH REF 44" must map the
/// exact label they arrived with, not a loosened form of it.
pub fn counterparty_key(label: &str) -> Option<String> {
    let key = label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}
