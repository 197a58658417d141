//! Lead intake — marketing-form submissions become customer identities.
//!
//! This is the only ingestion-side creator of identities and the only
//! source of acquisition-channel classification; the payment pipeline
//! attaches to identities, it never invents them.

use crate::error::{EngineError, EngineResult};
use crate::normalize::{normalize_email, normalize_phone};
use serde_json::Value;

/// A normalized lead-capture payload.
#[derive(Debug, Clone, Default)]
pub struct LeadProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub crm_contact_id: Option<String>,
}

impl LeadProfile {
    pub fn display_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(f), None) => Some(f.clone()),
            (None, Some(l)) => Some(l.clone()),
            (None, None) => None,
        }
    }
}

/// Normalize a raw form payload. Fields may live at the root or under a
/// `contact` object, in snake_case or camelCase, depending on which
/// form plugin sent them. A lead with neither email, phone, CRM id nor
/// name is rejected — there would be nothing to ever match against.
pub fn normalize_lead(raw: &Value) -> EngineResult<LeadProfile> {
    let contact = raw.get("contact").filter(|c| c.is_object());
    let field = |keys: &[&str]| -> Option<String> {
        for obj in [Some(raw), contact].into_iter().flatten() {
            for key in keys {
                if let Some(s) = obj.get(*key).and_then(Value::as_str) {
                    let trimmed = s.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
        None
    };

    let profile = LeadProfile {
        first_name: field(&["firstName", "first_name"]),
        last_name: field(&["lastName", "last_name"]),
        email: normalize_email(field(&["email"]).as_deref()),
        phone: normalize_phone(field(&["phone"]).as_deref()),
        source: field(&["source", "channel"]),
        tags: extract_tags(raw, contact),
        crm_contact_id: field(&["contactId", "contact_id", "id"]),
    };

    if profile.email.is_none()
        && profile.phone.is_none()
        && profile.crm_contact_id.is_none()
        && profile.display_name().is_none()
    {
        return Err(EngineError::Malformed {
            provider: "lead-intake".to_string(),
            detail: "payload carries no identity signal at all".to_string(),
        });
    }

    Ok(profile)
}

/// Tags arrive as a JSON array or a comma-separated string.
fn extract_tags(raw: &Value, contact: Option<&Value>) -> Vec<String> {
    for obj in [Some(raw), contact].into_iter().flatten() {
        match obj.get("tags") {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            Some(Value::String(s)) => {
                return s
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }
    Vec::new()
}
