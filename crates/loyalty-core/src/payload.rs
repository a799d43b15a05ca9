//! # Scan Payload
//!
//! Decoding of the string a QR scan produces, and the staleness window.
//!
//! ## Wire Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  {"type": "customer", "id": "c0ffee-42", "issuedAt": 1760000000000}    │
//! │     │                    │                   │                          │
//! │     │                    │                   └─ epoch millis, required  │
//! │     │                    └─ string or integer, non-empty                │
//! │     └─ "customer" | "organization" ("beneficiary" = legacy customer)    │
//! │                                                                         │
//! │  Anything else (not JSON, unknown type, missing id, missing issuedAt)  │
//! │  is a PayloadError → MalformedPayload at the register.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Staleness Boundary
//! `age = now - issued_at` in milliseconds. `age <= max_age` is fresh,
//! `age == max_age + 1` is expired. A code stamped further in the future than
//! `max_age` is treated the same way: the register refuses to trust a clock
//! that far off.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::PayloadError;

/// What a scanned code identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Customer,
    Organization,
}

impl PayloadKind {
    fn from_wire(value: &str) -> Option<Self> {
        match value {
            "customer" | "beneficiary" => Some(PayloadKind::Customer),
            "organization" => Some(PayloadKind::Organization),
            _ => None,
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadKind::Customer => write!(f, "customer"),
            PayloadKind::Organization => write!(f, "organization"),
        }
    }
}

/// A decoded, immutable scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScanPayload {
    pub kind: PayloadKind,
    pub subject_id: String,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
}

/// Result of checking a payload against the staleness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Expired { age_ms: i64 },
}

impl ScanPayload {
    /// Milliseconds between issue and `now` (negative if issued "later").
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.issued_at.timestamp_millis()
    }

    /// Applies the staleness window. `age == max_age_ms` is still fresh.
    ///
    /// ## Example
    /// ```rust
    /// use chrono::{Duration, Utc};
    /// use loyalty_core::payload::{Freshness, PayloadKind, ScanPayload};
    ///
    /// let now = Utc::now();
    /// let payload = ScanPayload {
    ///     kind: PayloadKind::Customer,
    ///     subject_id: "c1".into(),
    ///     issued_at: now - Duration::milliseconds(300_000),
    /// };
    /// assert_eq!(payload.freshness(now, 300_000), Freshness::Fresh);
    /// assert_eq!(
    ///     payload.freshness(now + Duration::milliseconds(1), 300_000),
    ///     Freshness::Expired { age_ms: 300_001 }
    /// );
    /// ```
    pub fn freshness(&self, now: DateTime<Utc>, max_age_ms: i64) -> Freshness {
        let age_ms = self.age_ms(now);
        if age_ms.abs() <= max_age_ms {
            Freshness::Fresh
        } else {
            Freshness::Expired { age_ms }
        }
    }
}

/// Decodes the raw string handed over by the camera collaborator.
///
/// The input is untrusted. Unknown fields are ignored.
pub fn decode_payload(raw: &str) -> Result<ScanPayload, PayloadError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| PayloadError::NotJson(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| PayloadError::NotJson("top-level value is not an object".to_string()))?;

    let kind = match object.get("type") {
        Some(Value::String(kind)) => {
            PayloadKind::from_wire(kind).ok_or_else(|| PayloadError::UnknownKind(kind.clone()))?
        }
        Some(other) => return Err(PayloadError::UnknownKind(other.to_string())),
        None => return Err(PayloadError::UnknownKind("<missing>".to_string())),
    };

    let subject_id = match object.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => n.to_string(),
        _ => return Err(PayloadError::MissingId),
    };

    let issued_at = object
        .get("issuedAt")
        .and_then(Value::as_i64)
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or(PayloadError::MissingIssuedAt)?;

    Ok(ScanPayload {
        kind,
        subject_id,
        issued_at,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
