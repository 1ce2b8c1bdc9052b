//! Shared data models
//!
//! Alert records as produced by the CrimeWatch analysis backend.
//! The client never creates alerts, it only receives and forwards them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Danger keywords kept by the alerts view
const DANGER_KEYWORDS: [&str; 2] = ["weapon", "violence"];

/// Alert object returned by `/upload-frame/` and `/alerts/`
///
/// Unknown fields are retained in `extra` so the object can be forwarded
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,

    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub danger_status: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub details: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub snapshot_url: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub camera_id: Option<String>,

    #[serde(
        default,
        alias = "_id",
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Alert {
    /// Minimal alert with only a timestamp
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            danger_status: None,
            details: None,
            location: None,
            snapshot_url: None,
            camera_id: None,
            id: None,
            extra: Map::new(),
        }
    }

    /// Builder-style danger status
    pub fn with_danger_status(mut self, status: impl Into<String>) -> Self {
        self.danger_status = Some(status.into());
        self
    }

    /// Whether the danger status mentions a weapon or violence
    pub fn is_danger(&self) -> bool {
        let status = self
            .danger_status
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        DANGER_KEYWORDS.iter().any(|k| status.contains(k))
    }

    /// Stable key for listing (id, falling back to timestamp)
    pub fn display_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.timestamp)
    }
}

/// Text form of a scalar field; `null` reads as absent
///
/// Numbers and booleans are kept as their JSON text, and Mongo-style
/// `{"$oid": "..."}` ids are unwrapped.
fn text_of(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Object(map) if map.len() == 1 && map.contains_key("$oid") => {
            map.get("$oid").and_then(Value::as_str).map(String::from)
        }
        other => Some(other.to_string()),
    }
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(text_of(Value::deserialize(d)?))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(lenient_opt_string(d)?.unwrap_or_default())
}

impl Alert {
    /// Build an alert from whatever the server put under `alert`
    ///
    /// Falsy payloads (`null`, `false`, `""`, `0`) mean no alert. Objects
    /// keep their fields; any other value is kept under `extra["payload"]`.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let truthy = match &payload {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Value::Array(_) | Value::Object(_) => true,
        };
        if !truthy {
            return None;
        }

        match payload {
            Value::Object(map) => match serde_json::from_value(Value::Object(map.clone())) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    tracing::debug!(error = %e, "Alert fields unreadable, keeping raw object");
                    let mut alert = Alert::new("");
                    alert.extra = map;
                    Some(alert)
                }
            },
            other => {
                let mut alert = Alert::new("");
                alert.extra.insert("payload".to_string(), other);
                Some(alert)
            }
        }
    }
}

/// Deserialize an optional alert payload through `Alert::from_payload`
pub fn deserialize_alert<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Alert>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.and_then(Alert::from_payload))
}

/// Keep only weapon/violence alerts, preserving order
pub fn filter_danger(alerts: &[Alert]) -> Vec<Alert> {
    alerts.iter().filter(|a| a.is_danger()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_danger_keeps_weapon_and_violence() {
        let alerts = vec![
            Alert::new("2025-01-01 10:00:00").with_danger_status("weapon"),
            Alert::new("2025-01-01 10:00:05").with_danger_status("none"),
            Alert::new("2025-01-01 10:00:10").with_danger_status("violence detected"),
            Alert::new("2025-01-01 10:00:15").with_danger_status("normal"),
        ];

        let filtered = filter_danger(&alerts);

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0], alerts[0]);
        assert_eq!(filtered[1], alerts[2]);
    }

    #[test]
    fn test_is_danger_case_insensitive_and_missing() {
        assert!(Alert::new("t").with_danger_status("WEAPON DETECTED").is_danger());
        assert!(!Alert::new("t").is_danger());
    }

    #[test]
    fn test_alert_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "timestamp": "2025-01-01 10:00:00",
            "danger_status": "weapon",
            "_id": "abc123",
            "violence_prob": 0.91
        });

        let alert: Alert = serde_json::from_value(raw).unwrap();
        assert_eq!(alert.id.as_deref(), Some("abc123"));
        assert_eq!(alert.display_key(), "abc123");
        assert_eq!(alert.extra.get("violence_prob"), Some(&serde_json::json!(0.91)));
    }

    #[test]
    fn test_alert_without_timestamp_still_decodes() {
        let alert: Alert =
            serde_json::from_value(serde_json::json!({ "danger_status": "weapon" })).unwrap();
        assert_eq!(alert.timestamp, "");
        assert!(alert.is_danger());
    }

    #[test]
    fn test_non_string_scalars_read_as_text() {
        let alert: Alert = serde_json::from_value(serde_json::json!({
            "timestamp": 1760432400,
            "_id": { "$oid": "65f0c0ffee" },
            "camera_id": 7,
            "details": null
        }))
        .unwrap();

        assert_eq!(alert.timestamp, "1760432400");
        assert_eq!(alert.id.as_deref(), Some("65f0c0ffee"));
        assert_eq!(alert.camera_id.as_deref(), Some("7"));
        assert!(alert.details.is_none());
    }

    #[test]
    fn test_from_payload_truthiness() {
        use serde_json::json;

        assert!(Alert::from_payload(json!(null)).is_none());
        assert!(Alert::from_payload(json!(false)).is_none());
        assert!(Alert::from_payload(json!("")).is_none());
        assert!(Alert::from_payload(json!(0)).is_none());

        let text = Alert::from_payload(json!("Weapon detected")).unwrap();
        assert_eq!(text.extra.get("payload"), Some(&json!("Weapon detected")));

        let object = Alert::from_payload(json!({ "danger_status": ["weapon"] })).unwrap();
        assert_eq!(object.danger_status.as_deref(), Some(r#"["weapon"]"#));
    }

    #[test]
    fn test_display_key_falls_back_to_timestamp() {
        let alert = Alert::new("2025-01-01 10:00:00");
        assert_eq!(alert.display_key(), "2025-01-01 10:00:00");
    }
}
