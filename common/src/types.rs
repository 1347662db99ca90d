use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperatingMode {
    #[default]
    Auto,
    Manual,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "MANUAL" => Ok(Self::Manual),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl ConnectivityState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Last-known telemetry. Never mutated in place; each poll builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub age_ms: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

/// Body of the device's `GET /telemetry`. Fields are kept loose because the
/// firmware sends numbers, numeric strings or `null` depending on sensor state.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTelemetry {
    #[serde(default)]
    pub temperature: Option<Value>,
    #[serde(default)]
    pub humidity: Option<Value>,
    #[serde(default)]
    pub age_ms: Option<Value>,
}

impl RawTelemetry {
    /// Only a JSON object is accepted. A derived `Deserialize` would also take
    /// a positional array, which the firmware never sends.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let fields = serde_json::from_str::<Map<String, Value>>(body)?;
        serde_json::from_value(Value::Object(fields))
    }

    pub fn into_snapshot(self, observed_at: DateTime<Utc>) -> TelemetrySnapshot {
        TelemetrySnapshot {
            temperature: self.temperature.as_ref().and_then(coerce_number),
            humidity: self.humidity.as_ref().and_then(coerce_number),
            age_ms: self
                .age_ms
                .as_ref()
                .and_then(coerce_number)
                .map(|ms| ms.max(0.0).round() as u64),
            observed_at,
        }
    }
}

/// Numbers and numeric strings become `f64`; everything else (and NaN/inf) is absent.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// What the poller publishes for readers after every poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkStatus {
    pub state: ConnectivityState,
    pub since: Option<DateTime<Utc>>,
    pub telemetry: Option<Arc<TelemetrySnapshot>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: String,
    #[serde(default)]
    pub value: Value,
}

impl Intent {
    pub fn new(intent_type: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            intent_type: intent_type.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WireCommand(String);

impl WireCommand {
    pub(crate) fn new(command: String) -> Self {
        Self(command)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn coerces_numeric_strings_and_drops_garbage() {
        let raw: RawTelemetry = serde_json::from_value(json!({
            "temperature": "37.5",
            "humidity": "wet",
            "age_ms": 199.6
        }))
        .unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let snapshot = raw.into_snapshot(at);

        assert_eq!(snapshot.temperature, Some(37.5));
        assert_eq!(snapshot.humidity, None);
        assert_eq!(snapshot.age_ms, Some(200));
        assert_eq!(snapshot.observed_at, at);
    }

    #[test]
    fn telemetry_must_be_an_object() {
        assert!(RawTelemetry::from_json("[37.9,58,200]").is_err());
        assert!(RawTelemetry::from_json("null").is_err());

        let raw = RawTelemetry::from_json(r#"{"temperature":37.9}"#).unwrap();
        assert_eq!(raw.temperature, Some(json!(37.9)));
        assert_eq!(raw.humidity, None);
    }

    #[test]
    fn missing_fields_are_null() {
        let raw: RawTelemetry = serde_json::from_value(json!({})).unwrap();
        let snapshot = raw.into_snapshot(Utc::now());
        assert_eq!(snapshot.temperature, None);
        assert_eq!(snapshot.age_ms, None);
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("manual".parse::<OperatingMode>(), Ok(OperatingMode::Manual));
        assert_eq!(" AUTO ".parse::<OperatingMode>(), Ok(OperatingMode::Auto));
        assert!("HEAT".parse::<OperatingMode>().is_err());
        assert_eq!(OperatingMode::default(), OperatingMode::Auto);
    }
}
