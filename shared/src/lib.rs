use serde::{Deserialize, Serialize};

/// A category name the classifier can predict, e.g. `food`.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, derive_more::Display, derive_more::From,
)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Discriminator carried by every failed prediction so clients can branch on it.
#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    ValidationError,
    DecodeError,
    UnsupportedFormatError,
    InferenceError,
    UnknownLabelError,
    TimeoutError,
    StagingError,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionResponse {
    pub prediction: Label,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: FailureKind,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub labels: Vec<Label>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn failure_kind_wire_names_match_display() {
        for kind in FailureKind::iter() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
        assert_eq!(FailureKind::UnsupportedFormatError.as_ref(), "unsupported_format_error");
    }

    #[test]
    fn prediction_response_serializes_label_as_plain_string() {
        let response = PredictionResponse {
            prediction: Label::from("food"),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "prediction": "food" })
        );
    }

    #[test]
    fn error_response_round_trips_kind() {
        let body = r#"{"error":"No selected file","kind":"validation_error"}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.kind, FailureKind::ValidationError);
        assert_eq!(parsed.error, "No selected file");
    }
}
