//! Uniform result of every CRM call.
//!
//! The client never returns `Err`: transport, decode and server-side
//! rejections all land in [`ApiEnvelope::Failure`], so callers only branch on
//! success.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::types::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiFailure {
    /// Non-2xx response. `error` is the body when it has the validation shape.
    #[error("rejected with HTTP {status}{}", error.as_ref().map(|e| format!(": {}", e.message)).unwrap_or_default())]
    Rejected {
        status: u16,
        error: Option<ValidationError>,
    },
    /// The request never produced a response.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The body could not be encoded or decoded.
    #[error("decode failure: {message}")]
    Decode { message: String },
}

impl ApiFailure {
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            ApiFailure::Rejected { error, .. } => error.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiEnvelope<T> {
    Success(Option<T>),
    Failure(Option<ApiFailure>),
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiEnvelope::Success(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ApiEnvelope::Success(data) => data.as_ref(),
            ApiEnvelope::Failure(_) => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            ApiEnvelope::Success(data) => data,
            ApiEnvelope::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            ApiEnvelope::Success(_) => None,
            ApiEnvelope::Failure(failure) => failure.as_ref(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiEnvelope<U> {
        match self {
            ApiEnvelope::Success(data) => ApiEnvelope::Success(data.map(f)),
            ApiEnvelope::Failure(failure) => ApiEnvelope::Failure(failure),
        }
    }
}

/// `{ "success": bool, "data": ... }`
impl<T: Serialize> Serialize for ApiEnvelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ApiEnvelope", 2)?;
        s.serialize_field("success", &self.is_success())?;
        match self {
            ApiEnvelope::Success(data) => s.serialize_field("data", data)?,
            ApiEnvelope::Failure(failure) => s.serialize_field("data", failure)?,
        }
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_flag_is_always_serialized() {
        let ok: ApiEnvelope<u32> = ApiEnvelope::Success(Some(3));
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"success": true, "data": 3}));

        let empty: ApiEnvelope<u32> = ApiEnvelope::Failure(None);
        assert_eq!(serde_json::to_value(&empty).unwrap(), json!({"success": false, "data": null}));

        let down: ApiEnvelope<u32> = ApiEnvelope::Failure(Some(ApiFailure::Transport {
            message: "connection refused".into(),
        }));
        let value = serde_json::to_value(&down).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["data"]["kind"], json!("transport"));
    }

    #[test]
    fn rejection_message_includes_validation_text() {
        let failure = ApiFailure::Rejected {
            status: 422,
            error: Some(ValidationError {
                message: "The mail field must be a valid email.".into(),
                ..Default::default()
            }),
        };
        assert_eq!(
            failure.to_string(),
            "rejected with HTTP 422: The mail field must be a valid email."
        );
        assert!(failure.validation().is_some());
    }

    #[test]
    fn map_keeps_failures() {
        let env: ApiEnvelope<Vec<u8>> = ApiEnvelope::Failure(None);
        assert!(!env.map(|v| v.len()).is_success());
        let env = ApiEnvelope::Success(Some(vec![1u8, 2]));
        assert_eq!(env.map(|v| v.len()).into_data(), Some(2));
    }
}
