//! Poll and refresh response bodies
//!
//! Both `get-token` and `refresh-token` answer with a flat JSON object:
//!
//! ```json
//! {"status": "success", "access_token": "A", "refresh_token": "R", "expires_in": 3600}
//! ```
//!
//! `status` drives the state machine. Every other field belongs to the
//! credential record and is persisted verbatim once the flow succeeds.

use common::Secret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{ACCESS_TOKEN_FIELD, MESSAGE_FIELD, REFRESH_TOKEN_FIELD};
use crate::error::{Error, Result};

/// Flow state reported by the authorization service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    /// The user has not finished authorizing yet.
    Pending,
    Success,
    Error,
}

impl FlowStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FlowStatus::Pending => "pending",
            FlowStatus::Success => "success",
            FlowStatus::Error => "error",
        }
    }
}

/// A decoded poll or refresh response.
///
/// `fields` holds everything except `status`, including `message`.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub status: FlowStatus,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TokenResponse {
    /// Human-readable message attached to the response, if any.
    pub fn message(&self) -> Option<&str> {
        self.fields.get(MESSAGE_FIELD).and_then(Value::as_str)
    }

    /// Convert a `success` response into a grant.
    ///
    /// Fails with `MalformedResponse` when no string `access_token` is present.
    pub fn into_grant(self) -> Result<TokenGrant> {
        match self.fields.get(ACCESS_TOKEN_FIELD) {
            Some(Value::String(token)) if !token.is_empty() => Ok(TokenGrant {
                fields: self.fields,
            }),
            _ => Err(Error::MalformedResponse(format!(
                "{} response carries no {ACCESS_TOKEN_FIELD}",
                self.status.label()
            ))),
        }
    }
}

/// Token fields from a successful acquisition or refresh, ready to persist.
///
/// Always contains a non-empty string `access_token`.
#[derive(Clone)]
pub struct TokenGrant {
    fields: Map<String, Value>,
}

impl TokenGrant {
    pub fn access_token(&self) -> Secret<String> {
        Secret::new(
            self.fields
                .get(ACCESS_TOKEN_FIELD)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        )
    }

    pub fn refresh_token(&self) -> Option<Secret<String>> {
        self.fields
            .get(REFRESH_TOKEN_FIELD)
            .and_then(Value::as_str)
            .map(|t| Secret::new(t.to_owned()))
    }

    /// All fields to merge into the credential record.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Field names only; values include secrets.
        f.debug_struct("TokenGrant")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_response_separates_status_from_fields() {
        let json =
            r#"{"status":"success","access_token":"A","refresh_token":"R","expires_in":3600}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, FlowStatus::Success);
        assert!(!response.fields.contains_key("status"));
        assert_eq!(response.fields["expires_in"], 3600);

        let grant = response.into_grant().unwrap();
        assert_eq!(grant.access_token().expose(), "A");
        assert_eq!(grant.refresh_token().unwrap().expose(), "R");
        assert_eq!(grant.fields().len(), 3);
    }

    #[test]
    fn pending_response_has_no_fields() {
        let response: TokenResponse = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(response.status, FlowStatus::Pending);
        assert!(response.fields.is_empty());
        assert!(response.message().is_none());
    }

    #[test]
    fn error_response_exposes_message() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"status":"error","message":"user denied access"}"#).unwrap();
        assert_eq!(response.status, FlowStatus::Error);
        assert_eq!(response.message(), Some("user denied access"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result = serde_json::from_str::<TokenResponse>(r#"{"status":"expired"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn success_without_access_token_is_malformed() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"status":"success","refresh_token":"R"}"#).unwrap();
        let err = response.into_grant().unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
    }

    #[test]
    fn grant_debug_hides_values() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"status":"success","access_token":"at_secret"}"#).unwrap();
        let grant = response.into_grant().unwrap();
        let debug = format!("{grant:?}");
        assert!(debug.contains("access_token"));
        assert!(!debug.contains("at_secret"));
    }
}
