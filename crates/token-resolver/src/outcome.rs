//! Structured result returned across the tool boundary

use common::Secret;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

impl OutcomeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Error => "error",
        }
    }
}

/// `{"status":"success","token":"..."}` or `{"status":"error","message":"..."}`.
///
/// The token is only exposed when serialized; `Debug` redacts it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub status: OutcomeStatus,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "expose_token"
    )]
    pub token: Option<Secret<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolOutcome {
    pub fn success(token: Secret<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            token: Some(token),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            token: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

fn expose_token<S: Serializer>(
    token: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match token {
        Some(token) => serializer.serialize_str(token.expose()),
        None => serializer.serialize_none(),
    }
}
