//! Inbound claims sent by the identity provider's policy step.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

/// Claims as they arrive on the wire. Every field is optional here so that
/// missing fields are reported by name instead of as a decode failure.
#[derive(ToSchema, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

/// A validated password change request.
#[derive(Clone, PartialEq, Eq)]
pub struct CandidateSubmission {
    pub user_id: String,
    pub password: String,
    pub language: Option<String>,
}

impl fmt::Debug for CandidateSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateSubmission")
            .field("user_id", &self.user_id)
            .field("password", &"***")
            .field("language", &self.language)
            .finish()
    }
}

/// Why a request body was refused. `Display` is the message returned to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Request content is empty")]
    EmptyBody,
    #[error("Request content is malformed")]
    MalformedPayload,
    #[error("Request content is too large")]
    TooLarge,
    #[error("The 'userId' parameter is null or empty")]
    MissingUserId,
    #[error("The 'password' parameter is null or empty")]
    MissingPassword,
}

/// Decode and check the raw request body. Values are returned exactly as sent.
///
/// # Errors
/// Returns a `RequestError` describing the first problem found.
pub fn validate(body: &[u8]) -> Result<CandidateSubmission, RequestError> {
    if body.is_empty() {
        return Err(RequestError::EmptyBody);
    }

    // `null` decodes to `None` and is as unusable as garbage
    let claims = serde_json::from_slice::<Option<Claims>>(body)
        .ok()
        .flatten()
        .ok_or(RequestError::MalformedPayload)?;

    let user_id = claims
        .user_id
        .filter(|value| !value.is_empty())
        .ok_or(RequestError::MissingUserId)?;

    let password = claims
        .password
        .filter(|value| !value.is_empty())
        .ok_or(RequestError::MissingPassword)?;

    Ok(CandidateSubmission {
        user_id,
        password,
        language: claims.language,
    })
}
