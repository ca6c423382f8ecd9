use crate::{
    api::Engine,
    history::{
        submission::{self, Claims, RequestError},
        Decision,
    },
};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

pub const REUSE_MESSAGE: &str =
    "Please make sure the password you enter have never been used before.";
pub const STORE_FAILURE_MESSAGE: &str =
    "Unable to update the password history, please try again later.";

/// Largest request body accepted on `/identity`.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Body of every refusal, shown to the user by the identity provider.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResponse {
    pub version: String,
    pub status: u16,
    pub user_message: String,
}

impl PolicyResponse {
    #[must_use]
    pub fn conflict(user_message: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: StatusCode::CONFLICT.as_u16(),
            user_message: user_message.into(),
        }
    }
}

impl IntoResponse for PolicyResponse {
    fn into_response(self) -> Response {
        (StatusCode::CONFLICT, Json(self)).into_response()
    }
}

#[utoipa::path(
    post,
    path = "/identity",
    request_body = Claims,
    responses (
        (status = 200, description = "Password accepted and recorded"),
        (status = 409, description = "Password refused, invalid request or history unavailable", body = PolicyResponse)
    ),
    tag = "policy"
)]
// the body is taken raw so empty and malformed payloads get their own messages
#[instrument(skip(engine, body))]
pub async fn identity(
    engine: Extension<Arc<Engine>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!("request body rejected: {}", rejection);
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                RequestError::TooLarge
            } else {
                RequestError::MalformedPayload
            };
            return PolicyResponse::conflict(err.to_string()).into_response();
        }
    };

    let submission = match submission::validate(&body) {
        Ok(submission) => submission,
        Err(err) => {
            debug!("invalid request: {}", err);
            return PolicyResponse::conflict(err.to_string()).into_response();
        }
    };

    match engine
        .evaluate_and_record(&submission.user_id, &submission.password)
        .await
    {
        Ok(Decision::Accepted) => {
            info!("password accepted");
            StatusCode::OK.into_response()
        }

        Ok(Decision::Rejected(reason)) => {
            info!("password rejected: {}", reason);
            PolicyResponse::conflict(REUSE_MESSAGE).into_response()
        }

        Err(err) => {
            error!("password history unavailable: {}", err);
            PolicyResponse::conflict(STORE_FAILURE_MESSAGE).into_response()
        }
    }
}
