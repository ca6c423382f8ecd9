//! # pwhistory (Password Reuse Policy)
//!
//! `pwhistory` is a policy endpoint called by an identity provider during a
//! password change. It answers one question: has this user recently used the
//! candidate password?
//!
//! ## History
//!
//! Passwords are never stored. Each accepted password is reduced to an
//! uppercase hex `SHA-256` digest and pushed in front of the user's history,
//! which keeps the last few digests (four by default). A candidate whose
//! digest is already in the history is rejected and nothing is written.
//!
//! ## Storage
//!
//! Histories live in a Vault KV version 2 engine, one secret per user. The
//! service authenticates with `AppRole` (optionally through a wrapped secret
//! id) and renews its token in the background.
//!
//! ## Responses
//!
//! `POST /identity` returns `200` with an empty body when the password is
//! accepted. Every refusal, including invalid input and storage failures, is a
//! `409` carrying a `{version, status, userMessage}` document for the
//! identity provider to show to the user.

pub mod api;
pub mod cli;
pub mod history;
pub mod vault;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
