//! Route handlers for the policy API.

pub mod health;
pub mod identity;
pub mod root;
