pub mod kv;
pub mod renew;

use crate::APP_USER_AGENT;
use anyhow::{anyhow, Result};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info_span, instrument, Instrument};
use url::Url;

pub(crate) fn vault_error_message(json_response: &Value) -> &str {
    json_response
        .get("errors")
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or("")
}

fn client() -> Result<Client> {
    Ok(Client::builder().user_agent(APP_USER_AGENT).build()?)
}

/// Return the JSON body, or an error naming the URL, status and Vault's first error.
async fn json_or_error(url: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let json_response: Value = response.json().await.unwrap_or_default();

    if !status.is_success() {
        return Err(anyhow!(
            "{} - {}, {}",
            url,
            status,
            vault_error_message(&json_response)
        ));
    }

    Ok(json_response)
}

/// Build `scheme://host:port<path>` from any Vault URL, dropping its path.
///
/// # Errors
/// Returns an error if `url` cannot be parsed, has no host, or uses an unsupported scheme.
pub fn endpoint_url(url: &str, path: &str) -> Result<String> {
    let url = Url::parse(url)?;

    let scheme = url.scheme();

    let host = url
        .host()
        .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?
        .to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => return Err(anyhow!("Error parsing URL: unsupported scheme {scheme}")),
        },
    };

    let endpoint_url = format!("{scheme}://{host}:{port}{path}");

    debug!("endpoint URL: {}", endpoint_url);

    Ok(endpoint_url)
}

/// Unwrap a response-wrapped `AppRole` secret id.
/// Create one with:
/// vault write -wrap-ttl=300s -f auth/approle/role/pwhistory/secret-id
/// # Errors
/// Returns an error if the Vault request fails or the response has no secret id.
#[instrument(skip(token))]
pub async fn unwrap(url: &str, token: &SecretString) -> Result<SecretString> {
    let unwrap_url = endpoint_url(url, "/v1/sys/wrapping/unwrap")?;

    let span = info_span!("vault.unwrap", http.method = "POST", url = %unwrap_url);
    let response = client()?
        .post(&unwrap_url)
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    let json_response = json_or_error(&unwrap_url, response).await?;

    json_response
        .get("data")
        .and_then(|v| v.get("secret_id"))
        .and_then(Value::as_str)
        .map(|sid| SecretString::from(sid.to_string()))
        .ok_or_else(|| anyhow!("Error parsing JSON response: no secret_id found"))
}

/// Login with `AppRole`, `url` is the full login endpoint
/// (e.g. `https://vault.tld:8200/v1/auth/approle/login`).
/// Returns the client token and its lease duration in seconds.
/// # Errors
/// Returns an error if the Vault request fails or the response has no client token.
#[instrument(skip(secret_id))]
pub async fn approle_login(
    url: &str,
    role_id: &str,
    secret_id: &SecretString,
) -> Result<(SecretString, u64)> {
    let login_payload = json!({
        "role_id": role_id,
        "secret_id": secret_id.expose_secret()
    });

    let span = info_span!("vault.approle_login", http.method = "POST", url = %url);
    let response = client()?
        .post(url)
        .json(&login_payload)
        .send()
        .instrument(span)
        .await?;

    let json_response = json_or_error(url, response).await?;

    let auth = json_response.get("auth");
    let token = auth
        .and_then(|v| v.get("client_token"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no client_token found"))?;
    let lease_duration = auth
        .and_then(|v| v.get("lease_duration"))
        .and_then(Value::as_u64)
        .unwrap_or(1800);

    Ok((SecretString::from(token.to_string()), lease_duration))
}

/// Renew the current token, returns the new lease duration in seconds.
/// # Errors
/// Returns an error if the Vault request fails or the response has no lease duration.
#[instrument(skip(token))]
pub async fn renew_token(url: &str, token: &SecretString, increment: Option<u64>) -> Result<u64> {
    let renew_url = endpoint_url(url, "/v1/auth/token/renew-self")?;

    let payload = json!({
        "increment": increment.unwrap_or(0)
    });

    let span = info_span!("vault.renew_token", http.method = "POST", url = %renew_url);
    let response = client()?
        .post(&renew_url)
        .json(&payload)
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    let json_response = json_or_error(&renew_url, response).await?;

    json_response
        .get("auth")
        .and_then(|v| v.get("lease_duration"))
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))
}
