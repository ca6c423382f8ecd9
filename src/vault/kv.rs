//! Password history kept in a Vault KV version 2 engine.
//!
//! Each user owns one secret at `<mount>/data/<prefix>/<user id>` whose
//! `value` field holds the JSON encoded history. Writes replace the field as a
//! whole; Vault's own version retention plays no part in the history.

use crate::{
    history::{Secret, SecretStore, StoreError},
    vault, APP_USER_AGENT,
};
use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info_span, Instrument};
use url::Url;

const VALUE_FIELD: &str = "value";

pub const DEFAULT_KV_MOUNT: &str = "secret";
pub const DEFAULT_KV_PREFIX: &str = "password-history";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 5;
/// Digests used to be written cut to this length, keep matching them.
pub const DEFAULT_DIGEST_MAX_LEN: usize = 55;

#[derive(Debug, Clone)]
pub struct VaultKvConfig {
    url: String,
    mount: String,
    prefix: String,
    namespace: Option<String>,
    timeout: Duration,
    digest_max_len: Option<usize>,
}

impl VaultKvConfig {
    /// `url` is any URL on the Vault server; only scheme, host and port are used.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            mount: DEFAULT_KV_MOUNT.to_string(),
            prefix: DEFAULT_KV_PREFIX.to_string(),
            namespace: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            digest_max_len: Some(DEFAULT_DIGEST_MAX_LEN),
        }
    }

    #[must_use]
    pub fn with_mount(mut self, mount: String) -> Self {
        self.mount = mount;
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: String) -> Self {
        self.prefix = prefix;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `None` keeps full digests.
    #[must_use]
    pub const fn with_digest_max_len(mut self, max_len: Option<usize>) -> Self {
        self.digest_max_len = max_len;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn mount(&self) -> &str {
        &self.mount
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub const fn digest_max_len(&self) -> Option<usize> {
        self.digest_max_len
    }

    fn data_path(&self) -> String {
        let mount = self.mount.trim_matches('/');
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("/v1/{mount}/data")
        } else {
            format!("/v1/{mount}/data/{prefix}")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultHealth {
    Ok,
    Sealed,
    Error,
}

impl VaultHealth {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Sealed => "sealed",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Ok)
    }
}

pub struct VaultKvStore {
    client: Client,
    config: VaultKvConfig,
    token: SecretString,
    data_url: Url,
    health_url: String,
}

impl std::fmt::Debug for VaultKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKvStore")
            .field("config", &self.config)
            .field("token", &"***")
            .field("data_url", &self.data_url.as_str())
            .finish()
    }
}

impl VaultKvStore {
    /// # Errors
    /// Returns an error if the Vault URL is invalid or the HTTP client cannot be built.
    pub fn new(config: VaultKvConfig, token: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("Failed to build Vault HTTP client")?;

        let data_url = vault::endpoint_url(&config.url, &config.data_path())?;
        let data_url = Url::parse(&data_url)
            .with_context(|| format!("Invalid Vault KV URL: {data_url}"))?;
        let health_url = vault::endpoint_url(&config.url, "/v1/sys/health")?;

        Ok(Self {
            client,
            config,
            token,
            data_url,
            health_url,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &VaultKvConfig {
        &self.config
    }

    /// URL of the secret holding `key`'s history, `key` encoded as one path segment.
    fn secret_url(&self, key: &str) -> Result<Url, StoreError> {
        // dot segments are resolved instead of encoded by `push`
        if is_dot_segment(key) {
            return Err(StoreError::InvalidKey(format!(
                "'{key}' is not usable as a path segment"
            )));
        }

        let mut url = self.data_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Transport(format!("{} cannot be a base", self.data_url)))?
            .pop_if_empty()
            .push(key);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("X-Vault-Token", self.token.expose_secret());

        match &self.config.namespace {
            Some(namespace) => builder.header("X-Vault-Namespace", namespace),
            None => builder,
        }
    }

    /// Query `sys/health`. Standby nodes count as healthy.
    pub async fn health(&self) -> VaultHealth {
        let span = info_span!("vault.health", http.method = "GET", url = %self.health_url);
        let response = match self.client.get(&self.health_url).send().instrument(span).await {
            Ok(response) => response,
            Err(err) => {
                debug!("Vault health check failed: {}", err);
                return VaultHealth::Error;
            }
        };

        let status = response.status();
        let body: Value = response.json().await.unwrap_or_default();

        if body.get("sealed").and_then(Value::as_bool) == Some(true) {
            VaultHealth::Sealed
        } else if status.is_success() || status == StatusCode::TOO_MANY_REQUESTS {
            VaultHealth::Ok
        } else {
            VaultHealth::Error
        }
    }
}

fn transport(err: &reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Transport("request timed out".to_string())
    } else {
        StoreError::Transport(err.to_string())
    }
}

fn is_dot_segment(key: &str) -> bool {
    matches!(key, "." | "..")
}

fn metadata_version(json_response: &Value) -> Option<u64> {
    json_response
        .get("data")
        .and_then(|v| v.get("metadata"))
        .and_then(|v| v.get("version"))
        .and_then(Value::as_u64)
}

/// Pull the history value and version out of a KV-v2 read response.
fn parse_secret(json_response: &Value) -> Result<Secret, StoreError> {
    let Some(data) = json_response.get("data").filter(|v| v.is_object()) else {
        return Err(StoreError::Transport(
            "response is not a KV-v2 secret".to_string(),
        ));
    };
    let version = metadata_version(json_response);

    data.get("data")
        .and_then(|v| v.get(VALUE_FIELD))
        .and_then(Value::as_str)
        .map(|value| Secret {
            value: value.to_string(),
            version,
        })
        .ok_or_else(|| StoreError::Malformed {
            detail: format!("no '{VALUE_FIELD}' field in secret"),
            version,
        })
}

fn write_payload(value: &str, expected_version: Option<u64>) -> Value {
    match expected_version {
        Some(cas) => json!({
            "options": { "cas": cas },
            "data": { VALUE_FIELD: value }
        }),
        None => json!({
            "data": { VALUE_FIELD: value }
        }),
    }
}

impl SecretStore for VaultKvStore {
    async fn get(&self, key: &str) -> Result<Secret, StoreError> {
        let url = self.secret_url(key)?;

        let span = info_span!("vault.kv.read", http.method = "GET");
        let response = self
            .request(Method::GET, url)
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            // a soft deleted secret still reports the version its metadata is at
            let json_response: Value = response.json().await.unwrap_or_default();
            return Err(StoreError::NotFound {
                version: metadata_version(&json_response),
            });
        }

        if !status.is_success() {
            let json_response: Value = response.json().await.unwrap_or_default();
            return Err(StoreError::Transport(format!(
                "{}, {}",
                status,
                vault::vault_error_message(&json_response)
            )));
        }

        let json_response: Value = response.json().await.map_err(|err| transport(&err))?;

        parse_secret(&json_response)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let url = self.secret_url(key)?;

        let span = info_span!("vault.kv.write", http.method = "POST", cas = ?expected_version);
        let response = self
            .request(Method::POST, url)
            .json(&write_payload(value, expected_version))
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let json_response: Value = response.json().await.unwrap_or_default();
        let message = vault::vault_error_message(&json_response);

        if status == StatusCode::BAD_REQUEST && message.contains("check-and-set") {
            return Err(StoreError::Conflict);
        }

        Err(StoreError::Transport(format!("{status}, {message}")))
    }

    fn digest_ceiling(&self) -> Option<usize> {
        self.config.digest_max_len
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> VaultKvStore {
        VaultKvStore::new(
            VaultKvConfig::new(server.uri()),
            SecretString::from("s.token".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn data_path_joins_mount_and_prefix() {
        let config = VaultKvConfig::new("http://vault.tld".to_string())
            .with_mount("/kv/".to_string())
            .with_prefix("/b2c/history/".to_string());
        assert_eq!(config.data_path(), "/v1/kv/data/b2c/history");

        let config = config.with_prefix(String::new());
        assert_eq!(config.data_path(), "/v1/kv/data");
    }

    #[test]
    fn secret_url_encodes_user_id() {
        let store = VaultKvStore::new(
            VaultKvConfig::new("https://vault.tld:8200/v1/auth/approle/login".to_string()),
            SecretString::from("s.token".to_string()),
        )
        .unwrap();

        let url = store.secret_url("a/b c").unwrap();
        assert_eq!(
            url.as_str(),
            "https://vault.tld:8200/v1/secret/data/password-history/a%2Fb%20c"
        );

        let url = store.secret_url("...").unwrap();
        assert_eq!(
            url.as_str(),
            "https://vault.tld:8200/v1/secret/data/password-history/..."
        );

        let url = store.secret_url("%2e").unwrap();
        assert_eq!(
            url.as_str(),
            "https://vault.tld:8200/v1/secret/data/password-history/%252e"
        );

        for key in [".", ".."] {
            assert!(
                matches!(store.secret_url(key), Err(StoreError::InvalidKey(_))),
                "{key} should be refused"
            );
        }
    }

    #[test]
    fn parse_secret_reads_value_and_version() {
        let secret = parse_secret(&json!({
            "data": {
                "data": {"value": "[\"A\"]"},
                "metadata": {"version": 4}
            }
        }));
        assert_eq!(
            secret,
            Ok(Secret {
                value: "[\"A\"]".to_string(),
                version: Some(4),
            })
        );
    }

    #[test]
    fn parse_secret_without_value_is_malformed() {
        let secret = parse_secret(&json!({
            "data": {
                "data": {"other": 1},
                "metadata": {"version": 2}
            }
        }));
        assert!(matches!(
            secret,
            Err(StoreError::Malformed {
                version: Some(2),
                ..
            })
        ));
    }

    #[test]
    fn parse_secret_without_envelope_is_transport() {
        assert!(matches!(
            parse_secret(&json!({"errors": []})),
            Err(StoreError::Transport(_))
        ));
        assert!(matches!(
            parse_secret(&json!({"data": "oops"})),
            Err(StoreError::Transport(_))
        ));
    }

    #[test]
    fn write_payload_adds_cas_only_when_expected() {
        assert_eq!(
            write_payload("[]", None),
            json!({"data": {"value": "[]"}})
        );
        assert_eq!(
            write_payload("[]", Some(0)),
            json!({"options": {"cas": 0}, "data": {"value": "[]"}})
        );
    }

    #[tokio::test]
    async fn get_returns_secret() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/password-history/alice"))
            .and(header("X-Vault-Token", "s.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "data": {"value": "[\"ABC\"]"},
                    "metadata": {"version": 1}
                }
            })))
            .mount(&server)
            .await;

        let secret = store(&server).get("alice").await.unwrap();
        assert_eq!(secret.value, "[\"ABC\"]");
        assert_eq!(secret.version, Some(1));
    }

    #[tokio::test]
    async fn get_maps_404_to_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/password-history/alice"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": []})))
            .mount(&server)
            .await;

        assert_eq!(
            store(&server).get("alice").await,
            Err(StoreError::NotFound { version: None })
        );
    }

    #[tokio::test]
    async fn get_keeps_version_of_soft_deleted_secret() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/password-history/alice"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "data": {
                    "data": null,
                    "metadata": {
                        "deletion_time": "2024-05-01T10:00:00Z",
                        "destroyed": false,
                        "version": 3
                    }
                }
            })))
            .mount(&server)
            .await;

        assert_eq!(
            store(&server).get("alice").await,
            Err(StoreError::NotFound { version: Some(3) })
        );
    }

    #[tokio::test]
    async fn get_maps_denied_to_transport() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/password-history/alice"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errors": ["permission denied"]
            })))
            .mount(&server)
            .await;

        let result = store(&server).get("alice").await;
        assert!(matches!(result, Err(StoreError::Transport(msg)) if msg.contains("permission denied")));
    }

    #[tokio::test]
    async fn get_maps_non_json_body_to_transport() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/password-history/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let result = store(&server).get("alice").await;
        assert!(matches!(result, Err(StoreError::Transport(_))));
    }

    #[tokio::test]
    async fn dot_segment_key_never_reaches_vault() {
        let server = MockServer::start().await;

        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = store(&server);
        assert!(matches!(store.get("..").await, Err(StoreError::InvalidKey(_))));
        assert!(matches!(
            store.set(".", "[]", None).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn get_times_out_as_transport() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({})),
            )
            .mount(&server)
            .await;

        let store = VaultKvStore::new(
            VaultKvConfig::new(server.uri()).with_timeout(Duration::from_millis(50)),
            SecretString::from("s.token".to_string()),
        )
        .unwrap();

        let result = store.get("alice").await;
        assert!(matches!(result, Err(StoreError::Transport(_))));
    }

    #[tokio::test]
    async fn set_posts_value_with_cas() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/secret/data/password-history/alice"))
            .and(header("X-Vault-Token", "s.token"))
            .and(body_json(json!({
                "options": {"cas": 3},
                "data": {"value": "[\"ABC\"]"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"version": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        store(&server).set("alice", "[\"ABC\"]", Some(3)).await.unwrap();
    }

    #[tokio::test]
    async fn set_maps_cas_mismatch_to_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/secret/data/password-history/alice"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": ["check-and-set parameter did not match the current version"]
            })))
            .mount(&server)
            .await;

        let result = store(&server).set("alice", "[]", Some(1)).await;
        assert_eq!(result, Err(StoreError::Conflict));
    }

    #[tokio::test]
    async fn set_maps_server_error_to_transport() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/secret/data/password-history/alice"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "errors": ["Vault is sealed"]
            })))
            .mount(&server)
            .await;

        let result = store(&server).set("alice", "[]", None).await;
        assert!(matches!(result, Err(StoreError::Transport(msg)) if msg.contains("sealed")));
    }

    #[tokio::test]
    async fn namespace_header_is_sent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header("X-Vault-Namespace", "tenant-a"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let store = VaultKvStore::new(
            VaultKvConfig::new(server.uri()).with_namespace(Some("tenant-a".to_string())),
            SecretString::from("s.token".to_string()),
        )
        .unwrap();

        assert_eq!(
            store.get("alice").await,
            Err(StoreError::NotFound { version: None })
        );
    }

    #[tokio::test]
    async fn health_reports_sealed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/sys/health"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "initialized": true,
                "sealed": true
            })))
            .mount(&server)
            .await;

        assert_eq!(store(&server).health().await, VaultHealth::Sealed);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/sys/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "initialized": true,
                "sealed": false,
                "version": "1.15.0"
            })))
            .mount(&server)
            .await;

        assert_eq!(store(&server).health().await, VaultHealth::Ok);
    }

    #[test]
    fn ceiling_comes_from_config() {
        let store = VaultKvStore::new(
            VaultKvConfig::new("http://vault.tld".to_string()).with_digest_max_len(None),
            SecretString::from("s.token".to_string()),
        )
        .unwrap();
        assert_eq!(store.digest_ceiling(), None);
    }
}
