use crate::{
    api,
    cli::{commands::vault::Auth, globals::GlobalArgs, telemetry},
    history::{HistoryConfig, HistoryEngine},
    vault::{
        self,
        kv::{VaultKvConfig, VaultKvStore},
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub vault_url: String,
    pub vault_auth: Auth,
    pub vault_namespace: Option<String>,
    pub vault_kv_mount: String,
    pub vault_kv_prefix: String,
    pub store_timeout_seconds: u64,
    pub digest_max_len: Option<usize>,
    pub history: HistoryConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if Vault login fails or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let mut globals = GlobalArgs::new(args.vault_url);

    let (tx, rx) = mpsc::unbounded_channel();

    match args.vault_auth {
        Auth::Token(token) => {
            info!("Using the provided Vault token, renewal disabled");
            globals.set_token(SecretString::from(token));
        }

        Auth::AppRole {
            role_id,
            secret_id,
            wrapped_token,
        } => {
            // a wrapped token takes precedence, clap rejects having both
            let secret_id = match (wrapped_token, secret_id) {
                (Some(wrapped), _) => {
                    vault::unwrap(&globals.vault_url, &SecretString::from(wrapped))
                        .await
                        .context("Could not unwrap the Vault secret id")?
                }
                (None, Some(secret_id)) => SecretString::from(secret_id),
                (None, None) => anyhow::bail!("Vault secret-id is required"),
            };

            let (token, lease_duration) =
                vault::approle_login(&globals.vault_url, &role_id, &secret_id)
                    .await
                    .context("Vault AppRole login failed")?;

            globals.set_token(token);

            vault::renew::try_renew(&globals, lease_duration, tx.clone()).await?;
        }
    }

    debug!("Global args: {:?}", globals);

    let kv_config = VaultKvConfig::new(globals.vault_url.clone())
        .with_mount(args.vault_kv_mount)
        .with_prefix(args.vault_kv_prefix)
        .with_namespace(args.vault_namespace)
        .with_timeout(Duration::from_secs(args.store_timeout_seconds))
        .with_digest_max_len(args.digest_max_len);

    let store = VaultKvStore::new(kv_config, globals.vault_token.clone())?;

    debug!("History config: {:?}", args.history);

    let engine = HistoryEngine::new(store, args.history);

    let result = api::new(args.port, engine, rx).await;

    telemetry::shutdown_tracer();

    result
}
