use crate::vault::kv::{DEFAULT_KV_MOUNT, DEFAULT_KV_PREFIX};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_VAULT_URL: &str = "vault-url";
pub const ARG_VAULT_ROLE_ID: &str = "vault-role-id";
pub const ARG_VAULT_SECRET_ID: &str = "vault-secret-id";
pub const ARG_VAULT_WRAPPED_TOKEN: &str = "vault-wrapped-token";
pub const ARG_VAULT_TOKEN: &str = "vault-token";
pub const ARG_VAULT_NAMESPACE: &str = "vault-namespace";
pub const ARG_VAULT_KV_MOUNT: &str = "vault-kv-mount";
pub const ARG_VAULT_KV_PREFIX: &str = "vault-kv-prefix";
pub const ARG_STORE_TIMEOUT: &str = "store-timeout";
pub const ARG_DIGEST_MAX_LEN: &str = "digest-max-len";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VAULT_URL)
                .long(ARG_VAULT_URL)
                .help("Vault AppRole login URL, e.g. https://vault.tld:8200/v1/auth/approle/login")
                .env("PWHISTORY_VAULT_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_VAULT_ROLE_ID)
                .long(ARG_VAULT_ROLE_ID)
                .help("Vault role id")
                .env("PWHISTORY_VAULT_ROLE_ID"),
        )
        .arg(
            Arg::new(ARG_VAULT_SECRET_ID)
                .long(ARG_VAULT_SECRET_ID)
                .help("Vault secret id")
                .env("PWHISTORY_VAULT_SECRET_ID")
                .conflicts_with(ARG_VAULT_WRAPPED_TOKEN),
        )
        .arg(
            Arg::new(ARG_VAULT_WRAPPED_TOKEN)
                .long(ARG_VAULT_WRAPPED_TOKEN)
                .help("Vault response-wrapped secret id")
                .env("PWHISTORY_VAULT_WRAPPED_TOKEN"),
        )
        .arg(
            Arg::new(ARG_VAULT_TOKEN)
                .long(ARG_VAULT_TOKEN)
                .help("Vault token to use as is, skips AppRole login and renewal")
                .env("PWHISTORY_VAULT_TOKEN")
                .hide_env_values(true)
                .conflicts_with_all([
                    ARG_VAULT_ROLE_ID,
                    ARG_VAULT_SECRET_ID,
                    ARG_VAULT_WRAPPED_TOKEN,
                ]),
        )
        .arg(
            Arg::new(ARG_VAULT_NAMESPACE)
                .long(ARG_VAULT_NAMESPACE)
                .help("Vault Enterprise namespace")
                .env("PWHISTORY_VAULT_NAMESPACE"),
        )
        .arg(
            Arg::new(ARG_VAULT_KV_MOUNT)
                .long(ARG_VAULT_KV_MOUNT)
                .help("Vault KV-v2 mount holding the password histories")
                .env("PWHISTORY_VAULT_KV_MOUNT")
                .default_value(DEFAULT_KV_MOUNT),
        )
        .arg(
            Arg::new(ARG_VAULT_KV_PREFIX)
                .long(ARG_VAULT_KV_PREFIX)
                .help("Path inside the mount under which one secret per user is kept")
                .env("PWHISTORY_VAULT_KV_PREFIX")
                .default_value(DEFAULT_KV_PREFIX),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT)
                .long(ARG_STORE_TIMEOUT)
                .help("Timeout in seconds for each Vault KV request")
                .env("PWHISTORY_STORE_TIMEOUT")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_DIGEST_MAX_LEN)
                .long(ARG_DIGEST_MAX_LEN)
                .help("Cut stored digests to this many characters, 0 keeps them whole")
                .env("PWHISTORY_DIGEST_MAX_LEN")
                .default_value("55")
                .value_parser(clap::value_parser!(usize)),
        )
}

/// How the service gets its Vault token.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Token(String),
    AppRole {
        role_id: String,
        secret_id: Option<String>,
        wrapped_token: Option<String>,
    },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.debug_tuple("Token").field(&"***").finish(),
            Self::AppRole {
                role_id,
                secret_id,
                wrapped_token,
            } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("secret_id", &secret_id.as_ref().map(|_| "***"))
                .field("wrapped_token", &wrapped_token.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub auth: Auth,
    pub namespace: Option<String>,
    pub kv_mount: String,
    pub kv_prefix: String,
    pub timeout_seconds: u64,
    pub digest_max_len: Option<usize>,
}

impl Options {
    /// # Errors
    /// Returns an error if a required Vault argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let url = matches
            .get_one::<String>(ARG_VAULT_URL)
            .cloned()
            .context("missing required argument: --vault-url")?;

        let auth = if let Some(token) = matches.get_one::<String>(ARG_VAULT_TOKEN) {
            Auth::Token(token.clone())
        } else {
            let role_id = matches
                .get_one::<String>(ARG_VAULT_ROLE_ID)
                .cloned()
                .context("missing required argument: --vault-role-id")?;
            let secret_id = matches.get_one::<String>(ARG_VAULT_SECRET_ID).cloned();
            let wrapped_token = matches.get_one::<String>(ARG_VAULT_WRAPPED_TOKEN).cloned();

            if secret_id.is_none() && wrapped_token.is_none() {
                anyhow::bail!(
                    "missing required argument: --{ARG_VAULT_SECRET_ID} or --{ARG_VAULT_WRAPPED_TOKEN}"
                );
            }

            Auth::AppRole {
                role_id,
                secret_id,
                wrapped_token,
            }
        };

        let digest_max_len = matches
            .get_one::<usize>(ARG_DIGEST_MAX_LEN)
            .copied()
            .filter(|len| *len > 0);

        Ok(Self {
            url,
            auth,
            namespace: matches.get_one::<String>(ARG_VAULT_NAMESPACE).cloned(),
            kv_mount: matches
                .get_one::<String>(ARG_VAULT_KV_MOUNT)
                .cloned()
                .unwrap_or_else(|| DEFAULT_KV_MOUNT.to_string()),
            kv_prefix: matches
                .get_one::<String>(ARG_VAULT_KV_PREFIX)
                .cloned()
                .unwrap_or_else(|| DEFAULT_KV_PREFIX.to_string()),
            timeout_seconds: matches.get_one::<u64>(ARG_STORE_TIMEOUT).copied().unwrap_or(5),
            digest_max_len,
        })
    }
}
