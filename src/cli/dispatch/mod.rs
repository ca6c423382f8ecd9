//! Turn parsed command-line arguments into the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{history, vault, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let vault_opts = vault::Options::parse(matches)?;
    let history_opts = history::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        vault_url: vault_opts.url,
        vault_auth: vault_opts.auth,
        vault_namespace: vault_opts.namespace,
        vault_kv_mount: vault_opts.kv_mount,
        vault_kv_prefix: vault_opts.kv_prefix,
        store_timeout_seconds: vault_opts.timeout_seconds,
        digest_max_len: vault_opts.digest_max_len,
        history: history_opts.config,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::vault::Auth;
    use crate::history::ReadFailurePolicy;

    const LOGIN_URL: &str = "http://127.0.0.1:8200/v1/auth/approle/login";

    fn server_args(args: &[&str]) -> Result<Args> {
        let matches = crate::cli::commands::new().try_get_matches_from(args)?;
        match handler(&matches)? {
            Action::Server(args) => Ok(args),
        }
    }

    fn with_cleared_vault_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        temp_env::with_vars(
            [
                ("PWHISTORY_PORT", None::<&str>),
                ("PWHISTORY_VAULT_URL", None),
                ("PWHISTORY_VAULT_ROLE_ID", None),
                ("PWHISTORY_VAULT_SECRET_ID", None),
                ("PWHISTORY_VAULT_WRAPPED_TOKEN", None),
                ("PWHISTORY_VAULT_TOKEN", None),
                ("PWHISTORY_DIGEST_MAX_LEN", None),
                ("PWHISTORY_HISTORY_SIZE", None),
                ("PWHISTORY_READ_FAILURE", None),
                ("PWHISTORY_CHECK_AND_SET", None),
            ],
            f,
        )
    }

    #[test]
    fn approle_with_secret_id() -> Result<()> {
        with_cleared_vault_env(|| {
            let args = server_args(&[
                "pwhistory",
                "--vault-url",
                LOGIN_URL,
                "--vault-role-id",
                "role-id",
                "--vault-secret-id",
                "secret-id",
            ])?;

            assert_eq!(args.port, 8080);
            assert_eq!(
                args.vault_auth,
                Auth::AppRole {
                    role_id: "role-id".to_string(),
                    secret_id: Some("secret-id".to_string()),
                    wrapped_token: None,
                }
            );
            assert_eq!(args.digest_max_len, Some(55));
            assert_eq!(args.history.size(), 4);
            assert_eq!(args.history.read_failure(), ReadFailurePolicy::Open);
            assert!(!args.history.check_and_set());
            Ok(())
        })
    }

    #[test]
    fn ambient_token() -> Result<()> {
        with_cleared_vault_env(|| {
            let args = server_args(&[
                "pwhistory",
                "--vault-url",
                LOGIN_URL,
                "--vault-token",
                "s.token",
                "--digest-max-len",
                "0",
                "--history-size",
                "2",
                "--read-failure",
                "closed",
                "--check-and-set",
            ])?;

            assert_eq!(args.vault_auth, Auth::Token("s.token".to_string()));
            assert_eq!(args.digest_max_len, None);
            assert_eq!(args.history.size(), 2);
            assert_eq!(args.history.read_failure(), ReadFailurePolicy::Closed);
            assert!(args.history.check_and_set());
            Ok(())
        })
    }

    #[test]
    fn role_id_required_without_token() {
        with_cleared_vault_env(|| {
            let result = server_args(&["pwhistory", "--vault-url", LOGIN_URL]);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err
                    .to_string()
                    .contains("missing required argument: --vault-role-id"));
            }
        });
    }

    #[test]
    fn secret_id_or_wrapped_token_required() {
        with_cleared_vault_env(|| {
            let result = server_args(&[
                "pwhistory",
                "--vault-url",
                LOGIN_URL,
                "--vault-role-id",
                "role-id",
            ]);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("--vault-wrapped-token"));
            }
        });
    }

    #[test]
    fn debug_hides_credentials() -> Result<()> {
        with_cleared_vault_env(|| {
            let args = server_args(&[
                "pwhistory",
                "--vault-url",
                LOGIN_URL,
                "--vault-role-id",
                "role-id",
                "--vault-wrapped-token",
                "wrapped-secret",
            ])?;
            assert!(!format!("{args:?}").contains("wrapped-secret"));
            Ok(())
        })
    }
}
