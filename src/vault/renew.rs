use crate::{cli::globals::GlobalArgs, vault};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{
    sync::mpsc,
    time::{sleep, Duration},
};
use tracing::{debug, error, instrument, warn};

const MAX_ATTEMPTS: u32 = 3;

/// Wait between 70% and 90% of the lease before renewing.
fn jittered(rng: &mut StdRng, lease_duration: u64) -> Duration {
    let factor = rng.gen_range(70..90);
    Duration::from_secs(lease_duration * factor / 100)
}

/// Keep the Vault token alive in the background.
///
/// When the token can't be renewed after three attempts a message is sent on
/// `tx` so the server shuts down instead of running with an expired token.
/// # Errors
/// Returns an error if the renewal task can't be set up.
#[instrument(skip(globals, tx))]
pub async fn try_renew(
    globals: &GlobalArgs,
    lease_duration: u64,
    tx: mpsc::UnboundedSender<()>,
) -> Result<()> {
    tokio::spawn({
        let mut rng = StdRng::from_entropy();
        let mut jittered_lease_duration = jittered(&mut rng, lease_duration);

        let url = globals.vault_url.clone();
        let token = globals.vault_token.clone();

        async move {
            loop {
                debug!(
                    "Will renew token in {} seconds",
                    jittered_lease_duration.as_secs()
                );

                sleep(jittered_lease_duration).await;

                for attempt in 1..=MAX_ATTEMPTS {
                    let backoff_time = 2u64.pow(attempt - 1);

                    if attempt > 1 {
                        warn!("Backing off for {} seconds", backoff_time);
                        sleep(Duration::from_secs(backoff_time)).await;
                    }

                    match vault::renew_token(&url, &token, None).await {
                        Ok(lease_duration) => {
                            jittered_lease_duration = jittered(&mut rng, lease_duration);
                            break;
                        }

                        Err(e) => {
                            error!("Failed to renew token: {}", e);

                            if attempt == MAX_ATTEMPTS {
                                error!("Failed to renew token after {} attempts", MAX_ATTEMPTS);
                                let _ = tx.send(());
                                return;
                            }
                        }
                    }
                }
            }
        }
    });

    Ok(())
}
