use crate::credential_store::CredentialStore;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Re-reads the identity files on a fixed interval.
///
/// Polling is used instead of file notifications: the provisioning agent
/// replaces both files with renames, and a reload of unchanged files is cheap.
#[derive(Clone, Debug)]
pub struct RefreshScheduler {
    store: Arc<CredentialStore>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(store: Arc<CredentialStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// The first reload happens one interval after the call. Once the
    /// cancellation is observed no further load is started.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Certificate refresh stopped");
                    break;
                }

                _ = ticker.tick() => {
                    debug!("Checking for new certificate...");
                    if let Err(e) = self.store.reload().await {
                        error!(
                            "Error loading certificate and key, keeping the current one: {:#}",
                            anyhow::Error::new(e)
                        );
                    }
                }
            }
        }
    }

    /// Spawns [`RefreshScheduler::run`] on the current runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> RefreshHandle {
        let task = tokio::spawn(self.run(shutdown.clone()));
        RefreshHandle { shutdown, task }
    }
}

#[derive(Debug)]
pub struct RefreshHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("Certificate refresh task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
