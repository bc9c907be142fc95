//! Connection liveness: waiting for the link to become sendable, noticing
//! when it closes, and keeping it alive with periodic pings.

use cloudlink_protocol::Packet;
use cloudlink_transport::Transport;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::SessionError;
use crate::link::{ConnectionStatus, Link};

impl<T: Transport> Link<T> {
    /// Resolves once the link is open.
    ///
    /// # Errors
    /// [`SessionError::Shutdown`] if the link is shut down first.
    pub async fn wait_until_sendable(&self) -> Result<(), SessionError> {
        let mut status = self.status.subscribe();
        tokio::select! {
            biased;
            () = self.wait_for_shutdown() => Err(SessionError::Shutdown),
            opened = status.wait_for(|s| s.is_open()) => match opened {
                Ok(_) => Ok(()),
                Err(_) => Err(SessionError::Shutdown),
            },
        }
    }

    /// Resolves once the link is shut down.
    ///
    /// The watch guard is released before returning, so callers can select
    /// on this and keep awaiting in the other arms.
    pub(crate) async fn wait_for_shutdown(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let _ = shutdown.wait_for(|down| *down).await;
    }

    /// Resolves once the link is no longer open.
    pub async fn wait_until_closed(&self) {
        let mut status = self.status.subscribe();
        let _ = status.wait_for(|s| !s.is_open()).await;
    }

    /// Sends a ping every `heartbeat_interval` while the link is open.
    ///
    /// Runs until the link is shut down. Missed ticks are skipped; a failed
    /// ping is only logged, since a dead socket is noticed by the pump.
    pub async fn heartbeat(&self) {
        let period = self.config.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shutdown = self.wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::debug!("heartbeat stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if self.status() != ConnectionStatus::Open {
                        continue;
                    }
                    if let Err(e) = self.send_packet(&Packet::ping()).await {
                        tracing::debug!(error = %e, "heartbeat ping failed");
                    }
                }
            }
        }
    }
}
