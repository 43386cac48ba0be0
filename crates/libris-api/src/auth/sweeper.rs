//! Background purge of expired refresh tokens

use super::service::AuthService;
use crate::audit::{audit_log, AuditEvent};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Run `purge_expired` every `period` until the returned handle is aborted
///
/// The first sweep runs immediately.
pub fn spawn_refresh_token_sweeper(service: AuthService, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = period.as_secs(), "refresh token sweeper started");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match service.purge_expired().await {
                Ok(0) => {}
                Ok(deleted) => audit_log(&AuditEvent::RefreshTokensPurged {
                    deleted,
                    triggered_by: None,
                }),
                Err(e) => error!(error = %e, "refresh token sweep failed"),
            }
        }
    })
}
