use chrono::{Duration, Utc};
use serde_json::json;

use crate::schema::TicketStatus;
use crate::state::AppState;

const CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_secs(5);
const CLOSE_AFTER_SECONDS: i64 = 300;

/// Periodically closes tickets that have sat in RESOLVED long enough.
pub async fn run_auto_close(state: AppState) {
    tracing::info!("auto-close task started");
    loop {
        tokio::time::sleep(CHECK_INTERVAL).await;
        match auto_close_tick(&state) {
            Ok(n) if n > 0 => tracing::info!(closed = n, "auto-close tick"),
            Err(e) => {
                tracing::error!(error = %e, "auto-close tick failed");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
            _ => {}
        }
    }
}

/// Close every RESOLVED ticket whose last update is at least five minutes
/// old. Per-ticket failures are logged and skipped.
pub fn auto_close_tick(state: &AppState) -> anyhow::Result<u32> {
    let cutoff = Utc::now() - Duration::seconds(CLOSE_AFTER_SECONDS);
    let mut closed = 0;

    for mut ticket in state.repository.find_by_status(TicketStatus::Resolved) {
        if ticket.updated_at() > cutoff {
            continue;
        }

        match ticket.close() {
            Ok(()) => {
                state.repository.save(ticket.clone());
                state
                    .publisher
                    .publish_ticket_updated(&ticket, json!({"status": TicketStatus::Closed}));
                tracing::info!(ticket_id = %ticket.id(), "auto-closed ticket");
                closed += 1;
            }
            Err(e) => {
                tracing::error!(ticket_id = %ticket.id(), error = %e, "failed to auto-close");
            }
        }
    }

    Ok(closed)
}
