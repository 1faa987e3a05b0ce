//! Reminder scheduler
//!
//! A single loop ticks every `reminder_interval` (60 s, not aligned to the
//! wall-clock minute). On each tick every active reminder whose time matches
//! the current local `HH:MM` fires, unless the user already has an entry
//! dated today. No per-tick sent flag is kept: "measured today" is the only
//! de-duplication signal.

use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::model::{Snapshot, TimeOfDay, UserId};
use crate::store::Repository;
use crate::transport::{ChatTransport, Keyboard, OutboundMessage, TransportError};

pub const REMINDER_TEXT: &str =
    "⏰ Time to measure your blood pressure! Press 'Measure pressure' when you're ready.";

/// Users to notify at `now`, in ascending id order
pub fn due_reminders(snapshot: &Snapshot, now: DateTime<FixedOffset>) -> Vec<UserId> {
    let time = TimeOfDay::from_time(&now.time());
    let today = now.date_naive();

    snapshot
        .reminder_settings
        .iter()
        .filter(|(_, config)| config.fires_at(time))
        .filter(|(user_id, _)| !snapshot.measured_on(**user_id, today, now.offset()))
        .map(|(user_id, _)| *user_id)
        .collect()
}

pub struct ReminderScheduler {
    repo: Arc<Repository>,
    transport: Arc<dyn ChatTransport>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        repo: Arc<Repository>,
        transport: Arc<dyn ChatTransport>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            transport,
            clock,
            interval,
        }
    }

    /// Run one check and send due reminders. Returns how many were delivered.
    pub async fn tick(&self) -> usize {
        let now = self.clock.now();
        let due = due_reminders(&self.repo.snapshot(), now);
        if due.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for user_id in due {
            let message = OutboundMessage::new(REMINDER_TEXT, Keyboard::MainMenu);
            match self.transport.send(user_id, message).await {
                Ok(()) => {
                    delivered += 1;
                    tracing::debug!(user_id, at = %now.format("%H:%M"), "Reminder sent");
                }
                Err(TransportError::Blocked) => {
                    tracing::warn!(user_id, "Reminder not delivered: bot blocked by user");
                }
                Err(e) => tracing::warn!(user_id, "Reminder not delivered: {}", e),
            }
        }
        delivered
    }

    /// Tick forever
    pub async fn run(self) {
        tracing::info!("Reminder loop started (every {:?})", self.interval);
        loop {
            self.tick().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}
