//! Conversation engine
//!
//! Runs one inbound message through [`flow::transition`], stores the next
//! session state, then carries out the resulting effects in order. Sends and
//! advisory calls are the only await points; no lock is held across them.

use std::sync::Arc;

use crate::advisor::Advisor;
use crate::clock::Clock;
use crate::config::PROMPT_CHAT_TURNS;
use crate::error::Result;
use crate::export;
use crate::flow::{self, Effect, UserContext};
use crate::model::{ChatTurn, MeasurementEntry, Reading, UserId};
use crate::prompt;
use crate::session::SessionStore;
use crate::store::Repository;
use crate::transport::{
    ChatTransport, Document, InboundMessage, Keyboard, OutboundMessage, TransportError,
};

pub const ANALYSIS_FAILED: &str =
    "Something went wrong while analysing your pressure. Please try again later.";
pub const DIALOGUE_FAILED: &str = "Sorry, I can't answer right now. Please try again later.";
pub const EXPORT_FAILED: &str = "Could not prepare the export. Please try again later.";
pub const SAVE_FAILED: &str = "⚠️ Could not save your data. Please try again.";

/// Telegram rejects messages longer than 4096 characters
const MAX_MESSAGE_CHARS: usize = 4000;

pub struct ConversationEngine {
    repo: Arc<Repository>,
    sessions: Arc<SessionStore>,
    transport: Arc<dyn ChatTransport>,
    advisor: Arc<dyn Advisor>,
    clock: Arc<dyn Clock>,
}

impl ConversationEngine {
    pub fn new(
        repo: Arc<Repository>,
        sessions: Arc<SessionStore>,
        transport: Arc<dyn ChatTransport>,
        advisor: Arc<dyn Advisor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            sessions,
            transport,
            advisor,
            clock,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Process one inbound message to completion.
    ///
    /// Only state store failures surface as errors. The user's session is
    /// restored to what it was before the message in that case.
    pub async fn handle(&self, inbound: InboundMessage) -> Result<()> {
        let user_id = inbound.user_id;
        let snapshot = self.repo.snapshot();
        let previous = self.sessions.flow(user_id);

        let ctx = UserContext {
            user_id,
            profile: snapshot.profile(user_id),
        };
        let transition = flow::transition(previous.as_ref(), &ctx, &inbound.text);

        let started = flow::Command::parse(&inbound.text).is_some_and(|c| c.starts_flow());
        if let (true, Some(next)) = (started, transition.next.as_ref()) {
            tracing::info!(user_id, flow = next.tag(), "Flow started");
        } else if previous != transition.next {
            tracing::debug!(
                user_id,
                from = previous.as_ref().map_or("idle", |s| s.tag()),
                to = transition.next.as_ref().map_or("idle", |s| s.tag()),
                "Flow transition"
            );
        }
        self.sessions.set_flow(user_id, transition.next);
        drop(snapshot);

        let mut recorded: Option<MeasurementEntry> = None;
        for effect in transition.effects {
            if let Err(e) = self.apply(user_id, effect, &mut recorded).await {
                tracing::error!(user_id, "Failed to commit: {}", e);
                self.sessions.set_flow(user_id, previous);
                self.deliver(user_id, OutboundMessage::plain(SAVE_FAILED))
                    .await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn apply(
        &self,
        user_id: UserId,
        effect: Effect,
        recorded: &mut Option<MeasurementEntry>,
    ) -> Result<()> {
        match effect {
            Effect::Reply(message) => self.deliver(user_id, message).await,
            Effect::CreateProfile(profile) => {
                self.repo.create_profile(profile)?;
                tracing::info!(user_id, "Registered new user");
            }
            Effect::RecordMeasurement { first, second } => {
                *recorded = Some(self.record(user_id, first, second)?);
            }
            Effect::AnalyzeLatest => {
                if let Some(entry) = recorded.take() {
                    self.analyze(user_id, &entry).await;
                }
            }
            Effect::UpdateProfile(update) => {
                self.repo.apply_update(user_id, &update)?;
                tracing::info!(user_id, field = update.field().label(), "Profile updated");
            }
            Effect::ClearHistory => {
                let dropped = self.repo.clear_history(user_id)?;
                tracing::info!(user_id, dropped, "Measurement history cleared");
            }
            Effect::SetReminders(times) => {
                let config = self.repo.set_reminders(user_id, &times)?;
                tracing::info!(user_id, times = %config.times_label(), "Reminders set");
            }
            Effect::DisableReminders => {
                self.repo.disable_reminders(user_id)?;
                tracing::info!(user_id, "Reminders disabled");
            }
            Effect::ShowHistory => self.show_history(user_id).await,
            Effect::ExportHistory => self.export_history(user_id).await,
            Effect::AskAdvisor { question } => self.answer(user_id, question).await,
        }
        Ok(())
    }

    fn record(&self, user_id: UserId, first: Reading, second: Reading) -> Result<MeasurementEntry> {
        let entry = MeasurementEntry {
            timestamp: self.clock.now(),
            first,
            second,
        };
        self.repo.record_measurement(user_id, entry.clone())?;
        tracing::info!(user_id, first = %first, second = %second, "Measurement recorded");
        Ok(entry)
    }

    /// Send the advisory analysis of a just-recorded entry
    async fn analyze(&self, user_id: UserId, entry: &MeasurementEntry) {
        let snapshot = self.repo.snapshot();
        let Some(profile) = snapshot.profile(user_id) else {
            return;
        };
        let history = snapshot.history(user_id);
        let prior = match history.split_last() {
            Some((last, prior)) if last == entry => prior,
            _ => history,
        };
        let prompt = prompt::build_analysis_prompt(profile, entry, prior);

        match self.advisor.advise(&prompt).await {
            Ok(answer) => {
                self.deliver(user_id, OutboundMessage::plain("📊 Analysing your readings..."))
                    .await;
                self.deliver(user_id, OutboundMessage::plain(answer)).await;
            }
            Err(e) => {
                tracing::error!(user_id, "Analysis request failed: {}", e);
                self.deliver(user_id, OutboundMessage::plain(ANALYSIS_FAILED))
                    .await;
            }
        }
    }

    /// One advisory dialogue turn
    async fn answer(&self, user_id: UserId, question: String) {
        let prompt = {
            let snapshot = self.repo.snapshot();
            let Some(profile) = snapshot.profile(user_id) else {
                return;
            };
            let turns = self.sessions.recent_turns(user_id, PROMPT_CHAT_TURNS);
            prompt::build_dialogue_prompt(profile, snapshot.history(user_id), &turns, &question)
        };

        match self.advisor.advise(&prompt).await {
            Ok(answer) => {
                self.sessions.push_turn(
                    user_id,
                    ChatTurn {
                        question,
                        answer: answer.clone(),
                    },
                );
                self.deliver(user_id, OutboundMessage::new(answer, Keyboard::EndDialogue))
                    .await;
            }
            Err(e) => {
                tracing::error!(user_id, "Dialogue request failed: {}", e);
                self.deliver(
                    user_id,
                    OutboundMessage::new(DIALOGUE_FAILED, Keyboard::EndDialogue),
                )
                .await;
            }
        }
    }

    async fn show_history(&self, user_id: UserId) {
        let snapshot = self.repo.snapshot();
        let history = snapshot.history(user_id);
        if history.is_empty() {
            self.deliver(
                user_id,
                OutboundMessage::plain("You have no measurements yet. Shall we measure? ❤️"),
            )
            .await;
            return;
        }

        for chunk in history_messages(history) {
            self.deliver(user_id, OutboundMessage::plain(chunk)).await;
        }
    }

    async fn export_history(&self, user_id: UserId) {
        let snapshot = self.repo.snapshot();
        let history = snapshot.history(user_id);
        if history.is_empty() {
            self.deliver(
                user_id,
                OutboundMessage::plain("You have no data to export yet. Shall we measure? ❤️"),
            )
            .await;
            return;
        }

        let bytes = match export::history_csv(history) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(user_id, "Export failed: {}", e);
                self.deliver(user_id, OutboundMessage::plain(EXPORT_FAILED))
                    .await;
                return;
            }
        };
        let document = Document {
            file_name: export::export_file_name(user_id),
            bytes,
        };
        match self.transport.send_document(user_id, document).await {
            Ok(()) => {
                self.deliver(user_id, OutboundMessage::plain("📤 Data exported to CSV!"))
                    .await;
            }
            Err(e) => log_delivery_failure(user_id, &e),
        }
    }

    async fn deliver(&self, user_id: UserId, message: OutboundMessage) {
        if let Err(e) = self.transport.send(user_id, message).await {
            log_delivery_failure(user_id, &e);
        }
    }
}

fn log_delivery_failure(user_id: UserId, error: &TransportError) {
    match error {
        TransportError::Blocked => tracing::warn!(user_id, "Bot was blocked by user"),
        other => tracing::warn!(user_id, "Delivery failed: {}", other),
    }
}

/// Render the history as one or more messages under the size limit
fn history_messages(history: &[MeasurementEntry]) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::from("📜 Your measurement history:\n\n");
    for entry in history {
        let block = format!(
            "Date: {}\nFirst: {}\nSecond: {}\n\n",
            entry.display_date(),
            entry.first,
            entry.second
        );
        if current.chars().count() + block.chars().count() > MAX_MESSAGE_CHARS {
            messages.push(std::mem::take(&mut current));
        }
        current.push_str(&block);
    }
    messages.push(current);
    messages
}
