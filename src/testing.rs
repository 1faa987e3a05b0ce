//! In-process fakes for the transport and advisory service
//!
//! Used by unit and integration tests to drive the engine and scheduler
//! without network access.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::advisor::{Advisor, AdvisorError};
use crate::model::UserId;
use crate::transport::{ChatTransport, Document, OutboundMessage, TransportError};

/// Transport that records everything it is asked to send
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(UserId, OutboundMessage)>>,
    documents: Mutex<Vec<(UserId, Document)>>,
    blocked: Mutex<HashSet<UserId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `user_id` fail as if the user blocked the bot
    pub fn block(&self, user_id: UserId) {
        self.blocked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id);
    }

    fn is_blocked(&self, user_id: UserId) -> bool {
        self.blocked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&user_id)
    }

    pub fn messages(&self) -> Vec<(UserId, OutboundMessage)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Texts sent to `user_id`, in order
    pub fn texts_for(&self, user_id: UserId) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, m)| m.text)
            .collect()
    }

    pub fn last_for(&self, user_id: UserId) -> Option<OutboundMessage> {
        self.messages()
            .into_iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, m)| m)
            .last()
    }

    pub fn documents(&self) -> Vec<(UserId, Document)> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, user_id: UserId, message: OutboundMessage) -> Result<(), TransportError> {
        if self.is_blocked(user_id) {
            return Err(TransportError::Blocked);
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((user_id, message));
        Ok(())
    }

    async fn send_document(
        &self,
        user_id: UserId,
        document: Document,
    ) -> Result<(), TransportError> {
        if self.is_blocked(user_id) {
            return Err(TransportError::Blocked);
        }
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((user_id, document));
        Ok(())
    }
}

/// Advisor that replays queued answers and records every prompt.
///
/// When the queue is empty it answers with a fixed text.
#[derive(Default)]
pub struct ScriptedAdvisor {
    replies: Mutex<VecDeque<Result<String, AdvisorError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAdvisor {
    pub const DEFAULT_ANSWER: &'static str = "Keep an eye on salt and sleep well.";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_answer(&self, answer: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(answer.into()));
    }

    pub fn push_failure(&self, error: AdvisorError) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn advise(&self, prompt: &str) -> Result<String, AdvisorError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(Self::DEFAULT_ANSWER.to_string()))
    }
}
