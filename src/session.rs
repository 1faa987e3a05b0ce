//! Volatile per-user conversation state
//!
//! Flow sessions and advisory chat logs live only in memory and are lost on
//! restart. Only the profile, history and reminder maps are persisted.

use crate::config::CHAT_LOG_LIMIT;
use crate::flow::FlowState;
use crate::model::{ChatTurn, UserId};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    flows: HashMap<UserId, FlowState>,
    chat_logs: HashMap<UserId, VecDeque<ChatTurn>>,
}

/// In-memory session table, shared between the dispatch loop and handlers
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a handler panicked mid-update; the maps
        // themselves are still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn flow(&self, user_id: UserId) -> Option<FlowState> {
        self.lock().flows.get(&user_id).cloned()
    }

    /// Replace the user's flow; `None` clears it
    pub fn set_flow(&self, user_id: UserId, state: Option<FlowState>) {
        let mut inner = self.lock();
        match state {
            Some(state) => {
                inner.flows.insert(user_id, state);
            }
            None => {
                inner.flows.remove(&user_id);
            }
        }
    }

    pub fn active_flows(&self) -> usize {
        self.lock().flows.len()
    }

    /// Append a dialogue turn, evicting the oldest beyond the cap
    pub fn push_turn(&self, user_id: UserId, turn: ChatTurn) {
        let mut inner = self.lock();
        let log = inner.chat_logs.entry(user_id).or_default();
        log.push_back(turn);
        while log.len() > CHAT_LOG_LIMIT {
            log.pop_front();
        }
    }

    /// The most recent `limit` turns, oldest first
    pub fn recent_turns(&self, user_id: UserId, limit: usize) -> Vec<ChatTurn> {
        let inner = self.lock();
        let Some(log) = inner.chat_logs.get(&user_id) else {
            return Vec::new();
        };
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    pub fn chat_log_len(&self, user_id: UserId) -> usize {
        self.lock()
            .chat_logs
            .get(&user_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::MeasurementStep;

    fn turn(i: usize) -> ChatTurn {
        ChatTurn {
            question: format!("q{}", i),
            answer: format!("a{}", i),
        }
    }

    #[test]
    fn test_flow_set_and_clear() {
        let store = SessionStore::new();
        assert_eq!(store.flow(1), None);

        store.set_flow(1, Some(FlowState::Measurement(MeasurementStep::First)));
        assert_eq!(
            store.flow(1),
            Some(FlowState::Measurement(MeasurementStep::First))
        );
        assert_eq!(store.active_flows(), 1);

        store.set_flow(1, None);
        assert_eq!(store.flow(1), None);
        assert_eq!(store.active_flows(), 0);
    }

    #[test]
    fn test_flows_are_per_user() {
        let store = SessionStore::new();
        store.set_flow(1, Some(FlowState::Advisory));
        store.set_flow(2, Some(FlowState::Reminders));
        assert_eq!(store.flow(1), Some(FlowState::Advisory));
        assert_eq!(store.flow(2), Some(FlowState::Reminders));
    }

    #[test]
    fn test_chat_log_capped() {
        let store = SessionStore::new();
        for i in 0..12 {
            store.push_turn(5, turn(i));
        }
        assert_eq!(store.chat_log_len(5), CHAT_LOG_LIMIT);

        let recent = store.recent_turns(5, 5);
        let questions: Vec<&str> = recent.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q7", "q8", "q9", "q10", "q11"]);
    }

    #[test]
    fn test_recent_turns_short_log() {
        let store = SessionStore::new();
        store.push_turn(5, turn(0));
        assert_eq!(store.recent_turns(5, 5).len(), 1);
        assert!(store.recent_turns(6, 5).is_empty());
    }
}
