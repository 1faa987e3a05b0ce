//! Chat transport boundary
//!
//! The engine and the reminder loop only ever talk to users through
//! [`ChatTransport`]. Delivery failures are reported, never retried.

use async_trait::async_trait;
use thiserror::Error;

use crate::flow::{Command, EDIT_CANCEL, EDIT_RESET_HISTORY};
use crate::model::{Gender, ProfileField, UserId};

/// Fixed set of reply keyboards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyboard {
    MainMenu,
    GenderPicker,
    EditFieldPicker,
    EndDialogue,
    /// Hide any custom keyboard
    Remove,
    /// Leave whatever keyboard the user currently sees
    Keep,
}

impl Keyboard {
    /// Button rows, or `None` when the keyboard carries no buttons
    pub fn rows(&self) -> Option<Vec<Vec<&'static str>>> {
        let rows = match self {
            Keyboard::MainMenu => Command::MENU.iter().map(|c| vec![c.label()]).collect(),
            Keyboard::GenderPicker => Gender::ALL.iter().map(|g| vec![g.label()]).collect(),
            Keyboard::EditFieldPicker => ProfileField::ALL
                .iter()
                .map(|f| f.label())
                .chain([EDIT_RESET_HISTORY, EDIT_CANCEL])
                .map(|label| vec![label])
                .collect(),
            Keyboard::EndDialogue => vec![vec![Command::EndAdvisory.label()]],
            Keyboard::Remove | Keyboard::Keep => return None,
        };
        Some(rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Keyboard,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, Keyboard::Keep)
    }
}

/// One inbound text message from a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: UserId,
    pub text: String,
}

/// A file sent as an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("recipient blocked the bot")]
    Blocked,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, user_id: UserId, message: OutboundMessage) -> Result<(), TransportError>;

    async fn send_document(&self, user_id: UserId, document: Document)
        -> Result<(), TransportError>;
}
