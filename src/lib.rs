//! Pressure Assistant - blood pressure tracking chat bot
//!
//! Collects a user profile, records paired blood pressure readings, sends
//! daily measurement reminders, and relays questions to an advisory language
//! model together with the user's data.

pub mod advisor;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod flow;
pub mod model;
pub mod prompt;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod telegram;
pub mod testing;
pub mod transport;
pub mod validate;

pub use error::{Error, Result};
