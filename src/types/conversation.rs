use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Message;

/// A persisted conversation document.
///
/// The store owns `updated_at`; it is restamped on every write and the
/// message list is always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Identifier assigned on first persistence.
    pub id: String,

    /// Every message of the session, in order.
    pub messages: Vec<Message>,

    /// When the store last wrote this document.
    #[serde(with = "crate::utils::time")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    /// Create a new `Conversation` stamped with the current time.
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}
