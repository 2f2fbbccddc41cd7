use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderError {
    /// Candidate query failed; the whole run is abandoned.
    #[error("selecting due items failed: {0}")]
    Selection(#[source] rusqlite::Error),

    #[error("expanding recipients for due item {due_item_id} failed: {source}")]
    Expansion {
        due_item_id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("sending reminder for due item {due_item_id} to user {user_id} failed: {message}")]
    Dispatch {
        due_item_id: String,
        user_id: String,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("invalid reminder settings: {0}")]
    InvalidSettings(String),
}

impl ReminderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Selection(_) => "selection_failed",
            Self::Expansion { .. } => "expansion_failed",
            Self::Dispatch { .. } => "dispatch_failed",
            Self::Storage(_) => "db_query_failed",
            Self::InvalidSettings(_) => "bad_settings",
        }
    }
}
