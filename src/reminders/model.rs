use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueItem {
    pub id: String,
    pub course_id: String,
    pub course_name: String,
    pub name: String,
    /// `None` is the "unset" sentinel.
    pub due_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "id")]
pub enum OverrideTarget {
    User(String),
    Group(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    pub id: String,
    pub due_item_id: String,
    pub target: OverrideTarget,
    pub due_at: i64,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    None,
    User,
    Group,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    DueSoon,
    Overdue,
}

impl NotificationKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dueSoon" => Some(Self::DueSoon),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DueSoon => "dueSoon",
            Self::Overdue => "overdue",
        }
    }
}

/// Open interval `(start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn due_soon(now: i64, horizon_secs: i64) -> Self {
        Self {
            start: now,
            end: now.saturating_add(horizon_secs),
        }
    }

    pub fn overdue(now: i64, lookback_secs: i64) -> Self {
        Self {
            start: now.saturating_sub(lookback_secs),
            end: now,
        }
    }

    pub fn contains(&self, t: i64) -> bool {
        self.start < t && t < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: String,
    pub first_name: String,
    pub display_name: String,
    pub deadline: i64,
    pub provenance: Provenance,
}

/// Dedup token. Field order is part of the stored key; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchToken {
    pub kind: NotificationKind,
    pub due_item_id: String,
    pub deadline: i64,
    pub provenance: Provenance,
}

impl MatchToken {
    pub fn new(kind: NotificationKind, due_item_id: &str, recipient: &Recipient) -> Self {
        Self {
            kind,
            due_item_id: due_item_id.to_string(),
            deadline: recipient.deadline,
            provenance: recipient.provenance,
        }
    }

    pub fn key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{}:{}:{}:{}",
                self.kind.as_str(),
                self.due_item_id,
                self.deadline,
                self.provenance.as_str()
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub due_item_id: String,
    pub user_id: String,
    pub kind: String,
    pub deadline: i64,
    pub provenance: String,
    pub match_key: String,
    pub sent_at: i64,
}
