//! Reminder message construction and per-recipient dispatch.

use std::fmt::Write as _;

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::error::ReminderError;
use super::model::{DueItem, MatchToken, NotificationKind, Recipient};
use super::recipients::has_submitted;
use crate::settings::{MessageSettings, DEFAULT_DATE_FORMAT};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub id: String,
    pub recipient_id: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub context_url: String,
    pub context_label: String,
    pub custom_payload: serde_json::Value,
    pub created_at: i64,
}

/// Hand-off point to the delivery transport. Implementations run inside the
/// dispatch transaction: returning an error rolls back the dedup claim.
pub trait MessageSink {
    fn deliver(&mut self, conn: &Connection, message: &OutboundMessage) -> anyhow::Result<()>;
}

/// Queues messages in `message_outbox` for an external transport to pick up.
#[derive(Debug, Default)]
pub struct OutboxSink;

impl MessageSink for OutboxSink {
    fn deliver(&mut self, conn: &Connection, message: &OutboundMessage) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO message_outbox(
               id, recipient_id, subject, body_text, body_html,
               context_url, context_label, custom_payload, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &message.id,
                &message.recipient_id,
                &message.subject,
                &message.body_text,
                &message.body_html,
                &message.context_url,
                &message.context_label,
                message.custom_payload.to_string(),
                message.created_at,
            ),
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { message_id: String },
    /// Another run recorded the same match key first.
    AlreadyNotified,
    /// The recipient submitted after expansion.
    Completed,
}

pub struct Dispatcher<'c, S> {
    conn: &'c Connection,
    sink: S,
    settings: MessageSettings,
}

impl<'c, S: MessageSink> Dispatcher<'c, S> {
    pub fn new(conn: &'c Connection, sink: S, settings: MessageSettings) -> Self {
        Self {
            conn,
            sink,
            settings,
        }
    }

    pub fn notify(
        &mut self,
        item: &DueItem,
        recipient: &Recipient,
        kind: NotificationKind,
        now: i64,
    ) -> Result<DispatchOutcome, ReminderError> {
        let tx = self.conn.unchecked_transaction()?;

        if has_submitted(&tx, &item.id, &recipient.user_id)? {
            return Ok(DispatchOutcome::Completed);
        }

        let token = MatchToken::new(kind, &item.id, recipient);
        let claimed = tx.execute(
            "INSERT OR IGNORE INTO notification_records(
               id, due_item_id, user_id, kind, deadline, provenance, match_key, sent_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &item.id,
                &recipient.user_id,
                kind.as_str(),
                recipient.deadline,
                recipient.provenance.as_str(),
                token.key(),
                now,
            ),
        )?;
        if claimed == 0 {
            return Ok(DispatchOutcome::AlreadyNotified);
        }

        let message = build_message(item, recipient, &token, &self.settings, now);
        if let Err(e) = self.sink.deliver(&tx, &message) {
            let _ = tx.rollback();
            return Err(ReminderError::Dispatch {
                due_item_id: item.id.clone(),
                user_id: recipient.user_id.clone(),
                message: format!("{e:#}"),
            });
        }

        tx.commit()?;
        Ok(DispatchOutcome::Sent {
            message_id: message.id,
        })
    }
}

pub fn build_message(
    item: &DueItem,
    recipient: &Recipient,
    token: &MatchToken,
    settings: &MessageSettings,
    now: i64,
) -> OutboundMessage {
    let deadline = format_deadline(recipient.deadline, &settings.date_format);
    let url = item_url(&settings.site_url, &item.id);
    let prefix = if settings.subject_prefix.is_empty() {
        String::new()
    } else {
        format!("[{}] ", settings.subject_prefix)
    };

    let (subject, lead) = match token.kind {
        NotificationKind::DueSoon => (
            format!("{prefix}{} is due soon", item.name),
            format!("{} in {} is due on {}.", item.name, item.course_name, deadline),
        ),
        NotificationKind::Overdue => (
            format!("{prefix}{} is overdue", item.name),
            format!(
                "{} in {} was due on {} and has not been submitted yet.",
                item.name, item.course_name, deadline
            ),
        ),
    };

    let body_text = format!(
        "Hi {},\n\n{}\n\nOpen it here: {}\n",
        recipient.display_name, lead, url
    );
    let body_html = format!(
        "<p>Hi {},</p><p>{}</p><p><a href=\"{}\">{}</a></p>",
        escape_html(&recipient.display_name),
        escape_html(&lead),
        escape_html(&url),
        escape_html(&item.name)
    );

    OutboundMessage {
        id: Uuid::new_v4().to_string(),
        recipient_id: recipient.user_id.clone(),
        subject,
        body_text,
        body_html,
        context_url: url,
        context_label: item.name.clone(),
        custom_payload: serde_json::to_value(token).unwrap_or(serde_json::Value::Null),
        created_at: now,
    }
}

pub fn format_deadline(ts: i64, fmt: &str) -> String {
    let Some(dt) = chrono::DateTime::from_timestamp(ts, 0) else {
        return ts.to_string();
    };
    let mut out = String::new();
    if write!(out, "{}", dt.format(fmt)).is_ok() {
        return out;
    }
    out.clear();
    match write!(out, "{}", dt.format(DEFAULT_DATE_FORMAT)) {
        Ok(()) => out,
        Err(_) => ts.to_string(),
    }
}

pub fn item_url(site_url: &str, due_item_id: &str) -> String {
    format!("{}/items/{}", site_url.trim_end_matches('/'), due_item_id)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
