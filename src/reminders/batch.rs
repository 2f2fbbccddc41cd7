//! Batch driver: select candidates, expand recipients, dispatch reminders.
//!
//! No transaction spans a run. Each recipient is committed on its own, so a
//! run that dies halfway is resumed by the next run re-selecting candidates
//! and skipping whatever already has a notification record.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::dispatch::{DispatchOutcome, Dispatcher, MessageSink};
use super::error::ReminderError;
use super::model::NotificationKind;
use super::recipients::RecipientExpander;
use super::select::select_due_items;
use super::window_for;
use crate::clock::Clock;
use crate::settings::{MessageSettings, ReminderSettings};

const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Selecting(NotificationKind),
    Expanding { due_item_id: String },
    Dispatching { due_item_id: String, user_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub now: i64,
    pub horizon_seconds: i64,
    pub overdue_checked: bool,
    pub candidates: usize,
    pub recipients: usize,
    pub sent: usize,
    pub skipped_no_deadline: usize,
    pub skipped_outside_window: usize,
    pub skipped_notified: usize,
    pub skipped_completed: usize,
    pub race_skipped: usize,
    pub failed_items: usize,
    pub failed_dispatches: usize,
}

pub struct BatchDriver<'c, S> {
    conn: &'c Connection,
    settings: ReminderSettings,
    dispatcher: Dispatcher<'c, S>,
    state: BatchState,
}

impl<'c, S: MessageSink> BatchDriver<'c, S> {
    pub fn new(
        conn: &'c Connection,
        settings: ReminderSettings,
        messages: MessageSettings,
        sink: S,
    ) -> Self {
        Self {
            conn,
            settings,
            dispatcher: Dispatcher::new(conn, sink, messages),
            state: BatchState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// One scheduled run. Selection failures abort the run; per-item and
    /// per-recipient failures are counted and skipped.
    pub fn run(&mut self, clock: &dyn Clock) -> Result<RunSummary, ReminderError> {
        let now = clock.now();
        let mut summary = RunSummary {
            run_id: Uuid::new_v4().to_string(),
            now,
            horizon_seconds: self.settings.horizon_secs,
            overdue_checked: self.settings.overdue_enabled,
            ..RunSummary::default()
        };
        tracing::info!(run_id = %summary.run_id, now, horizon = self.settings.horizon_secs, "reminder run started");

        let result = self.run_passes(now, &mut summary);
        self.transition(BatchState::Idle);

        match &result {
            Ok(()) => {
                tracing::info!(
                    run_id = %summary.run_id,
                    candidates = summary.candidates,
                    sent = summary.sent,
                    skipped_notified = summary.skipped_notified,
                    skipped_completed = summary.skipped_completed,
                    failed_items = summary.failed_items,
                    failed_dispatches = summary.failed_dispatches,
                    "reminder run finished"
                );
                self.record_run(&summary, None);
            }
            Err(e) => {
                tracing::error!(run_id = %summary.run_id, error = %e, "reminder run aborted");
                self.record_run(&summary, Some(&e.to_string()));
            }
        }

        result.map(|()| summary)
    }

    fn run_passes(&mut self, now: i64, summary: &mut RunSummary) -> Result<(), ReminderError> {
        let mut expander = RecipientExpander::new(self.conn);

        let mut kinds = vec![NotificationKind::DueSoon];
        if self.settings.overdue_enabled {
            kinds.push(NotificationKind::Overdue);
        }

        for kind in kinds {
            let window = window_for(kind, now, &self.settings);
            self.transition(BatchState::Selecting(kind));
            let mut cursor = select_due_items(self.conn, window);

            while let Some(next) = cursor.next() {
                let item = match next {
                    Ok(item) => item,
                    Err(e) => {
                        cursor.close();
                        return Err(e);
                    }
                };
                summary.candidates += 1;

                self.transition(BatchState::Expanding {
                    due_item_id: item.id.clone(),
                });
                let expansion = match expander.expand(&item, kind, window) {
                    Ok(exp) => exp,
                    Err(e) => {
                        tracing::warn!(due_item_id = %item.id, error = %e, "skipping due item");
                        summary.failed_items += 1;
                        continue;
                    }
                };
                summary.recipients += expansion.recipients.len();
                summary.skipped_no_deadline += expansion.skipped_no_deadline;
                summary.skipped_outside_window += expansion.skipped_outside_window;
                summary.skipped_notified += expansion.skipped_notified;
                summary.skipped_completed += expansion.skipped_completed;

                for recipient in &expansion.recipients {
                    self.transition(BatchState::Dispatching {
                        due_item_id: item.id.clone(),
                        user_id: recipient.user_id.clone(),
                    });
                    match self.dispatcher.notify(&item, recipient, kind, now) {
                        Ok(DispatchOutcome::Sent { message_id }) => {
                            tracing::debug!(
                                %message_id,
                                due_item_id = %item.id,
                                user_id = %recipient.user_id,
                                "reminder queued"
                            );
                            summary.sent += 1;
                        }
                        Ok(DispatchOutcome::Completed) => summary.skipped_completed += 1,
                        Ok(DispatchOutcome::AlreadyNotified) => summary.race_skipped += 1,
                        Err(e) => {
                            tracing::warn!(error = %e, "reminder not sent");
                            summary.failed_dispatches += 1;
                        }
                    }
                }

                if summary.candidates % PROGRESS_EVERY == 0 {
                    tracing::info!(
                        candidates = summary.candidates,
                        sent = summary.sent,
                        "reminder run progress"
                    );
                }
            }

            cursor.close();
        }

        Ok(())
    }

    fn transition(&mut self, next: BatchState) {
        tracing::debug!(from = ?self.state, to = ?next, "batch state");
        self.state = next;
    }

    fn record_run(&self, summary: &RunSummary, error: Option<&str>) {
        let status = if error.is_some() { "failed" } else { "completed" };
        let summary_json = serde_json::to_string(summary).unwrap_or_default();
        if let Err(e) = self.conn.execute(
            "INSERT INTO reminder_runs(id, ran_at, status, summary, error) VALUES(?, ?, ?, ?, ?)",
            (&summary.run_id, summary.now, status, summary_json, error),
        ) {
            tracing::warn!(error = %e, "failed to record reminder run");
        }
    }
}

pub fn list_runs(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, ran_at, status, summary, error
         FROM reminder_runs
         ORDER BY ran_at DESC, rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt.query_map([limit], |row| {
        let summary: Option<String> = row.get(3)?;
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "ranAt": row.get::<_, i64>(1)?,
            "status": row.get::<_, String>(2)?,
            "summary": summary
                .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
                .unwrap_or(serde_json::Value::Null),
            "error": row.get::<_, Option<String>>(4)?,
        }))
    })?;
    rows.collect()
}
