//! Deadline reminders.
//!
//! A run walks three stages per notification kind:
//!
//! ```text
//! select_due_items(window) ──> RecipientExpander::expand ──> Dispatcher::notify
//!   items with a base or          eligible submitters with      one transaction per
//!   override deadline in the      resolved deadline in window,  recipient: dedup claim,
//!   window                        not notified, not submitted   outbox message
//! ```
//!
//! `BatchDriver` strings the stages together for one scheduled run.

pub mod batch;
pub mod dispatch;
pub mod error;
#[cfg(test)]
pub mod fixtures;
pub mod model;
pub mod overrides;
pub mod recipients;
pub mod records;
pub mod select;

pub use batch::{list_runs, BatchDriver, RunSummary};
pub use dispatch::OutboxSink;
pub use error::ReminderError;
pub use model::{DueItem, NotificationKind, Window};
pub use recipients::{Expansion, RecipientExpander, Role};
pub use records::{list_records, prune_notification_records};
pub use select::{is_selectable, load_due_item};

use rusqlite::Connection;

use crate::settings::ReminderSettings;

/// Window used for `kind` at `now`.
pub fn window_for(kind: NotificationKind, now: i64, settings: &ReminderSettings) -> Window {
    match kind {
        NotificationKind::DueSoon => Window::due_soon(now, settings.horizon_secs),
        NotificationKind::Overdue => Window::overdue(now, settings.overdue_lookback_secs),
    }
}

#[derive(Debug, Clone)]
pub struct Preview {
    pub item: DueItem,
    /// False for hidden items or items in hidden courses; no run selects them.
    pub selectable: bool,
    pub expansion: Expansion,
}

/// Dry run for a single item: who would be reminded right now. Writes nothing.
pub fn preview(
    conn: &Connection,
    due_item_id: &str,
    kind: NotificationKind,
    now: i64,
    settings: &ReminderSettings,
) -> Result<Option<Preview>, ReminderError> {
    let Some(item) = load_due_item(conn, due_item_id)? else {
        return Ok(None);
    };
    let selectable = is_selectable(conn, due_item_id)?;
    let expansion = if selectable {
        let window = window_for(kind, now, settings);
        RecipientExpander::new(conn).expand(&item, kind, window)?
    } else {
        Expansion::default()
    };
    Ok(Some(Preview {
        item,
        selectable,
        expansion,
    }))
}
