//! Notification record queries and retention.

use rusqlite::Connection;

use super::model::NotificationRecord;
use crate::settings::MAX_OVERDUE_LOOKBACK_SECS;

const DAY: i64 = 86_400;

pub fn list_records(
    conn: &Connection,
    due_item_id: Option<&str>,
    user_id: Option<&str>,
) -> rusqlite::Result<Vec<NotificationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, due_item_id, user_id, kind, deadline, provenance, match_key, sent_at
         FROM notification_records
         WHERE (?1 IS NULL OR due_item_id = ?1)
           AND (?2 IS NULL OR user_id = ?2)
         ORDER BY sent_at, user_id, deadline",
    )?;
    let rows = stmt.query_map((due_item_id, user_id), |row| {
        Ok(NotificationRecord {
            id: row.get(0)?,
            due_item_id: row.get(1)?,
            user_id: row.get(2)?,
            kind: row.get(3)?,
            deadline: row.get(4)?,
            provenance: row.get(5)?,
            match_key: row.get(6)?,
            sent_at: row.get(7)?,
        })
    })?;
    rows.collect()
}

/// Delete notification records whose deadline is older than the retention
/// period. `retention_days == 0` keeps everything.
///
/// Records stay at least as long as the widest allowed overdue lookback, so a
/// pruned deadline can never fall back inside an overdue window.
pub fn prune_notification_records(
    conn: &Connection,
    now: i64,
    retention_days: i64,
) -> rusqlite::Result<usize> {
    if retention_days <= 0 {
        return Ok(0);
    }
    let keep_secs = retention_days
        .saturating_mul(DAY)
        .max(MAX_OVERDUE_LOOKBACK_SECS);
    let cutoff = now.saturating_sub(keep_secs);
    let deleted = conn.execute(
        "DELETE FROM notification_records WHERE deadline < ?",
        [cutoff],
    )?;
    if deleted > 0 {
        tracing::info!(deleted, cutoff, "pruned notification records");
    }
    Ok(deleted)
}
