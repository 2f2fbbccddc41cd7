//! Candidate selection: due items whose base deadline or any override
//! deadline falls inside the window.

use std::collections::VecDeque;

use rusqlite::{Connection, OptionalExtension};

use super::error::ReminderError;
use super::model::{DueItem, Window};

pub const DEFAULT_PAGE_SIZE: usize = 100;

const SELECT_PAGE_SQL: &str = "SELECT d.id, d.course_id, c.name, d.name, d.due_at
     FROM due_items d
     JOIN courses c ON c.id = d.course_id
     WHERE d.visible = 1
       AND c.visible = 1
       AND d.id > ?1
       AND (
         (d.due_at IS NOT NULL AND d.due_at > ?2 AND d.due_at < ?3)
         OR EXISTS (
           SELECT 1 FROM due_item_overrides o
           WHERE o.due_item_id = d.id AND o.due_at > ?2 AND o.due_at < ?3
         )
       )
     ORDER BY d.id
     LIMIT ?4";

pub fn load_due_item(conn: &Connection, due_item_id: &str) -> rusqlite::Result<Option<DueItem>> {
    conn.query_row(
        "SELECT d.id, d.course_id, c.name, d.name, d.due_at
         FROM due_items d
         JOIN courses c ON c.id = d.course_id
         WHERE d.id = ?",
        [due_item_id],
        |row| {
            Ok(DueItem {
                id: row.get(0)?,
                course_id: row.get(1)?,
                course_name: row.get(2)?,
                name: row.get(3)?,
                due_at: row.get(4)?,
            })
        },
    )
    .optional()
}

/// Whether a run could ever pick this item up: the item and its course are
/// both visible.
pub fn is_selectable(conn: &Connection, due_item_id: &str) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1
             FROM due_items d
             JOIN courses c ON c.id = d.course_id
             WHERE d.id = ? AND d.visible = 1 AND c.visible = 1",
            [due_item_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Lazy, single-pass cursor over candidate due items.
///
/// Rows are fetched a page at a time (keyset on item id), so no statement
/// stays open between pages and the caller may write through the same
/// connection while iterating.
pub struct DueItemCursor<'c> {
    conn: &'c Connection,
    window: Window,
    page_size: usize,
    last_id: String,
    buffered: VecDeque<DueItem>,
    exhausted: bool,
    yielded: usize,
}

pub fn select_due_items(conn: &Connection, window: Window) -> DueItemCursor<'_> {
    DueItemCursor::with_page_size(conn, window, DEFAULT_PAGE_SIZE)
}

impl<'c> DueItemCursor<'c> {
    pub fn with_page_size(conn: &'c Connection, window: Window, page_size: usize) -> Self {
        Self {
            conn,
            window,
            page_size: page_size.max(1),
            last_id: String::new(),
            buffered: VecDeque::new(),
            exhausted: false,
            yielded: 0,
        }
    }

    /// Release the cursor. Returns how many items were handed out.
    pub fn close(self) -> usize {
        tracing::debug!(yielded = self.yielded, "due item cursor closed");
        self.yielded
    }

    fn fetch_page(&mut self) -> rusqlite::Result<()> {
        let conn = self.conn;
        let mut stmt = conn.prepare_cached(SELECT_PAGE_SQL)?;
        let rows = stmt.query_map(
            (
                &self.last_id,
                self.window.start,
                self.window.end,
                self.page_size as i64,
            ),
            |row| {
                Ok(DueItem {
                    id: row.get(0)?,
                    course_id: row.get(1)?,
                    course_name: row.get(2)?,
                    name: row.get(3)?,
                    due_at: row.get(4)?,
                })
            },
        )?;
        let page = rows.collect::<Result<Vec<_>, _>>()?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.last_id = last.id.clone();
        }
        self.buffered.extend(page);
        Ok(())
    }
}

impl Iterator for DueItemCursor<'_> {
    type Item = Result<DueItem, ReminderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(ReminderError::Selection(e)));
            }
        }
        let item = self.buffered.pop_front()?;
        self.yielded += 1;
        Some(Ok(item))
    }
}
