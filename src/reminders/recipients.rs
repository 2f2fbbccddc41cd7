//! Recipient expansion for one candidate due item.

use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use super::error::ReminderError;
use super::model::{DueItem, MatchToken, NotificationKind, Recipient, Window};
use super::overrides::{load_overrides, resolve};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Submit,
    Grade,
    ManageCourse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    EditingTeacher,
    Manager,
    Guest,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "editingteacher" => Some(Self::EditingTeacher),
            "manager" => Some(Self::Manager),
            "guest" => Some(Self::Guest),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::EditingTeacher => "editingteacher",
            Self::Manager => "manager",
            Self::Guest => "guest",
        }
    }

    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Student => &[Capability::Submit],
            Self::Teacher => &[Capability::Grade],
            Self::EditingTeacher => &[Capability::Grade, Capability::ManageCourse],
            Self::Manager => &[Capability::Grade, Capability::ManageCourse],
            Self::Guest => &[],
        }
    }

    pub fn can(self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }
}

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    first_name: String,
    last_name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expansion {
    pub recipients: Vec<Recipient>,
    pub skipped_no_deadline: usize,
    pub skipped_outside_window: usize,
    pub skipped_notified: usize,
    pub skipped_completed: usize,
}

/// Expands due items into recipients. Rosters and group memberships are
/// cached per course for the lifetime of the expander (one batch pass).
pub struct RecipientExpander<'c> {
    conn: &'c Connection,
    rosters: HashMap<String, Vec<Account>>,
    memberships: HashMap<(String, String), HashSet<String>>,
}

impl<'c> RecipientExpander<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            rosters: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    pub fn expand(
        &mut self,
        item: &DueItem,
        kind: NotificationKind,
        window: Window,
    ) -> Result<Expansion, ReminderError> {
        self.expand_inner(item, kind, window)
            .map_err(|source| ReminderError::Expansion {
                due_item_id: item.id.clone(),
                source,
            })
    }

    fn expand_inner(
        &mut self,
        item: &DueItem,
        kind: NotificationKind,
        window: Window,
    ) -> rusqlite::Result<Expansion> {
        self.ensure_course_loaded(&item.course_id)?;
        let overrides = load_overrides(self.conn, &item.id)?;
        let no_groups = HashSet::new();
        let mut out = Expansion::default();

        let roster = self
            .rosters
            .get(&item.course_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for account in roster {
            let groups = self
                .memberships
                .get(&(item.course_id.clone(), account.user_id.clone()))
                .unwrap_or(&no_groups);
            let resolution = resolve(item.due_at, &overrides, &account.user_id, groups);
            let Some(deadline) = resolution.deadline else {
                out.skipped_no_deadline += 1;
                continue;
            };
            if !window.contains(deadline) {
                out.skipped_outside_window += 1;
                continue;
            }

            let recipient = Recipient {
                user_id: account.user_id.clone(),
                first_name: account.first_name.clone(),
                display_name: format!("{} {}", account.first_name, account.last_name),
                deadline,
                provenance: resolution.provenance,
            };
            let token = MatchToken::new(kind, &item.id, &recipient);
            if already_notified(self.conn, &recipient.user_id, &token.key())? {
                out.skipped_notified += 1;
                continue;
            }
            if has_submitted(self.conn, &item.id, &recipient.user_id)? {
                out.skipped_completed += 1;
                continue;
            }
            out.recipients.push(recipient);
        }

        Ok(out)
    }

    fn ensure_course_loaded(&mut self, course_id: &str) -> rusqlite::Result<()> {
        if self.rosters.contains_key(course_id) {
            return Ok(());
        }

        let mut stmt = self.conn.prepare_cached(
            "SELECT u.id, u.first_name, u.last_name, e.role
             FROM enrolments e
             JOIN users u ON u.id = e.user_id
             WHERE e.course_id = ?
               AND e.status = 'active'
               AND u.suspended = 0
             ORDER BY u.last_name, u.first_name, u.id",
        )?;
        let rows = stmt
            .query_map([course_id], |row| {
                let role: String = row.get(3)?;
                Ok((
                    Account {
                        user_id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                    },
                    role,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let roster: Vec<Account> = rows
            .into_iter()
            .filter(|(_, role)| {
                Role::parse(role)
                    .map(|r| r.can(Capability::Submit))
                    .unwrap_or(false)
            })
            .map(|(account, _)| account)
            .collect();

        let mut member_stmt = self.conn.prepare_cached(
            "SELECT gm.user_id, gm.group_id
             FROM group_members gm
             JOIN course_groups g ON g.id = gm.group_id
             WHERE g.course_id = ?",
        )?;
        let members = member_stmt
            .query_map([course_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (user_id, group_id) in members {
            self.memberships
                .entry((course_id.to_string(), user_id))
                .or_default()
                .insert(group_id);
        }

        tracing::debug!(course_id, recipients = roster.len(), "roster loaded");
        self.rosters.insert(course_id.to_string(), roster);
        Ok(())
    }
}

pub fn already_notified(conn: &Connection, user_id: &str, match_key: &str) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .prepare_cached("SELECT 1 FROM notification_records WHERE user_id = ? AND match_key = ?")?
        .query_row((user_id, match_key), |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

/// Submission suppression is independent of the deadline value.
pub fn has_submitted(conn: &Connection, due_item_id: &str, user_id: &str) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .prepare_cached(
            "SELECT 1 FROM submissions WHERE due_item_id = ? AND user_id = ? AND status = 'submitted'",
        )?
        .query_row((due_item_id, user_id), |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}
