//! Effective deadline resolution for one recipient.
//!
//! Precedence: a user override always wins. Without one, the earliest group
//! override among the recipient's groups applies (ties fall to the lowest
//! sort order, then override id). Otherwise the base deadline stands.

use std::collections::HashSet;

use rusqlite::Connection;

use super::model::{Override, OverrideTarget, Provenance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub deadline: Option<i64>,
    pub provenance: Provenance,
}

pub fn resolve(
    base_deadline: Option<i64>,
    overrides: &[Override],
    user_id: &str,
    user_groups: &HashSet<String>,
) -> Resolution {
    // At most one per (item, user) under the schema.
    let user_override = overrides
        .iter()
        .filter(|o| matches!(&o.target, OverrideTarget::User(uid) if uid == user_id))
        .min_by(|a, b| (a.due_at, &a.id).cmp(&(b.due_at, &b.id)));
    if let Some(o) = user_override {
        return Resolution {
            deadline: Some(o.due_at),
            provenance: Provenance::User,
        };
    }

    let group_override = overrides
        .iter()
        .filter(|o| matches!(&o.target, OverrideTarget::Group(gid) if user_groups.contains(gid)))
        .min_by(|a, b| {
            let ka = (a.due_at, a.sort_order.unwrap_or(i64::MAX), &a.id);
            let kb = (b.due_at, b.sort_order.unwrap_or(i64::MAX), &b.id);
            ka.cmp(&kb)
        });
    if let Some(o) = group_override {
        return Resolution {
            deadline: Some(o.due_at),
            provenance: Provenance::Group,
        };
    }

    Resolution {
        deadline: base_deadline,
        provenance: Provenance::None,
    }
}

pub fn load_overrides(conn: &Connection, due_item_id: &str) -> rusqlite::Result<Vec<Override>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, due_item_id, user_id, group_id, due_at, sort_order
         FROM due_item_overrides
         WHERE due_item_id = ?
         ORDER BY id",
    )?;
    let rows = stmt.query_map([due_item_id], |row| {
        let user_id: Option<String> = row.get(2)?;
        let group_id: Option<String> = row.get(3)?;
        let target = match (user_id, group_id) {
            (Some(uid), _) => OverrideTarget::User(uid),
            (None, Some(gid)) => OverrideTarget::Group(gid),
            (None, None) => {
                return Err(rusqlite::Error::InvalidColumnType(
                    2,
                    "user_id".to_string(),
                    rusqlite::types::Type::Null,
                ))
            }
        };
        Ok(Override {
            id: row.get(0)?,
            due_item_id: row.get(1)?,
            target,
            due_at: row.get(4)?,
            sort_order: row.get(5)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_override(id: &str, user: &str, due_at: i64) -> Override {
        Override {
            id: id.into(),
            due_item_id: "d1".into(),
            target: OverrideTarget::User(user.into()),
            due_at,
            sort_order: None,
        }
    }

    fn group_override(id: &str, group: &str, due_at: i64, sort_order: Option<i64>) -> Override {
        Override {
            id: id.into(),
            due_item_id: "d1".into(),
            target: OverrideTarget::Group(group.into()),
            due_at,
            sort_order,
        }
    }

    fn groups(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_overrides_falls_back_to_base() {
        let r = resolve(Some(500), &[], "u1", &groups(&[]));
        assert_eq!(r.deadline, Some(500));
        assert_eq!(r.provenance, Provenance::None);

        let unset = resolve(None, &[], "u1", &groups(&[]));
        assert_eq!(unset.deadline, None);
    }

    #[test]
    fn user_override_beats_earlier_group_override() {
        let overrides = vec![
            group_override("o1", "g1", 100, Some(1)),
            user_override("o2", "u1", 900),
        ];
        let r = resolve(Some(500), &overrides, "u1", &groups(&["g1"]));
        assert_eq!(r.deadline, Some(900));
        assert_eq!(r.provenance, Provenance::User);
    }

    #[test]
    fn other_users_override_is_ignored() {
        let overrides = vec![user_override("o1", "u2", 900)];
        let r = resolve(Some(500), &overrides, "u1", &groups(&[]));
        assert_eq!(r.deadline, Some(500));
        assert_eq!(r.provenance, Provenance::None);
    }

    #[test]
    fn earliest_group_override_wins() {
        let overrides = vec![
            group_override("o1", "g1", 800, Some(1)),
            group_override("o2", "g2", 600, Some(2)),
            group_override("o3", "g3", 100, Some(0)),
        ];
        let r = resolve(Some(500), &overrides, "u1", &groups(&["g1", "g2"]));
        assert_eq!(r.deadline, Some(600));
        assert_eq!(r.provenance, Provenance::Group);
    }

    #[test]
    fn group_override_applies_to_unset_base() {
        let overrides = vec![group_override("o1", "g1", 700, None)];
        let r = resolve(None, &overrides, "u1", &groups(&["g1"]));
        assert_eq!(r.deadline, Some(700));
        assert_eq!(r.provenance, Provenance::Group);
    }

    #[test]
    fn equal_group_deadlines_are_deterministic() {
        let a = vec![
            group_override("o2", "g2", 600, None),
            group_override("o1", "g1", 600, Some(3)),
        ];
        let mut b = a.clone();
        b.reverse();
        let ra = resolve(None, &a, "u1", &groups(&["g1", "g2"]));
        let rb = resolve(None, &b, "u1", &groups(&["g1", "g2"]));
        assert_eq!(ra, rb);
        assert_eq!(ra.deadline, Some(600));
    }
}
