//! Due items, per-user/per-group deadline overrides and submission status.

use crate::export::export_all;
use crate::ipc::error::err;
use crate::ipc::helpers::{
    bad_params, db_err, nullable_i64, optional_bool, optional_i64, optional_str, required_str,
    require_exists, with_db, Entity, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::reminders::overrides::load_overrides;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn handle_due_items_create(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = required_str(req, "courseId")?;
    let name = required_str(req, "name")?;
    let due_at = optional_i64(req, "dueAt")?;
    let visible = optional_bool(req, "visible")?.unwrap_or(true);
    require_exists(conn, req, Entity::Course, &course_id)?;

    let due_item_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO due_items(id, course_id, name, due_at, visible, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &due_item_id,
            &course_id,
            &name,
            due_at,
            visible as i64,
            chrono::Utc::now().timestamp(),
        ),
    )
    .map_err(db_err(req, "db_insert_failed"))?;

    Ok(json!({ "dueItemId": due_item_id, "name": name, "dueAt": due_at }))
}

fn handle_due_items_update(conn: &Connection, req: &Request) -> HandlerResult {
    let due_item_id = required_str(req, "dueItemId")?;
    let name = optional_str(req, "name")?;
    if name.as_deref() == Some("") {
        return Err(bad_params(req, "name must not be empty"));
    }
    let due_at = nullable_i64(req, "dueAt")?;
    let visible = optional_bool(req, "visible")?;
    require_exists(conn, req, Entity::DueItem, &due_item_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err(req, "db_tx_failed"))?;
    if let Some(name) = &name {
        tx.execute(
            "UPDATE due_items SET name = ? WHERE id = ?",
            (name, &due_item_id),
        )
        .map_err(db_err(req, "db_update_failed"))?;
    }
    if let Some(due_at) = due_at {
        tx.execute(
            "UPDATE due_items SET due_at = ? WHERE id = ?",
            (due_at, &due_item_id),
        )
        .map_err(db_err(req, "db_update_failed"))?;
    }
    if let Some(visible) = visible {
        tx.execute(
            "UPDATE due_items SET visible = ? WHERE id = ?",
            (visible as i64, &due_item_id),
        )
        .map_err(db_err(req, "db_update_failed"))?;
    }
    tx.commit().map_err(db_err(req, "db_commit_failed"))?;

    Ok(json!({ "ok": true }))
}

fn handle_due_items_list(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = optional_str(req, "courseId")?;
    let mut stmt = conn
        .prepare(
            "SELECT d.id, d.course_id, d.name, d.due_at, d.visible,
                    (SELECT COUNT(*) FROM due_item_overrides o WHERE o.due_item_id = d.id)
             FROM due_items d
             WHERE (?1 IS NULL OR d.course_id = ?1)
             ORDER BY d.due_at IS NULL, d.due_at, d.name, d.id",
        )
        .map_err(db_err(req, "db_query_failed"))?;

    let items = stmt
        .query_map([&course_id], |row| {
            let id: String = row.get(0)?;
            let course_id: String = row.get(1)?;
            let name: String = row.get(2)?;
            let due_at: Option<i64> = row.get(3)?;
            let visible: i64 = row.get(4)?;
            let override_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "courseId": course_id,
                "name": name,
                "dueAt": due_at,
                "visible": visible != 0,
                "overrideCount": override_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err(req, "db_query_failed"))?;

    Ok(json!({ "dueItems": items }))
}

fn handle_overrides_set(conn: &Connection, req: &Request) -> HandlerResult {
    let due_item_id = required_str(req, "dueItemId")?;
    let user_id = optional_str(req, "userId")?.filter(|s| !s.is_empty());
    let group_id = optional_str(req, "groupId")?.filter(|s| !s.is_empty());
    let Some(due_at) = optional_i64(req, "dueAt")? else {
        return Err(bad_params(req, "missing dueAt"));
    };
    let sort_order = optional_i64(req, "sortOrder")?;
    require_exists(conn, req, Entity::DueItem, &due_item_id)?;

    let upsert = match (&user_id, &group_id) {
        (Some(user_id), None) => {
            require_exists(conn, req, Entity::User, user_id)?;
            conn.execute(
                "INSERT INTO due_item_overrides(id, due_item_id, user_id, due_at, sort_order)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(due_item_id, user_id) DO UPDATE SET
                   due_at = excluded.due_at,
                   sort_order = excluded.sort_order",
                (
                    Uuid::new_v4().to_string(),
                    &due_item_id,
                    user_id,
                    due_at,
                    sort_order,
                ),
            )
        }
        (None, Some(group_id)) => {
            require_exists(conn, req, Entity::Group, group_id)?;
            let same_course: Option<i64> = conn
                .query_row(
                    "SELECT 1
                     FROM course_groups g
                     JOIN due_items d ON d.course_id = g.course_id
                     WHERE g.id = ? AND d.id = ?",
                    (group_id, &due_item_id),
                    |r| r.get(0),
                )
                .optional()
                .map_err(db_err(req, "db_query_failed"))?;
            if same_course.is_none() {
                return Err(bad_params(req, "group does not belong to the due item's course"));
            }
            conn.execute(
                "INSERT INTO due_item_overrides(id, due_item_id, group_id, due_at, sort_order)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(due_item_id, group_id) DO UPDATE SET
                   due_at = excluded.due_at,
                   sort_order = excluded.sort_order",
                (
                    Uuid::new_v4().to_string(),
                    &due_item_id,
                    group_id,
                    due_at,
                    sort_order,
                ),
            )
        }
        _ => return Err(bad_params(req, "exactly one of userId or groupId is required")),
    };
    upsert.map_err(db_err(req, "db_insert_failed"))?;

    let override_id: String = conn
        .query_row(
            "SELECT id FROM due_item_overrides
             WHERE due_item_id = ?1
               AND (user_id = ?2 OR group_id = ?3)",
            (&due_item_id, &user_id, &group_id),
            |r| r.get(0),
        )
        .map_err(db_err(req, "db_query_failed"))?;

    Ok(json!({ "overrideId": override_id }))
}

fn handle_overrides_delete(conn: &Connection, req: &Request) -> HandlerResult {
    let override_id = required_str(req, "overrideId")?;
    let deleted = conn
        .execute("DELETE FROM due_item_overrides WHERE id = ?", [&override_id])
        .map_err(db_err(req, "db_delete_failed"))?;
    if deleted == 0 {
        return Err(err(&req.id, "not_found", "override not found", None));
    }
    Ok(json!({ "ok": true }))
}

fn handle_overrides_list(conn: &Connection, req: &Request) -> HandlerResult {
    let due_item_id = required_str(req, "dueItemId")?;
    require_exists(conn, req, Entity::DueItem, &due_item_id)?;
    let overrides = load_overrides(conn, &due_item_id).map_err(db_err(req, "db_query_failed"))?;
    Ok(json!({ "overrides": export_all(&overrides) }))
}

fn handle_submissions_set(conn: &Connection, req: &Request) -> HandlerResult {
    let due_item_id = required_str(req, "dueItemId")?;
    let user_id = required_str(req, "userId")?;
    let status = required_str(req, "status")?.to_ascii_lowercase();
    if !matches!(status.as_str(), "new" | "draft" | "submitted") {
        return Err(bad_params(req, "status must be one of: new, draft, submitted"));
    }
    require_exists(conn, req, Entity::DueItem, &due_item_id)?;
    require_exists(conn, req, Entity::User, &user_id)?;

    conn.execute(
        "INSERT INTO submissions(due_item_id, user_id, status, updated_at) VALUES(?, ?, ?, ?)
         ON CONFLICT(due_item_id, user_id) DO UPDATE SET
           status = excluded.status,
           updated_at = excluded.updated_at",
        (
            &due_item_id,
            &user_id,
            &status,
            chrono::Utc::now().timestamp(),
        ),
    )
    .map_err(db_err(req, "db_insert_failed"))?;

    Ok(json!({ "dueItemId": due_item_id, "userId": user_id, "status": status }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> HandlerResult = match req.method.as_str() {
        "dueItems.create" => handle_due_items_create,
        "dueItems.update" => handle_due_items_update,
        "dueItems.list" => handle_due_items_list,
        "overrides.set" => handle_overrides_set,
        "overrides.delete" => handle_overrides_delete,
        "overrides.list" => handle_overrides_list,
        "submissions.set" => handle_submissions_set,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
