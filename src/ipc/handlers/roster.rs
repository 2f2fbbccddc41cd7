//! Courses, users, enrolments and groups.

use crate::ipc::helpers::{
    bad_params, db_err, optional_bool, optional_str, required_str, require_exists, with_db,
    Entity, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::reminders::Role;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn handle_courses_list(conn: &Connection, req: &Request) -> HandlerResult {
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.short_name,
               c.visible,
               (SELECT COUNT(*) FROM enrolments e WHERE e.course_id = c.id) AS enrolment_count,
               (SELECT COUNT(*) FROM due_items d WHERE d.course_id = c.id) AS due_item_count
             FROM courses c
             ORDER BY c.name, c.id",
        )
        .map_err(db_err(req, "db_query_failed"))?;

    let courses = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let short_name: Option<String> = row.get(2)?;
            let visible: i64 = row.get(3)?;
            let enrolment_count: i64 = row.get(4)?;
            let due_item_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "shortName": short_name,
                "visible": visible != 0,
                "enrolmentCount": enrolment_count,
                "dueItemCount": due_item_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err(req, "db_query_failed"))?;

    Ok(json!({ "courses": courses }))
}

fn handle_courses_create(conn: &Connection, req: &Request) -> HandlerResult {
    let name = required_str(req, "name")?;
    let short_name = optional_str(req, "shortName")?.filter(|s| !s.is_empty());
    let visible = optional_bool(req, "visible")?.unwrap_or(true);

    let course_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO courses(id, name, short_name, visible) VALUES(?, ?, ?, ?)",
        (&course_id, &name, &short_name, visible as i64),
    )
    .map_err(db_err(req, "db_insert_failed"))?;

    Ok(json!({ "courseId": course_id, "name": name }))
}

fn handle_users_create(conn: &Connection, req: &Request) -> HandlerResult {
    let first_name = required_str(req, "firstName")?;
    let last_name = required_str(req, "lastName")?;
    let email = optional_str(req, "email")?.filter(|s| !s.is_empty());

    let user_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, first_name, last_name, email) VALUES(?, ?, ?, ?)",
        (&user_id, &first_name, &last_name, &email),
    )
    .map_err(db_err(req, "db_insert_failed"))?;

    Ok(json!({ "userId": user_id }))
}

fn handle_users_set_suspended(conn: &Connection, req: &Request) -> HandlerResult {
    let user_id = required_str(req, "userId")?;
    let Some(suspended) = optional_bool(req, "suspended")? else {
        return Err(bad_params(req, "missing suspended"));
    };
    require_exists(conn, req, Entity::User, &user_id)?;

    conn.execute(
        "UPDATE users SET suspended = ? WHERE id = ?",
        (suspended as i64, &user_id),
    )
    .map_err(db_err(req, "db_update_failed"))?;

    Ok(json!({ "userId": user_id, "suspended": suspended }))
}

fn handle_enrolments_set(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = required_str(req, "courseId")?;
    let user_id = required_str(req, "userId")?;
    let role_raw = required_str(req, "role")?.to_ascii_lowercase();
    let Some(role) = Role::parse(&role_raw) else {
        return Err(bad_params(
            req,
            "role must be one of: student, teacher, editingteacher, manager, guest",
        ));
    };
    let status = optional_str(req, "status")?
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "active".to_string());
    if status != "active" && status != "suspended" {
        return Err(bad_params(req, "status must be one of: active, suspended"));
    }
    require_exists(conn, req, Entity::Course, &course_id)?;
    require_exists(conn, req, Entity::User, &user_id)?;

    conn.execute(
        "INSERT INTO enrolments(course_id, user_id, role, status) VALUES(?, ?, ?, ?)
         ON CONFLICT(course_id, user_id) DO UPDATE SET
           role = excluded.role,
           status = excluded.status",
        (&course_id, &user_id, role.as_str(), &status),
    )
    .map_err(db_err(req, "db_insert_failed"))?;

    Ok(json!({
        "courseId": course_id,
        "userId": user_id,
        "role": role.as_str(),
        "status": status
    }))
}

fn handle_groups_create(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = required_str(req, "courseId")?;
    let name = required_str(req, "name")?;
    require_exists(conn, req, Entity::Course, &course_id)?;

    let group_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO course_groups(id, course_id, name) VALUES(?, ?, ?)",
        (&group_id, &course_id, &name),
    )
    .map_err(db_err(req, "db_insert_failed"))?;

    Ok(json!({ "groupId": group_id, "name": name }))
}

fn handle_group_members_add(conn: &Connection, req: &Request) -> HandlerResult {
    let group_id = required_str(req, "groupId")?;
    let user_id = required_str(req, "userId")?;
    require_exists(conn, req, Entity::Group, &group_id)?;
    require_exists(conn, req, Entity::User, &user_id)?;

    let added = conn
        .execute(
            "INSERT OR IGNORE INTO group_members(group_id, user_id) VALUES(?, ?)",
            (&group_id, &user_id),
        )
        .map_err(db_err(req, "db_insert_failed"))?;

    Ok(json!({ "added": added == 1 }))
}

fn handle_group_members_remove(conn: &Connection, req: &Request) -> HandlerResult {
    let group_id = required_str(req, "groupId")?;
    let user_id = required_str(req, "userId")?;

    let removed = conn
        .execute(
            "DELETE FROM group_members WHERE group_id = ? AND user_id = ?",
            (&group_id, &user_id),
        )
        .map_err(db_err(req, "db_update_failed"))?;

    Ok(json!({ "removed": removed == 1 }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> HandlerResult = match req.method.as_str() {
        "courses.list" => handle_courses_list,
        "courses.create" => handle_courses_create,
        "users.create" => handle_users_create,
        "users.setSuspended" => handle_users_set_suspended,
        "enrolments.set" => handle_enrolments_set,
        "groups.create" => handle_groups_create,
        "groups.members.add" => handle_group_members_add,
        "groups.members.remove" => handle_group_members_remove,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
