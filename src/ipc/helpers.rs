use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use super::error::{err, ok};
use super::types::{AppState, Request};

/// Handler bodies return the `result` payload, or a complete error response.
pub type HandlerResult = Result<Value, Value>;

pub fn with_db(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection) -> HandlerResult,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn) {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

pub fn bad_params(req: &Request, message: impl Into<String>) -> Value {
    err(&req.id, "bad_params", message, None)
}

pub fn db_err<'r, E: std::fmt::Display>(
    req: &'r Request,
    code: &'r str,
) -> impl Fn(E) -> Value + 'r {
    move |e| err(&req.id, code, e.to_string(), None)
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    let s = req
        .params
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| bad_params(req, format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(bad_params(req, format!("{} must not be empty", key)));
    }
    Ok(s)
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()))
            .ok_or_else(|| bad_params(req, format!("{} must be a string", key))),
    }
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| bad_params(req, format!("{} must be boolean", key))),
    }
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| bad_params(req, format!("{} must be integer", key))),
    }
}

/// Absent → `None` (leave as is), `null` → `Some(None)` (clear).
pub fn nullable_i64(req: &Request, key: &str) -> Result<Option<Option<i64>>, Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => v
            .as_i64()
            .map(|n| Some(Some(n)))
            .ok_or_else(|| bad_params(req, format!("{} must be integer or null", key))),
    }
}

#[derive(Clone, Copy)]
pub enum Entity {
    Course,
    User,
    Group,
    DueItem,
}

impl Entity {
    fn table(self) -> &'static str {
        match self {
            Self::Course => "courses",
            Self::User => "users",
            Self::Group => "course_groups",
            Self::DueItem => "due_items",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::User => "user",
            Self::Group => "group",
            Self::DueItem => "due item",
        }
    }
}

/// `not_found` unless a row with `id` exists.
pub fn require_exists(conn: &Connection, req: &Request, entity: Entity, id: &str) -> Result<(), Value> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", entity.table());
    let found: Option<i64> = conn
        .query_row(&sql, [id], |r| r.get(0))
        .optional()
        .map_err(db_err(req, "db_query_failed"))?;
    if found.is_none() {
        return Err(err(
            &req.id,
            "not_found",
            format!("{} not found", entity.label()),
            Some(serde_json::json!({ "id": id })),
        ));
    }
    Ok(())
}
