use crate::clock::{self, Clock};
use crate::export::{export_all, Exportable};
use crate::ipc::error::{err, reminder_err};
use crate::ipc::helpers::{
    bad_params, db_err, optional_i64, optional_str, required_str, with_db, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::reminders::{
    self, list_records, list_runs, prune_notification_records, BatchDriver, NotificationKind,
    OutboxSink, ReminderError,
};
use crate::settings::{MessageSettings, ReminderSettings};
use rusqlite::Connection;
use serde_json::{json, Value};

const DEFAULT_RUNS_LIMIT: i64 = 20;
const MAX_RUNS_LIMIT: i64 = 500;

fn request_clock(req: &Request) -> Result<Box<dyn Clock>, Value> {
    clock::from_params(&req.params).map_err(|msg| bad_params(req, msg))
}

fn load_reminder_settings(req: &Request, conn: &Connection) -> Result<ReminderSettings, Value> {
    ReminderSettings::load(conn).map_err(|e| {
        reminder_err(&req.id, &ReminderError::InvalidSettings(format!("{e:#}")))
    })
}

fn handle_run(conn: &Connection, req: &Request) -> HandlerResult {
    let clock = request_clock(req)?;
    let mut settings = load_reminder_settings(req, conn)?;
    if let Some(horizon) = optional_i64(req, "horizonSeconds")? {
        if horizon <= 0 {
            return Err(bad_params(req, "horizonSeconds must be positive"));
        }
        settings.horizon_secs = horizon;
    }
    let messages = MessageSettings::load(conn).map_err(|e| {
        reminder_err(&req.id, &ReminderError::InvalidSettings(format!("{e:#}")))
    })?;

    let mut driver = BatchDriver::new(conn, settings, messages, OutboxSink);
    let summary = driver
        .run(&*clock)
        .map_err(|e| reminder_err(&req.id, &e))?;
    Ok(summary.export())
}

fn handle_preview(conn: &Connection, req: &Request) -> HandlerResult {
    let due_item_id = required_str(req, "dueItemId")?;
    let kind = match optional_str(req, "kind")? {
        None => NotificationKind::DueSoon,
        Some(raw) => NotificationKind::parse(&raw)
            .ok_or_else(|| bad_params(req, "kind must be one of: dueSoon, overdue"))?,
    };
    let now = request_clock(req)?.now();
    let settings = load_reminder_settings(req, conn)?;

    let Some(preview) = reminders::preview(conn, &due_item_id, kind, now, &settings)
        .map_err(|e| reminder_err(&req.id, &e))?
    else {
        return Err(err(&req.id, "not_found", "due item not found", None));
    };
    let window = reminders::window_for(kind, now, &settings);

    Ok(json!({
        "dueItem": preview.item.export(),
        "selectable": preview.selectable,
        "kind": kind.as_str(),
        "now": now,
        "window": { "start": window.start, "end": window.end },
        "expansion": preview.expansion.export()
    }))
}

fn handle_records_list(conn: &Connection, req: &Request) -> HandlerResult {
    let due_item_id = optional_str(req, "dueItemId")?;
    let user_id = optional_str(req, "userId")?;
    let records = list_records(conn, due_item_id.as_deref(), user_id.as_deref())
        .map_err(db_err(req, "db_query_failed"))?;
    Ok(json!({ "records": export_all(&records) }))
}

fn handle_runs_list(conn: &Connection, req: &Request) -> HandlerResult {
    let limit = optional_i64(req, "limit")?.unwrap_or(DEFAULT_RUNS_LIMIT);
    if !(1..=MAX_RUNS_LIMIT).contains(&limit) {
        return Err(bad_params(
            req,
            format!("limit must be in 1..={}", MAX_RUNS_LIMIT),
        ));
    }
    let runs = list_runs(conn, limit).map_err(db_err(req, "db_query_failed"))?;
    Ok(json!({ "runs": runs }))
}

fn handle_prune(conn: &Connection, req: &Request) -> HandlerResult {
    let now = request_clock(req)?.now();
    let settings = load_reminder_settings(req, conn)?;
    let deleted = prune_notification_records(conn, now, settings.retention_days)
        .map_err(db_err(req, "db_delete_failed"))?;
    Ok(json!({
        "deleted": deleted,
        "retentionDays": settings.retention_days
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> HandlerResult = match req.method.as_str() {
        "reminders.run" => handle_run,
        "reminders.preview" => handle_preview,
        "reminders.records.list" => handle_records_list,
        "reminders.runs.list" => handle_runs_list,
        "reminders.prune" => handle_prune,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
