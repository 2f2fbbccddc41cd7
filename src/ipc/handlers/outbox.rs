//! Queued reminder messages awaiting pickup by the host's transport.

use crate::export::Exportable;
use crate::ipc::helpers::{bad_params, db_err, optional_bool, optional_str, with_db, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::reminders::dispatch::OutboundMessage;
use rusqlite::Connection;
use serde_json::{json, Value};

fn handle_outbox_list(conn: &Connection, req: &Request) -> HandlerResult {
    let recipient_id = optional_str(req, "recipientId")?;
    let undelivered_only = optional_bool(req, "undeliveredOnly")?.unwrap_or(false);

    let mut stmt = conn
        .prepare(
            "SELECT id, recipient_id, subject, body_text, body_html, context_url,
                    context_label, custom_payload, created_at, delivered_at
             FROM message_outbox
             WHERE (?1 IS NULL OR recipient_id = ?1)
               AND (?2 = 0 OR delivered_at IS NULL)
             ORDER BY created_at, recipient_id, id",
        )
        .map_err(db_err(req, "db_query_failed"))?;

    let messages = stmt
        .query_map((&recipient_id, undelivered_only as i64), |row| {
            let payload_raw: String = row.get(7)?;
            let custom_payload: Value =
                serde_json::from_str(&payload_raw).unwrap_or(Value::String(payload_raw));
            let message = OutboundMessage {
                id: row.get(0)?,
                recipient_id: row.get(1)?,
                subject: row.get(2)?,
                body_text: row.get(3)?,
                body_html: row.get(4)?,
                context_url: row.get(5)?,
                context_label: row.get(6)?,
                custom_payload,
                created_at: row.get(8)?,
            };
            let delivered_at: Option<i64> = row.get(9)?;
            let mut out = message.export();
            out["deliveredAt"] = json!(delivered_at);
            Ok(out)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err(req, "db_query_failed"))?;

    Ok(json!({ "messages": messages }))
}

fn handle_outbox_mark_delivered(conn: &Connection, req: &Request) -> HandlerResult {
    let Some(raw_ids) = req.params.get("messageIds").and_then(|v| v.as_array()) else {
        return Err(bad_params(req, "messageIds must be an array"));
    };
    let mut ids = Vec::with_capacity(raw_ids.len());
    for v in raw_ids {
        let Some(id) = v.as_str() else {
            return Err(bad_params(req, "messageIds must contain strings"));
        };
        ids.push(id.to_string());
    }

    let now = chrono::Utc::now().timestamp();
    let tx = conn
        .unchecked_transaction()
        .map_err(db_err(req, "db_tx_failed"))?;
    let mut updated = 0usize;
    {
        let mut stmt = tx
            .prepare(
                "UPDATE message_outbox SET delivered_at = ?
                 WHERE id = ? AND delivered_at IS NULL",
            )
            .map_err(db_err(req, "db_update_failed"))?;
        for id in &ids {
            updated += stmt
                .execute((now, id))
                .map_err(db_err(req, "db_update_failed"))?;
        }
    }
    tx.commit().map_err(db_err(req, "db_commit_failed"))?;

    Ok(json!({ "updated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> HandlerResult = match req.method.as_str() {
        "outbox.list" => handle_outbox_list,
        "outbox.markDelivered" => handle_outbox_mark_delivered,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
