use crate::db;
use crate::ipc::error::err;
use crate::ipc::helpers::{bad_params, db_err, with_db, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::settings::{load_section, merge_section_patch, SetupSection};
use rusqlite::Connection;
use serde_json::{Map, Value};

fn handle_setup_get(conn: &Connection, req: &Request) -> HandlerResult {
    let sections: Vec<SetupSection> = match req.params.get("section") {
        None | Some(Value::Null) => SetupSection::ALL.to_vec(),
        Some(v) => {
            let Some(section) = v.as_str().and_then(SetupSection::parse) else {
                return Err(bad_params(req, "unknown section"));
            };
            vec![section]
        }
    };

    let mut out = Map::new();
    for section in sections {
        let value = load_section(conn, section)
            .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))?;
        out.insert(section.name().to_string(), value);
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(conn: &Connection, req: &Request) -> HandlerResult {
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return Err(bad_params(req, "missing section"));
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return Err(bad_params(req, "unknown section"));
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(bad_params(req, "patch must be an object"));
    };

    let mut current = load_section(conn, section)
        .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))?;
    merge_section_patch(section, &mut current, patch_obj).map_err(|msg| bad_params(req, msg))?;
    db::settings_set_json(conn, section.key(), &current).map_err(db_err(req, "db_update_failed"))?;

    tracing::info!(section = section.name(), "settings updated");
    Ok(current)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> HandlerResult = match req.method.as_str() {
        "setup.get" => handle_setup_get,
        "setup.update" => handle_setup_update,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
