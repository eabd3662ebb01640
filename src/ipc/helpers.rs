use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};

pub fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str<'a>(params: &'a Value, key: &str) -> Result<Option<&'a str>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", key))),
    }
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Err(HandlerErr::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key))),
    }
}

/// Absent and explicit null both read as `None`.
pub fn optional_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key))),
    }
}

pub fn has_key(params: &Value, key: &str) -> bool {
    params.get(key).is_some()
}

/// `table` and `column` are always literals from the caller, never user input.
pub fn row_exists(
    conn: &Connection,
    table: &str,
    column: &str,
    id: i64,
) -> Result<bool, HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE {} = ?", table, column);
    conn.query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
        .map_err(HandlerErr::query)
}

pub fn require_row(
    conn: &Connection,
    table: &str,
    column: &str,
    id: i64,
    what: &str,
) -> Result<(), HandlerErr> {
    if !row_exists(conn, table, column, id)? {
        return Err(HandlerErr::not_found(what));
    }
    Ok(())
}

pub fn count_where(
    conn: &Connection,
    table: &str,
    column: &str,
    id: i64,
) -> Result<i64, HandlerErr> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?", table, column);
    conn.query_row(&sql, [id], |r| r.get(0))
        .map_err(HandlerErr::query)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Listing without a workspace is not an error: the caller just sees nothing.
pub fn with_conn_or_empty(
    state: &mut AppState,
    req: &Request,
    list_key: &str,
    f: impl FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    if state.db.is_none() {
        let mut result = serde_json::Map::new();
        result.insert(list_key.to_string(), Value::Array(Vec::new()));
        return ok(&req.id, Value::Object(result));
    }
    with_conn(state, req, f)
}
