use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::assignments::{parse_published_at, DESCRIPTION_MAX, TOPIC_MAX};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    has_key, optional_str, required_i64, required_str, with_conn, with_conn_or_empty,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Notification;
use crate::validate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

fn load_notification(conn: &Connection, notification_id: i64) -> Result<Notification, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM notifications WHERE id = ?",
        Notification::COLUMNS
    );
    conn.query_row(&sql, [notification_id], Notification::from_row)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("notification"))
}

fn file_reference(conn: &Connection, params: &Value) -> Result<Option<String>, HandlerErr> {
    if let Some(reference) = optional_str(params, "fileReference")? {
        return Ok(Some(validate::text("fileReference", reference, 255)?));
    }
    if let Some(file_name) = optional_str(params, "fileName")? {
        let file_name = validate::text("fileName", file_name, 100)?;
        return Ok(Some(setup::notification_file_reference(conn, &file_name)));
    }
    Ok(None)
}

fn notifications_list(conn: &Connection) -> Result<Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM notifications ORDER BY published_at DESC, id DESC",
        Notification::COLUMNS
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let notifications = stmt
        .query_map([], Notification::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "notifications": notifications }))
}

fn notifications_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let n = load_notification(conn, required_i64(params, "notificationId")?)?;
    Ok(json!({ "notification": n }))
}

fn notifications_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let topic = validate::text("topic", required_str(params, "topic")?, TOPIC_MAX)?;
    let description = validate::text(
        "description",
        required_str(params, "description")?,
        DESCRIPTION_MAX,
    )?;
    let published_at = parse_published_at(params)?;
    let file_reference = match file_reference(conn, params)? {
        Some(r) => r,
        None => setup::placeholder_file(conn),
    };

    conn.execute(
        "INSERT INTO notifications(topic, published_at, description, file_reference)
         VALUES(?, ?, ?, ?)",
        (&topic, &published_at, &description, &file_reference),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e, "notifications"))?;
    let notification = Notification {
        id: conn.last_insert_rowid(),
        topic,
        published_at,
        description,
        file_reference,
    };
    tracing::info!(notification_id = notification.id, "notification published");
    Ok(json!({ "notification": notification }))
}

fn notifications_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut n = load_notification(conn, required_i64(params, "notificationId")?)?;
    if has_key(params, "topic") {
        let raw = optional_str(params, "topic")?.unwrap_or_default();
        n.topic = validate::text("topic", raw, TOPIC_MAX)?;
    }
    if has_key(params, "description") {
        let raw = optional_str(params, "description")?.unwrap_or_default();
        n.description = validate::text("description", raw, DESCRIPTION_MAX)?;
    }
    if has_key(params, "publishedAt") {
        n.published_at = parse_published_at(params)?;
    }
    if let Some(reference) = file_reference(conn, params)? {
        n.file_reference = reference;
    }

    conn.execute(
        "UPDATE notifications
         SET topic = ?, published_at = ?, description = ?, file_reference = ?
         WHERE id = ?",
        (
            &n.topic,
            &n.published_at,
            &n.description,
            &n.file_reference,
            n.id,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e, "notifications"))?;
    Ok(json!({ "notification": n }))
}

fn notifications_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let notification_id = required_i64(params, "notificationId")?;
    let changed = conn
        .execute("DELETE FROM notifications WHERE id = ?", [notification_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e, "notifications"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("notification"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.list" => Some(with_conn_or_empty(
            state,
            req,
            "notifications",
            |conn, _| notifications_list(conn),
        )),
        "notifications.get" => Some(with_conn(state, req, notifications_get)),
        "notifications.create" => Some(with_conn(state, req, notifications_create)),
        "notifications.update" => Some(with_conn(state, req, notifications_update)),
        "notifications.delete" => Some(with_conn(state, req, notifications_delete)),
        _ => None,
    }
}
