use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    has_key, optional_str, required_i64, required_str, require_row, row_exists, with_conn,
    with_conn_or_empty,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Tutor;
use crate::validate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

const NAME_MAX: usize = 100;

pub fn load_tutor(conn: &Connection, tutor_id: i64) -> Result<Tutor, HandlerErr> {
    let sql = format!("SELECT {} FROM tutors WHERE id = ?", Tutor::COLUMNS);
    conn.query_row(&sql, [tutor_id], Tutor::from_row)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("tutor"))
}

fn tutors_list(conn: &Connection) -> Result<Value, HandlerErr> {
    let sql = format!("SELECT {} FROM tutors ORDER BY name, id", Tutor::COLUMNS);
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let tutors = stmt
        .query_map([], Tutor::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "tutors": tutors }))
}

fn tutors_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let tutor = load_tutor(conn, required_i64(params, "tutorId")?)?;
    Ok(json!({ "tutor": tutor }))
}

fn tutors_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let account_id = required_i64(params, "accountId")?;
    let name = validate::text("name", required_str(params, "name")?, NAME_MAX)?;
    let phone = validate::phone("phone", required_i64(params, "phone")?)?;

    require_row(conn, "accounts", "id", account_id, "account")?;
    if row_exists(conn, "tutors", "account_id", account_id)? {
        return Err(HandlerErr::conflict("account is already linked to a tutor")
            .with_details(json!({ "field": "accountId" })));
    }

    conn.execute(
        "INSERT INTO tutors(account_id, name, phone) VALUES(?, ?, ?)",
        (account_id, &name, phone),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e, "tutors"))?;
    let tutor = Tutor {
        id: conn.last_insert_rowid(),
        account_id,
        name,
        phone,
    };
    tracing::info!(tutor_id = tutor.id, "tutor created");
    Ok(json!({ "tutor": tutor }))
}

fn tutors_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut tutor = load_tutor(conn, required_i64(params, "tutorId")?)?;
    if has_key(params, "name") {
        let raw = optional_str(params, "name")?.unwrap_or_default();
        tutor.name = validate::text("name", raw, NAME_MAX)?;
    }
    if has_key(params, "phone") {
        tutor.phone = validate::phone("phone", required_i64(params, "phone")?)?;
    }

    conn.execute(
        "UPDATE tutors SET name = ?, phone = ? WHERE id = ?",
        (&tutor.name, tutor.phone, tutor.id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e, "tutors"))?;
    Ok(json!({ "tutor": tutor }))
}

/// Cascades to the tutor's students (and their marks) and assignments.
fn tutors_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let tutor_id = required_i64(params, "tutorId")?;
    require_row(conn, "tutors", "id", tutor_id, "tutor")?;
    conn.execute("DELETE FROM tutors WHERE id = ?", [tutor_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e, "tutors"))?;
    tracing::info!(tutor_id, "tutor deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tutors.list" => Some(with_conn_or_empty(state, req, "tutors", |conn, _| {
            tutors_list(conn)
        })),
        "tutors.get" => Some(with_conn(state, req, tutors_get)),
        "tutors.create" => Some(with_conn(state, req, tutors_create)),
        "tutors.update" => Some(with_conn(state, req, tutors_update)),
        "tutors.delete" => Some(with_conn(state, req, tutors_delete)),
        _ => None,
    }
}
