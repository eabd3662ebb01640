use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{setup, tutors};
use crate::ipc::helpers::{
    has_key, now_rfc3339, optional_i64, optional_str, required_i64, required_str, require_row,
    with_conn, with_conn_or_empty,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Assignment;
use crate::validate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

pub const TOPIC_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 1000;

fn load_assignment(conn: &Connection, assignment_id: i64) -> Result<Assignment, HandlerErr> {
    let sql = format!("SELECT {} FROM assignments WHERE id = ?", Assignment::COLUMNS);
    conn.query_row(&sql, [assignment_id], Assignment::from_row)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("assignment"))
}

/// Accepts RFC 3339 and normalizes to UTC; absent means now.
pub fn parse_published_at(params: &Value) -> Result<String, HandlerErr> {
    let Some(raw) = optional_str(params, "publishedAt")? else {
        return Ok(now_rfc3339());
    };
    chrono::DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| {
            dt.with_timezone(&chrono::Utc)
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        })
        .map_err(|_| {
            HandlerErr::bad_params("publishedAt must be an RFC 3339 timestamp")
                .with_details(json!({ "field": "publishedAt" }))
        })
}

fn parse_due_date(params: &Value) -> Result<String, HandlerErr> {
    let due = validate::date("dueDate", required_str(params, "dueDate")?)?;
    Ok(due.format("%Y-%m-%d").to_string())
}

fn file_reference(
    conn: &Connection,
    params: &Value,
    tutor_name: &str,
) -> Result<Option<String>, HandlerErr> {
    if let Some(reference) = optional_str(params, "fileReference")? {
        return Ok(Some(validate::text("fileReference", reference, 255)?));
    }
    if let Some(file_name) = optional_str(params, "fileName")? {
        let file_name = validate::text("fileName", file_name, 100)?;
        return Ok(Some(setup::assignment_file_reference(
            conn, tutor_name, &file_name,
        )));
    }
    Ok(None)
}

fn assignments_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut conditions = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(subject_id) = optional_i64(params, "subjectId")? {
        conditions.push("subject_id = ?");
        binds.push(SqlValue::Integer(subject_id));
    }
    if let Some(tutor_id) = optional_i64(params, "tutorId")? {
        conditions.push("tutor_id = ?");
        binds.push(SqlValue::Integer(tutor_id));
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM assignments {} ORDER BY published_at DESC, id DESC",
        Assignment::COLUMNS,
        where_clause
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let assignments = stmt
        .query_map(params_from_iter(binds), Assignment::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "assignments": assignments }))
}

fn assignments_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let assignment = load_assignment(conn, required_i64(params, "assignmentId")?)?;
    Ok(json!({ "assignment": assignment }))
}

fn assignments_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let topic = validate::text("topic", required_str(params, "topic")?, TOPIC_MAX)?;
    let description = validate::text(
        "description",
        required_str(params, "description")?,
        DESCRIPTION_MAX,
    )?;
    let due_date = parse_due_date(params)?;
    let published_at = parse_published_at(params)?;
    let subject_id = required_i64(params, "subjectId")?;
    let tutor_id = required_i64(params, "tutorId")?;

    require_row(conn, "subjects", "id", subject_id, "subject")?;
    let tutor = tutors::load_tutor(conn, tutor_id)?;
    let file_reference = match file_reference(conn, params, &tutor.name)? {
        Some(r) => r,
        None => setup::placeholder_file(conn),
    };

    conn.execute(
        "INSERT INTO assignments(
           topic,
           description,
           published_at,
           subject_id,
           due_date,
           tutor_id,
           file_reference
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &topic,
            &description,
            &published_at,
            subject_id,
            &due_date,
            tutor_id,
            &file_reference,
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e, "assignments"))?;
    let assignment = Assignment {
        id: conn.last_insert_rowid(),
        topic,
        description,
        published_at,
        subject_id,
        due_date,
        tutor_id,
        file_reference,
    };
    tracing::info!(assignment_id = assignment.id, subject_id, "assignment published");
    Ok(json!({ "assignment": assignment }))
}

fn assignments_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut a = load_assignment(conn, required_i64(params, "assignmentId")?)?;
    if has_key(params, "topic") {
        let raw = optional_str(params, "topic")?.unwrap_or_default();
        a.topic = validate::text("topic", raw, TOPIC_MAX)?;
    }
    if has_key(params, "description") {
        let raw = optional_str(params, "description")?.unwrap_or_default();
        a.description = validate::text("description", raw, DESCRIPTION_MAX)?;
    }
    if has_key(params, "dueDate") {
        a.due_date = parse_due_date(params)?;
    }
    if has_key(params, "publishedAt") {
        a.published_at = parse_published_at(params)?;
    }
    if has_key(params, "subjectId") {
        let subject_id = required_i64(params, "subjectId")?;
        require_row(conn, "subjects", "id", subject_id, "subject")?;
        a.subject_id = subject_id;
    }
    if has_key(params, "tutorId") {
        let tutor_id = required_i64(params, "tutorId")?;
        require_row(conn, "tutors", "id", tutor_id, "tutor")?;
        a.tutor_id = tutor_id;
    }
    let tutor = tutors::load_tutor(conn, a.tutor_id)?;
    if let Some(reference) = file_reference(conn, params, &tutor.name)? {
        a.file_reference = reference;
    }

    conn.execute(
        "UPDATE assignments
         SET topic = ?, description = ?, published_at = ?, subject_id = ?,
             due_date = ?, tutor_id = ?, file_reference = ?
         WHERE id = ?",
        (
            &a.topic,
            &a.description,
            &a.published_at,
            a.subject_id,
            &a.due_date,
            a.tutor_id,
            &a.file_reference,
            a.id,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e, "assignments"))?;
    Ok(json!({ "assignment": a }))
}

fn assignments_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let assignment_id = required_i64(params, "assignmentId")?;
    let changed = conn
        .execute("DELETE FROM assignments WHERE id = ?", [assignment_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e, "assignments"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("assignment"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(with_conn_or_empty(
            state,
            req,
            "assignments",
            assignments_list,
        )),
        "assignments.get" => Some(with_conn(state, req, assignments_get)),
        "assignments.create" => Some(with_conn(state, req, assignments_create)),
        "assignments.update" => Some(with_conn(state, req, assignments_update)),
        "assignments.delete" => Some(with_conn(state, req, assignments_delete)),
        _ => None,
    }
}
