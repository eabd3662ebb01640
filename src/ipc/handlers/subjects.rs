use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    has_key, optional_i64, optional_str, required_i64, required_str, require_row, with_conn,
    with_conn_or_empty,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Semester, Subject};
use crate::validate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

const NAME_MAX: usize = 20;

pub fn load_subject(conn: &Connection, subject_id: i64) -> Result<Subject, HandlerErr> {
    let sql = format!("SELECT {} FROM subjects WHERE id = ?", Subject::COLUMNS);
    conn.query_row(&sql, [subject_id], Subject::from_row)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("subject"))
}

fn parse_semester(params: &Value) -> Result<Semester, HandlerErr> {
    match optional_i64(params, "semester")? {
        None => Ok(Semester::Unset),
        Some(code) => Ok(validate::semester("semester", code)?),
    }
}

fn subject_json(subject: &Subject) -> Value {
    let mut v = json!(subject);
    v["semesterLabel"] = json!(subject.semester.to_string());
    v
}

fn subjects_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = optional_i64(params, "courseId")?;
    let rows = match course_id {
        Some(cid) => {
            let sql = format!(
                "SELECT {} FROM subjects WHERE course_id = ? ORDER BY semester, name, id",
                Subject::COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
            let rows = stmt
                .query_map([cid], Subject::from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>());
            rows
        }
        None => {
            let sql = format!(
                "SELECT {} FROM subjects ORDER BY course_id, semester, name, id",
                Subject::COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
            let rows = stmt
                .query_map([], Subject::from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>());
            rows
        }
    }
    .map_err(HandlerErr::query)?;
    let subjects: Vec<Value> = rows.iter().map(subject_json).collect();
    Ok(json!({ "subjects": subjects }))
}

fn subjects_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = load_subject(conn, required_i64(params, "subjectId")?)?;
    Ok(json!({ "subject": subject_json(&subject) }))
}

/// Students already enrolled in the course get no mark for the new subject.
fn subjects_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = validate::text("name", required_str(params, "name")?, NAME_MAX)?;
    let course_id = required_i64(params, "courseId")?;
    let semester = parse_semester(params)?;
    require_row(conn, "courses", "id", course_id, "course")?;

    conn.execute(
        "INSERT INTO subjects(name, course_id, semester) VALUES(?, ?, ?)",
        (&name, course_id, semester.code()),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e, "subjects"))?;
    let subject = Subject {
        id: conn.last_insert_rowid(),
        name,
        course_id,
        semester,
    };
    tracing::info!(subject_id = subject.id, course_id, "subject created");
    Ok(json!({ "subject": subject_json(&subject) }))
}

fn subjects_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut subject = load_subject(conn, required_i64(params, "subjectId")?)?;
    if has_key(params, "name") {
        let raw = optional_str(params, "name")?.unwrap_or_default();
        subject.name = validate::text("name", raw, NAME_MAX)?;
    }
    if has_key(params, "courseId") {
        let course_id = required_i64(params, "courseId")?;
        require_row(conn, "courses", "id", course_id, "course")?;
        subject.course_id = course_id;
    }
    if has_key(params, "semester") {
        subject.semester = parse_semester(params)?;
    }

    conn.execute(
        "UPDATE subjects SET name = ?, course_id = ?, semester = ? WHERE id = ?",
        (
            &subject.name,
            subject.course_id,
            subject.semester.code(),
            subject.id,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e, "subjects"))?;
    Ok(json!({ "subject": subject_json(&subject) }))
}

/// Cascades to the subject's marks and assignments.
fn subjects_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject_id = required_i64(params, "subjectId")?;
    require_row(conn, "subjects", "id", subject_id, "subject")?;
    conn.execute("DELETE FROM subjects WHERE id = ?", [subject_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e, "subjects"))?;
    tracing::info!(subject_id, "subject deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(with_conn_or_empty(state, req, "subjects", subjects_list)),
        "subjects.get" => Some(with_conn(state, req, subjects_get)),
        "subjects.create" => Some(with_conn(state, req, subjects_create)),
        "subjects.update" => Some(with_conn(state, req, subjects_update)),
        "subjects.delete" => Some(with_conn(state, req, subjects_delete)),
        _ => None,
    }
}
