use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    optional_i64, required_i64, required_str, require_row, with_conn, with_conn_or_empty,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Mark, SUB_SCORES};
use crate::validate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn load_mark(conn: &Connection, unique_id: &str) -> Result<Mark, HandlerErr> {
    let sql = format!("SELECT {} FROM marks WHERE unique_id = ?", Mark::COLUMNS);
    conn.query_row(&sql, [unique_id], Mark::from_row)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("mark"))
}

/// Applies whichever sub-scores are present in `params`, validating each.
fn apply_scores(mark: &mut Mark, params: &Value) -> Result<(), HandlerErr> {
    for key in SUB_SCORES {
        if let Some(v) = optional_i64(params, key)? {
            mark.set_score(key, validate::sub_score(key, v)?);
        }
    }
    Ok(())
}

fn marks_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut conditions = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(reg_no) = optional_i64(params, "studentRegNo")? {
        conditions.push("m.student_reg_no = ?");
        binds.push(SqlValue::Integer(reg_no));
    }
    if let Some(subject_id) = optional_i64(params, "subjectId")? {
        conditions.push("m.subject_id = ?");
        binds.push(SqlValue::Integer(subject_id));
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT m.unique_id, m.student_reg_no, m.subject_id, m.first_internal,
                m.second_internal, m.first_assignment, m.second_assignment, m.attendance,
                s.name
         FROM marks m
         JOIN subjects s ON s.id = m.subject_id
         {}
         ORDER BY m.student_reg_no, s.semester, s.name, m.unique_id",
        where_clause
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let marks = stmt
        .query_map(params_from_iter(binds), |row| {
            let mark = Mark::from_row(row)?;
            let subject_name: String = row.get(8)?;
            let mut v = mark.to_json();
            v["subjectName"] = json!(subject_name);
            Ok(v)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "marks": marks }))
}

fn marks_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mark = load_mark(conn, required_str(params, "markId")?)?;
    Ok(json!({ "mark": mark.to_json() }))
}

/// Manual entry. Nothing stops a second mark for the same student and subject.
fn marks_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_reg_no = required_i64(params, "studentRegNo")?;
    let subject_id = required_i64(params, "subjectId")?;
    let mut mark = Mark::zeroed(Uuid::new_v4().to_string(), student_reg_no, subject_id);
    apply_scores(&mut mark, params)?;

    require_row(conn, "students", "reg_no", student_reg_no, "student")?;
    require_row(conn, "subjects", "id", subject_id, "subject")?;

    conn.execute(
        "INSERT INTO marks(
           unique_id,
           student_reg_no,
           subject_id,
           first_internal,
           second_internal,
           first_assignment,
           second_assignment,
           attendance
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &mark.unique_id,
            mark.student_reg_no,
            mark.subject_id,
            mark.first_internal,
            mark.second_internal,
            mark.first_assignment,
            mark.second_assignment,
            mark.attendance,
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e, "marks"))?;
    Ok(json!({ "mark": mark.to_json() }))
}

fn marks_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut mark = load_mark(conn, required_str(params, "markId")?)?;
    apply_scores(&mut mark, params)?;

    conn.execute(
        "UPDATE marks
         SET first_internal = ?,
             second_internal = ?,
             first_assignment = ?,
             second_assignment = ?,
             attendance = ?
         WHERE unique_id = ?",
        (
            mark.first_internal,
            mark.second_internal,
            mark.first_assignment,
            mark.second_assignment,
            mark.attendance,
            &mark.unique_id,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e, "marks"))?;
    Ok(json!({ "mark": mark.to_json() }))
}

fn marks_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mark_id = required_str(params, "markId")?;
    let changed = conn
        .execute("DELETE FROM marks WHERE unique_id = ?", [mark_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e, "marks"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("mark"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.list" => Some(with_conn_or_empty(state, req, "marks", marks_list)),
        "marks.get" => Some(with_conn(state, req, marks_get)),
        "marks.create" => Some(with_conn(state, req, marks_create)),
        "marks.update" => Some(with_conn(state, req, marks_update)),
        "marks.delete" => Some(with_conn(state, req, marks_delete)),
        _ => None,
    }
}
