use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    count_where, has_key, optional_str, required_i64, required_str, require_row, with_conn,
    with_conn_or_empty,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Course;
use crate::validate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

const NAME_MAX: usize = 10;
const DEPARTMENT_HEAD_MAX: usize = 20;

pub fn load_course(conn: &Connection, course_id: i64) -> Result<Course, HandlerErr> {
    let sql = format!("SELECT {} FROM courses WHERE id = ?", Course::COLUMNS);
    conn.query_row(&sql, [course_id], Course::from_row)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("course"))
}

fn courses_list(conn: &Connection) -> Result<Value, HandlerErr> {
    // Correlated subqueries keep the two counts independent of each other.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.department_head,
               (SELECT COUNT(*) FROM subjects s WHERE s.course_id = c.id) AS subject_count,
               (SELECT COUNT(*) FROM students st WHERE st.course_id = c.id) AS student_count
             FROM courses c
             ORDER BY c.name, c.id",
        )
        .map_err(HandlerErr::query)?;
    let courses = stmt
        .query_map([], |row| {
            let course = Course::from_row(row)?;
            let subject_count: i64 = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let mut v = json!(course);
            v["subjectCount"] = json!(subject_count);
            v["studentCount"] = json!(student_count);
            Ok(v)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "courses": courses }))
}

fn courses_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let course = load_course(conn, required_i64(params, "courseId")?)?;
    Ok(json!({ "course": course }))
}

fn courses_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = validate::text("name", required_str(params, "name")?, NAME_MAX)?;
    let department_head = validate::text(
        "departmentHead",
        required_str(params, "departmentHead")?,
        DEPARTMENT_HEAD_MAX,
    )?;

    conn.execute(
        "INSERT INTO courses(name, department_head) VALUES(?, ?)",
        (&name, &department_head),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e, "courses"))?;
    let course = Course {
        id: conn.last_insert_rowid(),
        name,
        department_head,
    };
    tracing::info!(course_id = course.id, "course created");
    Ok(json!({ "course": course }))
}

fn courses_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut course = load_course(conn, required_i64(params, "courseId")?)?;
    if has_key(params, "name") {
        let raw = optional_str(params, "name")?.unwrap_or_default();
        course.name = validate::text("name", raw, NAME_MAX)?;
    }
    if has_key(params, "departmentHead") {
        let raw = optional_str(params, "departmentHead")?.unwrap_or_default();
        course.department_head = validate::text("departmentHead", raw, DEPARTMENT_HEAD_MAX)?;
    }

    conn.execute(
        "UPDATE courses SET name = ?, department_head = ? WHERE id = ?",
        (&course.name, &course.department_head, course.id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e, "courses"))?;
    Ok(json!({ "course": course }))
}

/// Refused while any student is enrolled; otherwise subjects go with it,
/// and their marks and assignments after them.
fn courses_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = required_i64(params, "courseId")?;
    require_row(conn, "courses", "id", course_id, "course")?;

    let enrolled = count_where(conn, "students", "course_id", course_id)?;
    if enrolled > 0 {
        tracing::warn!(course_id, enrolled, "course delete refused");
        return Err(HandlerErr::new(
            "protected",
            "cannot delete course while students reference it",
        )
        .with_details(json!({ "table": "students", "count": enrolled })));
    }

    conn.execute("DELETE FROM courses WHERE id = ?", [course_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e, "courses"))?;
    tracing::info!(course_id, "course deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(with_conn_or_empty(state, req, "courses", |conn, _| {
            courses_list(conn)
        })),
        "courses.get" => Some(with_conn(state, req, courses_get)),
        "courses.create" => Some(with_conn(state, req, courses_create)),
        "courses.update" => Some(with_conn(state, req, courses_update)),
        "courses.delete" => Some(with_conn(state, req, courses_delete)),
        _ => None,
    }
}
