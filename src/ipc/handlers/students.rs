use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    has_key, optional_i64, optional_str, required_i64, required_str, require_row, row_exists,
    with_conn, with_conn_or_empty,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::provision::provision_marks_for_student;
use crate::validate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

const NAME_MAX: usize = 100;
const ADDRESS_MAX: usize = 1000;

pub fn load_student(conn: &Connection, reg_no: i64) -> Result<Student, HandlerErr> {
    let sql = format!("SELECT {} FROM students WHERE reg_no = ?", Student::COLUMNS);
    conn.query_row(&sql, [reg_no], Student::from_row)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("student"))
}

fn parse_phone(params: &Value) -> Result<Option<i64>, HandlerErr> {
    match optional_i64(params, "phone")? {
        Some(p) => Ok(Some(validate::phone("phone", p)?)),
        None => Ok(None),
    }
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut conditions = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(course_id) = optional_i64(params, "courseId")? {
        conditions.push("course_id = ?");
        binds.push(SqlValue::Integer(course_id));
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
        "SELECT {} FROM students {} ORDER BY reg_no",
        Student::COLUMNS,
        where_clause
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let students = stmt
        .query_map(params_from_iter(binds), Student::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "students": students }))
}

fn students_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student = load_student(conn, required_i64(params, "regNo")?)?;
    Ok(json!({ "student": student }))
}

/// Inserts the student and provisions one zeroed mark per subject of the
/// course, all in one transaction.
fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student = Student {
        reg_no: required_i64(params, "regNo")?,
        account_id: required_i64(params, "accountId")?,
        name: validate::text("name", required_str(params, "name")?, NAME_MAX)?,
        address: validate::text("address", required_str(params, "address")?, ADDRESS_MAX)?,
        phone: parse_phone(params)?,
        admission_no: validate::admission_no(required_i64(params, "admissionNo")?)?,
        course_id: required_i64(params, "courseId")?,
        tutor_id: required_i64(params, "tutorId")?,
    };

    require_row(conn, "accounts", "id", student.account_id, "account")?;
    require_row(conn, "courses", "id", student.course_id, "course")?;
    require_row(conn, "tutors", "id", student.tutor_id, "tutor")?;
    if row_exists(conn, "students", "reg_no", student.reg_no)? {
        return Err(HandlerErr::conflict("registration number already exists")
            .with_details(json!({ "field": "regNo" })));
    }
    if row_exists(conn, "students", "account_id", student.account_id)? {
        return Err(HandlerErr::conflict("account is already linked to a student")
            .with_details(json!({ "field": "accountId" })));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    if let Err(e) = tx.execute(
        "INSERT INTO students(
           reg_no,
           account_id,
           name,
           address,
           phone,
           admission_no,
           course_id,
           tutor_id
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            student.reg_no,
            student.account_id,
            &student.name,
            &student.address,
            student.phone,
            student.admission_no,
            student.course_id,
            student.tutor_id,
        ),
    ) {
        let _ = tx.rollback();
        return Err(HandlerErr::db("db_insert_failed", e, "students"));
    }

    let marks = match provision_marks_for_student(&tx, student.reg_no, student.course_id) {
        Ok(m) => m,
        Err(e) => {
            let _ = tx.rollback();
            return Err(HandlerErr::db("db_insert_failed", e, "marks"));
        }
    };

    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tracing::info!(reg_no = student.reg_no, marks = marks.len(), "student created");

    let marks: Vec<Value> = marks.iter().map(|m| m.to_json()).collect();
    Ok(json!({ "student": student, "marks": marks }))
}

/// Field updates only. Marks are never provisioned here, so re-saving a
/// student cannot duplicate them.
fn students_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut student = load_student(conn, required_i64(params, "regNo")?)?;
    if has_key(params, "name") {
        let raw = optional_str(params, "name")?.unwrap_or_default();
        student.name = validate::text("name", raw, NAME_MAX)?;
    }
    if has_key(params, "address") {
        let raw = optional_str(params, "address")?.unwrap_or_default();
        student.address = validate::text("address", raw, ADDRESS_MAX)?;
    }
    if has_key(params, "phone") {
        student.phone = parse_phone(params)?;
    }
    if has_key(params, "admissionNo") {
        student.admission_no = validate::admission_no(required_i64(params, "admissionNo")?)?;
    }
    if has_key(params, "courseId") {
        let course_id = required_i64(params, "courseId")?;
        require_row(conn, "courses", "id", course_id, "course")?;
        student.course_id = course_id;
    }
    if has_key(params, "tutorId") {
        let tutor_id = required_i64(params, "tutorId")?;
        require_row(conn, "tutors", "id", tutor_id, "tutor")?;
        student.tutor_id = tutor_id;
    }

    conn.execute(
        "UPDATE students
         SET name = ?, address = ?, phone = ?, admission_no = ?, course_id = ?, tutor_id = ?
         WHERE reg_no = ?",
        (
            &student.name,
            &student.address,
            student.phone,
            student.admission_no,
            student.course_id,
            student.tutor_id,
            student.reg_no,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e, "students"))?;
    Ok(json!({ "student": student }))
}

fn students_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let reg_no = required_i64(params, "regNo")?;
    require_row(conn, "students", "reg_no", reg_no, "student")?;
    conn.execute("DELETE FROM students WHERE reg_no = ?", [reg_no])
        .map_err(|e| HandlerErr::db("db_delete_failed", e, "students"))?;
    tracing::info!(reg_no, "student deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn_or_empty(state, req, "students", students_list)),
        "students.get" => Some(with_conn(state, req, students_get)),
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.update" => Some(with_conn(state, req, students_update)),
        "students.delete" => Some(with_conn(state, req, students_delete)),
        _ => None,
    }
}
