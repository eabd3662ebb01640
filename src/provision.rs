use rusqlite::Connection;
use uuid::Uuid;

use crate::model::Mark;

/// Creates one zeroed mark per subject currently defined for `course_id`.
///
/// Called once by the student creation workflow, inside its transaction.
/// Subjects added to the course later do not get marks for existing students.
pub fn provision_marks_for_student(
    conn: &Connection,
    reg_no: i64,
    course_id: i64,
) -> rusqlite::Result<Vec<Mark>> {
    let mut stmt = conn.prepare("SELECT id FROM subjects WHERE course_id = ? ORDER BY id")?;
    let subject_ids = stmt
        .query_map([course_id], |r| r.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut insert = conn.prepare(
        "INSERT INTO marks(
           unique_id,
           student_reg_no,
           subject_id,
           first_internal,
           second_internal,
           first_assignment,
           second_assignment,
           attendance
         ) VALUES(?, ?, ?, 0, 0, 0, 0, 0)",
    )?;

    let mut created = Vec::with_capacity(subject_ids.len());
    for subject_id in subject_ids {
        let mark = Mark::zeroed(Uuid::new_v4().to_string(), reg_no, subject_id);
        insert.execute((&mark.unique_id, reg_no, subject_id))?;
        created.push(mark);
    }

    tracing::info!(reg_no, course_id, count = created.len(), "provisioned marks");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE subjects(id INTEGER PRIMARY KEY, course_id INTEGER NOT NULL);
             CREATE TABLE marks(
               unique_id TEXT PRIMARY KEY,
               student_reg_no INTEGER NOT NULL,
               subject_id INTEGER NOT NULL,
               first_internal INTEGER NOT NULL,
               second_internal INTEGER NOT NULL,
               first_assignment INTEGER NOT NULL,
               second_assignment INTEGER NOT NULL,
               attendance INTEGER NOT NULL
             );
             INSERT INTO subjects(id, course_id) VALUES (1, 10), (2, 10), (3, 20);",
        )
        .expect("schema");
        conn
    }

    #[test]
    fn one_zeroed_mark_per_course_subject() {
        let conn = memory_db();
        let marks = provision_marks_for_student(&conn, 500, 10).expect("provision");
        assert_eq!(
            marks.iter().map(|m| m.subject_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(marks.iter().all(|m| m.total() == 0 && m.student_reg_no == 500));

        let stored: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM marks WHERE student_reg_no = 500",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(stored, 2);
    }

    #[test]
    fn course_without_subjects_creates_nothing() {
        let conn = memory_db();
        let marks = provision_marks_for_student(&conn, 501, 99).expect("provision");
        assert!(marks.is_empty());
    }
}
