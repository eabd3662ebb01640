use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semester a subject is taught in. Stored as its integer code; 0 is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Semester {
    #[default]
    Unset,
    Semester1,
    Semester2,
    Semester3,
    Semester4,
    Semester5,
    Semester6,
}

impl Semester {
    pub const ALL: [Semester; 6] = [
        Self::Semester1,
        Self::Semester2,
        Self::Semester3,
        Self::Semester4,
        Self::Semester5,
        Self::Semester6,
    ];

    pub const fn code(self) -> i64 {
        match self {
            Self::Unset => 0,
            Self::Semester1 => 1,
            Self::Semester2 => 2,
            Self::Semester3 => 3,
            Self::Semester4 => 4,
            Self::Semester5 => 5,
            Self::Semester6 => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Unset),
            1..=6 => Some(Self::ALL[(code - 1) as usize]),
            _ => None,
        }
    }
}

impl From<Semester> for i64 {
    fn from(s: Semester) -> i64 {
        s.code()
    }
}

impl TryFrom<i64> for Semester {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Semester::from_code(code).ok_or_else(|| format!("unknown semester code {}", code))
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("Unset"),
            other => write!(f, "Semester {}", other.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub username: String,
}

impl Account {
    pub const COLUMNS: &'static str = "id, username";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            username: r.get(1)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub department_head: String,
}

impl Course {
    pub const COLUMNS: &'static str = "id, name, department_head";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            department_head: r.get(2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tutor {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub phone: i64,
}

impl Tutor {
    pub const COLUMNS: &'static str = "id, account_id, name, phone";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            account_id: r.get(1)?,
            name: r.get(2)?,
            phone: r.get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub reg_no: i64,
    pub account_id: i64,
    pub name: String,
    pub address: String,
    pub phone: Option<i64>,
    pub admission_no: i64,
    pub course_id: i64,
    pub tutor_id: i64,
}

impl Student {
    pub const COLUMNS: &'static str =
        "reg_no, account_id, name, address, phone, admission_no, course_id, tutor_id";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            reg_no: r.get(0)?,
            account_id: r.get(1)?,
            name: r.get(2)?,
            address: r.get(3)?,
            phone: r.get(4)?,
            admission_no: r.get(5)?,
            course_id: r.get(6)?,
            tutor_id: r.get(7)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub course_id: i64,
    pub semester: Semester,
}

impl Subject {
    pub const COLUMNS: &'static str = "id, name, course_id, semester";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let code: i64 = r.get(3)?;
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            course_id: r.get(2)?,
            // Codes outside the choices can only come from hand-edited rows.
            semester: Semester::from_code(code).unwrap_or_default(),
        })
    }
}

/// JSON keys of the five mark components, in display order.
pub const SUB_SCORES: [&str; 5] = [
    "firstInternal",
    "secondInternal",
    "firstAssignment",
    "secondAssignment",
    "attendance",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub unique_id: String,
    pub student_reg_no: i64,
    pub subject_id: i64,
    pub first_internal: i64,
    pub second_internal: i64,
    pub first_assignment: i64,
    pub second_assignment: i64,
    pub attendance: i64,
}

impl Mark {
    pub const COLUMNS: &'static str = "unique_id, student_reg_no, subject_id, first_internal, \
         second_internal, first_assignment, second_assignment, attendance";

    pub fn zeroed(unique_id: String, student_reg_no: i64, subject_id: i64) -> Self {
        Self {
            unique_id,
            student_reg_no,
            subject_id,
            first_internal: 0,
            second_internal: 0,
            first_assignment: 0,
            second_assignment: 0,
            attendance: 0,
        }
    }

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            unique_id: r.get(0)?,
            student_reg_no: r.get(1)?,
            subject_id: r.get(2)?,
            first_internal: r.get(3)?,
            second_internal: r.get(4)?,
            first_assignment: r.get(5)?,
            second_assignment: r.get(6)?,
            attendance: r.get(7)?,
        })
    }

    pub fn scores(&self) -> [i64; 5] {
        [
            self.first_internal,
            self.second_internal,
            self.first_assignment,
            self.second_assignment,
            self.attendance,
        ]
    }

    pub fn set_score(&mut self, key: &str, value: i64) -> bool {
        let slot = match key {
            "firstInternal" => &mut self.first_internal,
            "secondInternal" => &mut self.second_internal,
            "firstAssignment" => &mut self.first_assignment,
            "secondAssignment" => &mut self.second_assignment,
            "attendance" => &mut self.attendance,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn total(&self) -> i64 {
        self.scores().iter().sum()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut v = serde_json::json!(self);
        v["total"] = serde_json::json!(self.total());
        v
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: i64,
    pub topic: String,
    pub description: String,
    pub published_at: String,
    pub subject_id: i64,
    pub due_date: String,
    pub tutor_id: i64,
    pub file_reference: String,
}

impl Assignment {
    pub const COLUMNS: &'static str =
        "id, topic, description, published_at, subject_id, due_date, tutor_id, file_reference";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            topic: r.get(1)?,
            description: r.get(2)?,
            published_at: r.get(3)?,
            subject_id: r.get(4)?,
            due_date: r.get(5)?,
            tutor_id: r.get(6)?,
            file_reference: r.get(7)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub topic: String,
    pub published_at: String,
    pub description: String,
    pub file_reference: String,
}

impl Notification {
    pub const COLUMNS: &'static str = "id, topic, published_at, description, file_reference";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            topic: r.get(1)?,
            published_at: r.get(2)?,
            description: r.get(3)?,
            file_reference: r.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semester_codes_round_trip_through_json() {
        assert_eq!(serde_json::json!(Semester::Semester4), serde_json::json!(4));
        assert_eq!(serde_json::json!(Semester::Unset), serde_json::json!(0));
        let s: Semester = serde_json::from_value(serde_json::json!(2)).expect("semester");
        assert_eq!(s, Semester::Semester2);
        assert!(serde_json::from_value::<Semester>(serde_json::json!(9)).is_err());
    }

    #[test]
    fn semester_display_names() {
        assert_eq!(Semester::Semester1.to_string(), "Semester 1");
        assert_eq!(Semester::default().to_string(), "Unset");
    }

    #[test]
    fn mark_total_and_patch() {
        let mut m = Mark::zeroed("u".into(), 1, 2);
        assert_eq!(m.total(), 0);
        assert!(m.set_score("attendance", 40));
        assert!(m.set_score("firstInternal", 35));
        assert!(!m.set_score("finalExam", 10));
        assert_eq!(m.total(), 75);
        let v = m.to_json();
        assert_eq!(v["total"], serde_json::json!(75));
        assert_eq!(v["studentRegNo"], serde_json::json!(1));
    }
}
