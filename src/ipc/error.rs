use rusqlite::ffi;
use serde_json::json;

use crate::validate::ValidationError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    /// Maps a storage failure that slipped past the explicit checks.
    ///
    /// Unique and primary key violations become `conflict`. A foreign key
    /// violation becomes `protected` on delete and `not_found` otherwise.
    /// Any other constraint (triggers, CHECK, NOT NULL) keeps `code`.
    pub fn db(code: &'static str, e: rusqlite::Error, table: &str) -> Self {
        let message = e.to_string();
        let Some(kind) = constraint_kind(&e) else {
            return Self::new(code, message).with_details(json!({ "table": table }));
        };
        let details = json!({ "table": table, "constraint": kind });
        match kind {
            "unique" => Self::conflict(message).with_details(details),
            "foreign_key" if code == "db_delete_failed" => {
                Self::new("protected", message).with_details(details)
            }
            "foreign_key" => Self::new("not_found", message).with_details(details),
            _ => Self::new(code, message).with_details(details),
        }
    }

    pub fn query(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn constraint_kind(e: &rusqlite::Error) -> Option<&'static str> {
    let rusqlite::Error::SqliteFailure(failure, _) = e else {
        return None;
    };
    if failure.code != rusqlite::ErrorCode::ConstraintViolation {
        return None;
    }
    Some(match failure.extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => "unique",
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => "foreign_key",
        ffi::SQLITE_CONSTRAINT_TRIGGER => "trigger",
        ffi::SQLITE_CONSTRAINT_CHECK => "check",
        ffi::SQLITE_CONSTRAINT_NOTNULL => "not_null",
        _ => "other",
    })
}

impl From<ValidationError> for HandlerErr {
    fn from(e: ValidationError) -> Self {
        Self::new("validation_failed", e.to_string()).with_details(json!({ "field": e.field() }))
    }
}
