use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_PLACEHOLDER_FILE: &str = "noimg.png";

#[derive(Clone, Copy)]
enum SetupSection {
    Files,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "files" => Some(Self::Files),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Files => "setup.files",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Files => json!({
            "placeholderFile": DEFAULT_PLACEHOLDER_FILE,
            "assignmentsDir": "assignments",
            "notificationsDir": "notifications"
        }),
    }
}

fn parse_path_segment(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    if s.contains("..") || s.starts_with('/') || s.contains('\\') {
        return Err(format!("{} must be a relative path", key));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Files => match k.as_str() {
                "placeholderFile" | "assignmentsDir" | "notificationsDir" => {
                    obj.insert(k.clone(), Value::String(parse_path_segment(v, k, 100)?));
                }
                _ => return Err(format!("unknown files field: {}", k)),
            },
        }
    }
    Ok(())
}

/// Stored values are layered over defaults so new fields appear without a migration.
fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut merged = default_section(section);
    if let Some(Value::Object(stored)) = db::settings_get_json(conn, section.key())? {
        if let Some(obj) = merged.as_object_mut() {
            for (k, v) in stored {
                obj.insert(k, v);
            }
        }
    }
    Ok(merged)
}

fn files_field(conn: &Connection, field: &str) -> String {
    let defaults = default_section(SetupSection::Files);
    let section = match load_section(conn, SetupSection::Files) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = ?e, field, "files setup unreadable, using defaults");
            defaults.clone()
        }
    };
    section
        .get(field)
        .and_then(|f| f.as_str())
        .or_else(|| defaults.get(field).and_then(|f| f.as_str()))
        .map(str::to_string)
        .unwrap_or_default()
}

/// Collapses a display name into one path segment: separators and dot
/// segments are dropped and the remaining parts joined with `_`.
fn path_segment_from_name(name: &str) -> String {
    let parts: Vec<&str> = name
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "." && *p != "..")
        .collect();
    if parts.is_empty() {
        return "tutor".to_string();
    }
    parts.join("_")
}

/// File reference stored on assignments and notifications created without one.
pub fn placeholder_file(conn: &Connection) -> String {
    files_field(conn, "placeholderFile")
}

/// Uploaded assignment files are filed per tutor.
pub fn assignment_file_reference(conn: &Connection, tutor_name: &str, file_name: &str) -> String {
    format!(
        "{}/{}/{}",
        files_field(conn, "assignmentsDir"),
        path_segment_from_name(tutor_name),
        file_name
    )
}

pub fn notification_file_reference(conn: &Connection, file_name: &str) -> String {
    format!("{}/{}", files_field(conn, "notificationsDir"), file_name)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let files = match load_section(conn, SetupSection::Files) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "files": files }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section_raw, "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tutor_names_become_a_single_segment() {
        assert_eq!(path_segment_from_name("Anita Rao"), "Anita Rao");
        assert_eq!(path_segment_from_name("../Ops/Rao"), "Ops_Rao");
        assert_eq!(path_segment_from_name("a\\..\\b"), "a_b");
        assert_eq!(path_segment_from_name(" / .. / "), "tutor");
    }

    #[test]
    fn unreadable_files_section_falls_back_to_defaults() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE settings(key TEXT PRIMARY KEY, value_json TEXT NOT NULL);
             INSERT INTO settings(key, value_json) VALUES('setup.files', '{not json');",
        )
        .expect("schema");
        assert_eq!(placeholder_file(&conn), DEFAULT_PLACEHOLDER_FILE);
        assert_eq!(notification_file_reference(&conn, "a.pdf"), "notifications/a.pdf");
    }

    #[test]
    fn non_string_stored_value_uses_default() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE settings(key TEXT PRIMARY KEY, value_json TEXT NOT NULL);
             INSERT INTO settings(key, value_json)
               VALUES('setup.files', '{\"placeholderFile\": 7, \"assignmentsDir\": \"hw\"}');",
        )
        .expect("schema");
        assert_eq!(placeholder_file(&conn), DEFAULT_PLACEHOLDER_FILE);
        assert_eq!(
            assignment_file_reference(&conn, "R/ao", "x.pdf"),
            "hw/R_ao/x.pdf"
        );
    }
}
