use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{required_i64, required_str, require_row, with_conn, with_conn_or_empty};
use crate::ipc::types::{AppState, Request};
use crate::model::Account;
use crate::validate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

fn accounts_list(conn: &Connection) -> Result<Value, HandlerErr> {
    let sql = format!("SELECT {} FROM accounts ORDER BY username", Account::COLUMNS);
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let accounts = stmt
        .query_map([], Account::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "accounts": accounts }))
}

fn accounts_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let username = validate::text("username", required_str(params, "username")?, 150)?;

    let taken: Option<i64> = conn
        .query_row(
            "SELECT id FROM accounts WHERE username = ?",
            [&username],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    if taken.is_some() {
        return Err(HandlerErr::conflict("username already exists")
            .with_details(json!({ "field": "username" })));
    }

    conn.execute("INSERT INTO accounts(username) VALUES(?)", [&username])
        .map_err(|e| HandlerErr::db("db_insert_failed", e, "accounts"))?;
    let account = Account {
        id: conn.last_insert_rowid(),
        username,
    };
    tracing::info!(account_id = account.id, "account created");
    Ok(json!({ "account": account }))
}

/// Removing an account takes the linked tutor or student with it.
fn accounts_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let account_id = required_i64(params, "accountId")?;
    require_row(conn, "accounts", "id", account_id, "account")?;
    conn.execute("DELETE FROM accounts WHERE id = ?", [account_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e, "accounts"))?;
    tracing::info!(account_id, "account deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "accounts.list" => Some(with_conn_or_empty(state, req, "accounts", |conn, _| {
            accounts_list(conn)
        })),
        "accounts.create" => Some(with_conn(state, req, accounts_create)),
        "accounts.delete" => Some(with_conn(state, req, accounts_delete)),
        _ => None,
    }
}
