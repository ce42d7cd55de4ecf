//! Key-value table access

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Get a stored value by key
pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    Ok(value)
}

/// Insert or replace a value
pub fn set_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO kv_store (key, value, updated_at)
        VALUES (?1, ?2, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        params![key, value],
    )?;

    tracing::debug!("Stored {} bytes under '{}'", value.len(), key);
    Ok(())
}

/// Delete a value, returns true if a row was removed
pub fn delete_value(conn: &Connection, key: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
    Ok(rows > 0)
}
