use rusqlite::{params, Connection};

use crate::error::AppError;

pub fn get_closed_until(conn: &Connection) -> Result<Option<String>, AppError> {
  let mut stmt = conn.prepare("SELECT closed_until FROM period_lock WHERE id = 1")?;
  let mut rows = stmt.query([])?;
  if let Some(row) = rows.next()? {
    Ok(row.get(0)?)
  } else {
    Ok(None)
  }
}

pub fn set_closed_until(conn: &Connection, date: &str) -> Result<(), AppError> {
  conn.execute(
    "UPDATE period_lock SET closed_until = ?1 WHERE id = 1",
    params![date],
  )?;
  Ok(())
}

pub fn clear_closed_until(conn: &Connection) -> Result<(), AppError> {
  conn.execute("UPDATE period_lock SET closed_until = NULL WHERE id = 1", [])?;
  Ok(())
}

/// Dates are YYYY-MM-DD strings, so the lock boundary compares lexically.
pub fn ensure_not_locked(conn: &Connection, date: &str) -> Result<(), AppError> {
  if let Some(closed_until) = get_closed_until(conn)? {
    if date <= closed_until.as_str() {
      return Err(AppError::period_locked(&closed_until));
    }
  }
  Ok(())
}
