use rusqlite::{params, Connection};

use crate::audit::append_audit;
use crate::db::{self, Db};
use crate::domain::validation;
use crate::error::AppError;
use crate::models::*;

fn ensure_time_range(
  enforce: bool,
  start_date: Option<&str>,
  end_date: Option<&str>,
) -> Result<(), AppError> {
  if let Some(start) = start_date {
    validation::parse_date(start)?;
  }
  if let Some(end) = end_date {
    validation::parse_date(end)?;
  }
  if enforce && (start_date.is_none() || end_date.is_none()) {
    return Err(AppError::validation(
      "Zeitraum-Erzwingung benoetigt Start- und Enddatum",
    ));
  }
  if let (Some(start), Some(end)) = (start_date, end_date) {
    if start > end {
      return Err(AppError::validation("Startdatum liegt nach dem Enddatum"));
    }
  }
  Ok(())
}

fn ensure_budget_input(input: &BudgetInput) -> Result<(), AppError> {
  if input.name.trim().is_empty() {
    return Err(AppError::validation("Name fehlt"));
  }
  if input.amount_planned < 0.0 {
    return Err(AppError::validation("Planbetrag darf nicht negativ sein"));
  }
  if let Some(sphere) = input.sphere.as_deref() {
    if !SPHERES.contains(&sphere) {
      return Err(AppError::validation(
        "Sphaere muss IDEELL, ZWECK, VERMOEGEN oder WGB sein",
      ));
    }
  }
  ensure_time_range(
    input.enforce_time_range,
    input.start_date.as_deref(),
    input.end_date.as_deref(),
  )
}

fn ensure_earmark_exists(conn: &Connection, earmark_id: i64) -> Result<(), AppError> {
  conn
    .query_row("SELECT id FROM earmarks WHERE id = ?1", params![earmark_id], |row| {
      row.get::<_, i64>(0)
    })
    .map_err(|err| AppError::or_not_found(err, format!("Zweckbindung {earmark_id} nicht gefunden")))?;
  Ok(())
}

pub fn create_budget(db: &Db, input: BudgetInput, actor: Option<String>) -> Result<Budget, AppError> {
  ensure_budget_input(&input)?;
  db::with_conn(db, |conn| {
    if let Some(earmark_id) = input.earmark_id {
      ensure_earmark_exists(conn, earmark_id)?;
    }
    let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
    conn.execute(
      "INSERT INTO budgets (name, sphere, year, amount_planned, earmark_id, enforce_time_range, start_date, end_date)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      params![
        input.name,
        input.sphere,
        input.year,
        input.amount_planned,
        input.earmark_id,
        if input.enforce_time_range { 1 } else { 0 },
        input.start_date,
        input.end_date
      ],
    )?;
    let id = conn.last_insert_rowid();
    append_audit(conn, actor, "BUDGET_UPDATE", "BUDGET", Some(id.to_string()), None, payload_json, None)?;
    Ok(Budget {
      id,
      name: input.name,
      sphere: input.sphere,
      year: input.year,
      amount_planned: input.amount_planned,
      earmark_id: input.earmark_id,
      enforce_time_range: input.enforce_time_range,
      start_date: input.start_date,
      end_date: input.end_date,
    })
  })
}

pub fn update_budget(
  db: &Db,
  id: i64,
  input: BudgetInput,
  actor: Option<String>,
) -> Result<Budget, AppError> {
  ensure_budget_input(&input)?;
  db::with_conn(db, |conn| {
    if let Some(earmark_id) = input.earmark_id {
      ensure_earmark_exists(conn, earmark_id)?;
    }
    let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
    let changed = conn.execute(
      "UPDATE budgets SET name = ?1, sphere = ?2, year = ?3, amount_planned = ?4, earmark_id = ?5,
         enforce_time_range = ?6, start_date = ?7, end_date = ?8
       WHERE id = ?9",
      params![
        input.name,
        input.sphere,
        input.year,
        input.amount_planned,
        input.earmark_id,
        if input.enforce_time_range { 1 } else { 0 },
        input.start_date,
        input.end_date,
        id
      ],
    )?;
    if changed == 0 {
      return Err(AppError::not_found(format!("Budget {id} nicht gefunden")));
    }
    append_audit(conn, actor, "BUDGET_UPDATE", "BUDGET", Some(id.to_string()), None, payload_json, None)?;
    Ok(Budget {
      id,
      name: input.name,
      sphere: input.sphere,
      year: input.year,
      amount_planned: input.amount_planned,
      earmark_id: input.earmark_id,
      enforce_time_range: input.enforce_time_range,
      start_date: input.start_date,
      end_date: input.end_date,
    })
  })
}

pub fn delete_budget(db: &Db, id: i64, actor: Option<String>) -> Result<(), AppError> {
  db::with_conn(db, |conn| {
    let tx = conn.transaction()?;
    // Allocation rows go, the vouchers stay.
    tx.execute("DELETE FROM voucher_budgets WHERE budget_id = ?1", params![id])?;
    let changed = tx.execute("DELETE FROM budgets WHERE id = ?1", params![id])?;
    if changed == 0 {
      return Err(AppError::not_found(format!("Budget {id} nicht gefunden")));
    }
    append_audit(
      &tx,
      actor,
      "BUDGET_DELETE",
      "BUDGET",
      Some(id.to_string()),
      None,
      "{}".to_string(),
      None,
    )?;
    tx.commit()?;
    Ok(())
  })
}

pub fn list_budgets(db: &Db, year: Option<i32>) -> Result<Vec<Budget>, AppError> {
  db::with_conn(db, |conn| {
    let mut items = Vec::new();
    let mut push_rows = |stmt: &mut rusqlite::Statement, params: &[&dyn rusqlite::ToSql]| -> Result<(), AppError> {
      let rows = stmt.query_map(params, |row| {
        Ok(Budget {
          id: row.get(0)?,
          name: row.get(1)?,
          sphere: row.get(2)?,
          year: row.get(3)?,
          amount_planned: row.get(4)?,
          earmark_id: row.get(5)?,
          enforce_time_range: row.get::<_, i64>(6)? == 1,
          start_date: row.get(7)?,
          end_date: row.get(8)?,
        })
      })?;
      for row in rows {
        items.push(row?);
      }
      Ok(())
    };

    if let Some(year) = year {
      let mut stmt = conn.prepare(
        "SELECT id, name, sphere, year, amount_planned, earmark_id, enforce_time_range, start_date, end_date
         FROM budgets WHERE year = ?1 ORDER BY name",
      )?;
      push_rows(&mut stmt, &[&year])?;
    } else {
      let mut stmt = conn.prepare(
        "SELECT id, name, sphere, year, amount_planned, earmark_id, enforce_time_range, start_date, end_date
         FROM budgets ORDER BY year DESC, name",
      )?;
      push_rows(&mut stmt, &[])?;
    }

    Ok(items)
  })
}

fn ensure_earmark_input(input: &EarmarkInput) -> Result<(), AppError> {
  if input.name.trim().is_empty() {
    return Err(AppError::validation("Name fehlt"));
  }
  if let Some(budget) = input.budget {
    if budget < 0.0 {
      return Err(AppError::validation("Budgetrahmen darf nicht negativ sein"));
    }
  }
  ensure_time_range(
    input.enforce_time_range,
    input.start_date.as_deref(),
    input.end_date.as_deref(),
  )
}

pub fn create_earmark(db: &Db, input: EarmarkInput, actor: Option<String>) -> Result<Earmark, AppError> {
  ensure_earmark_input(&input)?;
  db::with_conn(db, |conn| {
    let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
    conn.execute(
      "INSERT INTO earmarks (name, budget, is_active, enforce_time_range, start_date, end_date)
       VALUES (?1, ?2, 1, ?3, ?4, ?5)",
      params![
        input.name,
        input.budget,
        if input.enforce_time_range { 1 } else { 0 },
        input.start_date,
        input.end_date
      ],
    )?;
    let id = conn.last_insert_rowid();
    append_audit(conn, actor, "EARMARK_UPDATE", "EARMARK", Some(id.to_string()), None, payload_json, None)?;
    Ok(Earmark {
      id,
      name: input.name,
      budget: input.budget,
      is_active: true,
      enforce_time_range: input.enforce_time_range,
      start_date: input.start_date,
      end_date: input.end_date,
    })
  })
}

pub fn update_earmark(
  db: &Db,
  id: i64,
  input: EarmarkInput,
  actor: Option<String>,
) -> Result<Earmark, AppError> {
  ensure_earmark_input(&input)?;
  db::with_conn(db, |conn| {
    let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
    let changed = conn.execute(
      "UPDATE earmarks SET name = ?1, budget = ?2, enforce_time_range = ?3, start_date = ?4, end_date = ?5
       WHERE id = ?6",
      params![
        input.name,
        input.budget,
        if input.enforce_time_range { 1 } else { 0 },
        input.start_date,
        input.end_date,
        id
      ],
    )?;
    if changed == 0 {
      return Err(AppError::not_found(format!("Zweckbindung {id} nicht gefunden")));
    }
    append_audit(conn, actor, "EARMARK_UPDATE", "EARMARK", Some(id.to_string()), None, payload_json, None)?;
    let is_active: i64 = conn.query_row(
      "SELECT is_active FROM earmarks WHERE id = ?1",
      params![id],
      |row| row.get(0),
    )?;
    Ok(Earmark {
      id,
      name: input.name,
      budget: input.budget,
      is_active: is_active == 1,
      enforce_time_range: input.enforce_time_range,
      start_date: input.start_date,
      end_date: input.end_date,
    })
  })
}

pub fn deactivate_earmark(db: &Db, id: i64, actor: Option<String>) -> Result<(), AppError> {
  db::with_conn(db, |conn| {
    let changed = conn.execute("UPDATE earmarks SET is_active = 0 WHERE id = ?1", params![id])?;
    if changed == 0 {
      return Err(AppError::not_found(format!("Zweckbindung {id} nicht gefunden")));
    }
    append_audit(
      conn,
      actor,
      "EARMARK_UPDATE",
      "EARMARK",
      Some(id.to_string()),
      None,
      "{\"action\":\"deactivate\"}".to_string(),
      None,
    )?;
    Ok(())
  })
}

pub fn list_earmarks(db: &Db, include_inactive: bool) -> Result<Vec<Earmark>, AppError> {
  db::with_conn(db, |conn| {
    let sql = if include_inactive {
      "SELECT id, name, budget, is_active, enforce_time_range, start_date, end_date FROM earmarks ORDER BY name"
    } else {
      "SELECT id, name, budget, is_active, enforce_time_range, start_date, end_date FROM earmarks WHERE is_active = 1 ORDER BY name"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
      Ok(Earmark {
        id: row.get(0)?,
        name: row.get(1)?,
        budget: row.get(2)?,
        is_active: row.get::<_, i64>(3)? == 1,
        enforce_time_range: row.get::<_, i64>(4)? == 1,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
      })
    })?;
    let mut items = Vec::new();
    for row in rows {
      items.push(row?);
    }
    Ok(items)
  })
}

pub fn create_category(db: &Db, input: CategoryInput, actor: Option<String>) -> Result<Category, AppError> {
  if input.name.trim().is_empty() {
    return Err(AppError::validation("Name fehlt"));
  }
  if let Some(sphere) = input.sphere.as_deref() {
    if !SPHERES.contains(&sphere) {
      return Err(AppError::validation(
        "Sphaere muss IDEELL, ZWECK, VERMOEGEN oder WGB sein",
      ));
    }
  }
  db::with_conn(db, |conn| {
    let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
    conn.execute(
      "INSERT INTO categories (name, sphere, is_active) VALUES (?1, ?2, 1)",
      params![input.name, input.sphere],
    )?;
    let id = conn.last_insert_rowid();
    append_audit(conn, actor, "CATEGORY_UPDATE", "CATEGORY", Some(id.to_string()), None, payload_json, None)?;
    Ok(Category {
      id,
      name: input.name,
      sphere: input.sphere,
      is_active: true,
    })
  })
}

pub fn update_category(
  db: &Db,
  id: i64,
  input: CategoryInput,
  actor: Option<String>,
) -> Result<Category, AppError> {
  if input.name.trim().is_empty() {
    return Err(AppError::validation("Name fehlt"));
  }
  if let Some(sphere) = input.sphere.as_deref() {
    if !SPHERES.contains(&sphere) {
      return Err(AppError::validation(
        "Sphaere muss IDEELL, ZWECK, VERMOEGEN oder WGB sein",
      ));
    }
  }
  db::with_conn(db, |conn| {
    let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
    let changed = conn.execute(
      "UPDATE categories SET name = ?1, sphere = ?2 WHERE id = ?3",
      params![input.name, input.sphere, id],
    )?;
    if changed == 0 {
      return Err(AppError::not_found(format!("Kategorie {id} nicht gefunden")));
    }
    append_audit(conn, actor, "CATEGORY_UPDATE", "CATEGORY", Some(id.to_string()), None, payload_json, None)?;
    let is_active: i64 = conn.query_row(
      "SELECT is_active FROM categories WHERE id = ?1",
      params![id],
      |row| row.get(0),
    )?;
    Ok(Category {
      id,
      name: input.name,
      sphere: input.sphere,
      is_active: is_active == 1,
    })
  })
}

pub fn deactivate_category(db: &Db, id: i64, actor: Option<String>) -> Result<(), AppError> {
  db::with_conn(db, |conn| {
    let changed = conn.execute("UPDATE categories SET is_active = 0 WHERE id = ?1", params![id])?;
    if changed == 0 {
      return Err(AppError::not_found(format!("Kategorie {id} nicht gefunden")));
    }
    append_audit(
      conn,
      actor,
      "CATEGORY_UPDATE",
      "CATEGORY",
      Some(id.to_string()),
      None,
      "{\"action\":\"deactivate\"}".to_string(),
      None,
    )?;
    Ok(())
  })
}

pub fn list_categories(db: &Db) -> Result<Vec<Category>, AppError> {
  db::with_conn(db, |conn| {
    let mut stmt = conn.prepare("SELECT id, name, sphere, is_active FROM categories ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
      Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        sphere: row.get(2)?,
        is_active: row.get::<_, i64>(3)? == 1,
      })
    })?;
    let mut items = Vec::new();
    for row in rows {
      items.push(row?);
    }
    Ok(items)
  })
}

pub fn create_tag(
  db: &Db,
  name: String,
  color: Option<String>,
  actor: Option<String>,
) -> Result<Tag, AppError> {
  let name = name.trim().to_string();
  if name.is_empty() {
    return Err(AppError::validation("Name fehlt"));
  }
  db::with_conn(db, |conn| {
    let existing: Option<i64> = {
      let mut stmt = conn.prepare("SELECT id FROM tags WHERE name = ?1")?;
      let mut rows = stmt.query(params![name])?;
      if let Some(row) = rows.next()? {
        Some(row.get(0)?)
      } else {
        None
      }
    };
    if existing.is_some() {
      return Err(AppError::validation(format!("Tag {name} existiert bereits")));
    }
    conn.execute("INSERT INTO tags (name, color) VALUES (?1, ?2)", params![name, color])?;
    let id = conn.last_insert_rowid();
    append_audit(
      conn,
      actor,
      "TAG_UPDATE",
      "TAG",
      Some(id.to_string()),
      None,
      serde_json::to_string(&serde_json::json!({"name": name, "color": color}))
        .unwrap_or_else(|_| "{}".to_string()),
      None,
    )?;
    Ok(Tag { id, name, color })
  })
}

pub fn rename_tag(
  db: &Db,
  id: i64,
  name: String,
  color: Option<String>,
  actor: Option<String>,
) -> Result<Tag, AppError> {
  let name = name.trim().to_string();
  if name.is_empty() {
    return Err(AppError::validation("Name fehlt"));
  }
  db::with_conn(db, |conn| {
    let taken: Option<i64> = {
      let mut stmt = conn.prepare("SELECT id FROM tags WHERE name = ?1 AND id != ?2")?;
      let mut rows = stmt.query(params![name, id])?;
      if let Some(row) = rows.next()? {
        Some(row.get(0)?)
      } else {
        None
      }
    };
    if taken.is_some() {
      return Err(AppError::validation(format!("Tag {name} existiert bereits")));
    }
    let changed = conn.execute(
      "UPDATE tags SET name = ?1, color = ?2 WHERE id = ?3",
      params![name, color, id],
    )?;
    if changed == 0 {
      return Err(AppError::not_found(format!("Tag {id} nicht gefunden")));
    }
    append_audit(
      conn,
      actor,
      "TAG_UPDATE",
      "TAG",
      Some(id.to_string()),
      None,
      serde_json::to_string(&serde_json::json!({"name": name, "color": color}))
        .unwrap_or_else(|_| "{}".to_string()),
      None,
    )?;
    Ok(Tag { id, name, color })
  })
}

pub fn delete_tag(db: &Db, id: i64, actor: Option<String>) -> Result<(), AppError> {
  db::with_conn(db, |conn| {
    let tx = conn.transaction()?;
    // Detaches the tag from every voucher, never deletes vouchers.
    tx.execute("DELETE FROM voucher_tags WHERE tag_id = ?1", params![id])?;
    let changed = tx.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
    if changed == 0 {
      return Err(AppError::not_found(format!("Tag {id} nicht gefunden")));
    }
    append_audit(
      &tx,
      actor,
      "TAG_DELETE",
      "TAG",
      Some(id.to_string()),
      None,
      "{}".to_string(),
      None,
    )?;
    tx.commit()?;
    Ok(())
  })
}

pub fn list_tags(db: &Db) -> Result<Vec<Tag>, AppError> {
  db::with_conn(db, |conn| {
    let mut stmt = conn.prepare("SELECT id, name, color FROM tags ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
      Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
      })
    })?;
    let mut items = Vec::new();
    for row in rows {
      items.push(row?);
    }
    Ok(items)
  })
}
