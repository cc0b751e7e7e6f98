use chrono::{Datelike, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::audit::{append_audit, append_field_change};
use crate::db::{self, Db};
use crate::domain::amounts::{self, AmountInput};
use crate::domain::{period, validation};
use crate::error::AppError;
use crate::models::*;

pub fn create_voucher(
  db: &Db,
  input: VoucherInput,
  actor: Option<String>,
) -> Result<VoucherCreated, AppError> {
  let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
  let date = validation::parse_date(&input.date)?;
  validation::ensure_vat_rate(input.vat_rate)?;
  validation::ensure_type_rules(&input)?;

  let budgets = input.budgets.clone().unwrap_or_default();
  let earmarks = input.earmarks.clone().unwrap_or_default();
  validation::ensure_allocations(&budgets, &earmarks)?;

  let amount_input = AmountInput::from_fields(input.net_amount, input.gross_amount)?;
  ensure_supplied_amount_positive(amount_input)?;
  let amounts = amounts::normalize(amount_input, input.vat_rate);

  db::with_conn(db, |conn| {
    period::ensure_not_locked(conn, &input.date)?;

    let mut warnings = Vec::new();
    check_references(conn, &input, &budgets, &earmarks, amounts.gross, &mut warnings)?;

    let tx = conn.transaction()?;
    let voucher_no = next_voucher_no(&tx)?;
    let now = Utc::now().to_rfc3339();

    tx.execute(
      "INSERT INTO vouchers (voucher_no, date, year, month, type, sphere, category_id, description,
         net_amount, vat_rate, vat_amount, gross_amount, payment_method, transfer_from, transfer_to,
         note, original_id, is_reversed, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, NULL, 0, ?17, ?18)",
      params![
        voucher_no,
        input.date,
        date.year(),
        date.month() as i32,
        input.voucher_type,
        input.sphere,
        input.category_id,
        input.description,
        amounts.net,
        input.vat_rate,
        amounts.vat,
        amounts.gross,
        input.payment_method,
        input.transfer_from,
        input.transfer_to,
        input.note,
        now,
        now
      ],
    )?;
    let id = tx.last_insert_rowid();

    insert_allocations(&tx, id, &budgets, &earmarks)?;
    link_tags(&tx, id, input.tags.as_deref().unwrap_or_default())?;

    append_audit(
      &tx,
      actor,
      "CREATE_VOUCHER",
      "VOUCHER",
      Some(voucher_no.clone()),
      None,
      payload_json,
      None,
    )?;

    tx.commit()?;
    Ok(VoucherCreated {
      id,
      voucher_no,
      gross_amount: amounts.gross,
      warnings,
    })
  })
}

pub fn update_voucher(
  db: &Db,
  id: i64,
  input: VoucherInput,
  actor: Option<String>,
) -> Result<VoucherUpdated, AppError> {
  let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
  let date = validation::parse_date(&input.date)?;
  validation::ensure_vat_rate(input.vat_rate)?;
  validation::ensure_type_rules(&input)?;

  let budgets = input.budgets.clone().unwrap_or_default();
  let earmarks = input.earmarks.clone().unwrap_or_default();
  validation::ensure_allocations(&budgets, &earmarks)?;

  let amount_input = AmountInput::from_fields(input.net_amount, input.gross_amount)?;
  ensure_supplied_amount_positive(amount_input)?;
  let amounts = amounts::normalize(amount_input, input.vat_rate);

  db::with_conn(db, |conn| {
    let existing = fetch_voucher(conn, id)?;
    if existing.is_reversed {
      return Err(AppError::validation("Stornierte Belege koennen nicht geaendert werden"));
    }
    if existing.original_id.is_some() {
      return Err(AppError::validation("Storno-Belege koennen nicht geaendert werden"));
    }
    period::ensure_not_locked(conn, &existing.date)?;
    period::ensure_not_locked(conn, &input.date)?;

    let mut warnings = Vec::new();
    check_references(conn, &input, &budgets, &earmarks, amounts.gross, &mut warnings)?;

    let tx = conn.transaction()?;
    let now = Utc::now().to_rfc3339();

    tx.execute(
      "UPDATE vouchers SET date = ?1, year = ?2, month = ?3, type = ?4, sphere = ?5,
         category_id = ?6, description = ?7, net_amount = ?8, vat_rate = ?9, vat_amount = ?10,
         gross_amount = ?11, payment_method = ?12, transfer_from = ?13, transfer_to = ?14,
         note = ?15, updated_at = ?16
       WHERE id = ?17",
      params![
        input.date,
        date.year(),
        date.month() as i32,
        input.voucher_type,
        input.sphere,
        input.category_id,
        input.description,
        amounts.net,
        input.vat_rate,
        amounts.vat,
        amounts.gross,
        input.payment_method,
        input.transfer_from,
        input.transfer_to,
        input.note,
        now,
        id
      ],
    )?;

    tx.execute("DELETE FROM voucher_budgets WHERE voucher_id = ?1", params![id])?;
    tx.execute("DELETE FROM voucher_earmarks WHERE voucher_id = ?1", params![id])?;
    tx.execute("DELETE FROM voucher_tags WHERE voucher_id = ?1", params![id])?;
    insert_allocations(&tx, id, &budgets, &earmarks)?;
    link_tags(&tx, id, input.tags.as_deref().unwrap_or_default())?;

    append_audit(
      &tx,
      actor,
      "UPDATE_VOUCHER",
      "VOUCHER",
      Some(existing.voucher_no.clone()),
      None,
      payload_json,
      None,
    )?;

    tx.commit()?;
    Ok(VoucherUpdated { id, warnings })
  })
}

pub fn delete_voucher(db: &Db, id: i64, actor: Option<String>) -> Result<i64, AppError> {
  db::with_conn(db, |conn| {
    let existing = fetch_voucher(conn, id)?;
    if existing.is_reversed {
      return Err(AppError::already_reversed(&existing.voucher_no));
    }
    period::ensure_not_locked(conn, &existing.date)?;

    let tx = conn.transaction()?;
    let now = Utc::now().to_rfc3339();

    // Removing a storno releases the original again.
    if let Some(original_id) = existing.original_id {
      tx.execute(
        "UPDATE vouchers SET is_reversed = 0, updated_at = ?1 WHERE id = ?2",
        params![now, original_id],
      )?;
    }

    tx.execute("DELETE FROM vouchers WHERE id = ?1", params![id])?;

    let payload_json = serde_json::to_string(&serde_json::json!({
      "id": id,
      "voucher_no": existing.voucher_no,
    }))
    .unwrap_or_else(|_| "{}".to_string());
    append_audit(
      &tx,
      actor,
      "DELETE_VOUCHER",
      "VOUCHER",
      Some(existing.voucher_no.clone()),
      None,
      payload_json,
      Some("Beleg geloescht".to_string()),
    )?;

    tx.commit()?;
    Ok(id)
  })
}

pub fn reverse_voucher(
  db: &Db,
  input: ReverseInput,
  actor: Option<String>,
) -> Result<VoucherReversed, AppError> {
  let payload_json = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
  let storno_date = input
    .date
    .clone()
    .unwrap_or_else(|| Utc::now().date_naive().format("%Y-%m-%d").to_string());
  let parsed = validation::parse_date(&storno_date)?;

  db::with_conn(db, |conn| {
    let original = fetch_voucher(conn, input.original_id)?;
    if original.original_id.is_some() {
      return Err(AppError::validation("Storno auf Storno nicht erlaubt"));
    }
    if original.is_reversed {
      return Err(AppError::already_reversed(&original.voucher_no));
    }

    // Only the storno's own date has to clear the boundary; flagging the
    // original is metadata, not a financial mutation.
    period::ensure_not_locked(conn, &storno_date)?;

    let tx = conn.transaction()?;
    let voucher_no = next_voucher_no(&tx)?;
    let now = Utc::now().to_rfc3339();

    let note = match input.reason.as_deref() {
      Some(reason) if !reason.trim().is_empty() => {
        format!("Storno {}: {}", original.voucher_no, reason.trim())
      }
      _ => format!("Storno {}", original.voucher_no),
    };

    tx.execute(
      "INSERT INTO vouchers (voucher_no, date, year, month, type, sphere, category_id, description,
         net_amount, vat_rate, vat_amount, gross_amount, payment_method, transfer_from, transfer_to,
         note, original_id, is_reversed, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 0, ?18, ?19)",
      params![
        voucher_no,
        storno_date,
        parsed.year(),
        parsed.month() as i32,
        original.voucher_type,
        original.sphere,
        original.category_id,
        original.description,
        -original.net_amount,
        original.vat_rate,
        -original.vat_amount,
        -original.gross_amount,
        original.payment_method,
        original.transfer_from,
        original.transfer_to,
        note,
        original.id,
        now,
        now
      ],
    )?;
    let id = tx.last_insert_rowid();

    // Mirror the allocations negated so budget and earmark usage nets to zero.
    tx.execute(
      "INSERT INTO voucher_budgets (voucher_id, budget_id, amount)
       SELECT ?1, budget_id, -amount FROM voucher_budgets WHERE voucher_id = ?2",
      params![id, original.id],
    )?;
    tx.execute(
      "INSERT INTO voucher_earmarks (voucher_id, earmark_id, amount)
       SELECT ?1, earmark_id, -amount FROM voucher_earmarks WHERE voucher_id = ?2",
      params![id, original.id],
    )?;
    tx.execute(
      "INSERT INTO voucher_tags (voucher_id, tag_id)
       SELECT ?1, tag_id FROM voucher_tags WHERE voucher_id = ?2",
      params![id, original.id],
    )?;

    tx.execute(
      "UPDATE vouchers SET is_reversed = 1, updated_at = ?1 WHERE id = ?2",
      params![now, original.id],
    )?;

    append_audit(
      &tx,
      actor,
      "REVERSE_VOUCHER",
      "VOUCHER",
      Some(voucher_no.clone()),
      Some(original.voucher_no.clone()),
      payload_json,
      None,
    )?;

    tx.commit()?;
    Ok(VoucherReversed { id, voucher_no })
  })
}

pub fn batch_assign(
  db: &Db,
  filter: BatchAssignFilter,
  assignment: BatchAssignment,
  actor: Option<String>,
) -> Result<BatchAssignResult, AppError> {
  let target = resolve_target(&assignment)?;

  db::with_conn(db, |conn| {
    check_target_exists(conn, &target)?;
    let closed_until = period::get_closed_until(conn)?;

    let mut sql = String::from(
      "SELECT id, voucher_no, date, gross_amount, category_id FROM vouchers
       WHERE is_reversed = 0 AND original_id IS NULL",
    );
    let mut values: Vec<Value> = Vec::new();

    if let Some(date_from) = filter.date_from.as_ref() {
      validation::parse_date(date_from)?;
      sql.push_str(&format!(" AND date >= ?{}", values.len() + 1));
      values.push(Value::from(date_from.clone()));
    }
    if let Some(date_to) = filter.date_to.as_ref() {
      validation::parse_date(date_to)?;
      sql.push_str(&format!(" AND date <= ?{}", values.len() + 1));
      values.push(Value::from(date_to.clone()));
    }
    if let Some(voucher_type) = filter.voucher_type.as_ref() {
      sql.push_str(&format!(" AND type = ?{}", values.len() + 1));
      values.push(Value::from(voucher_type.clone()));
    }
    if let Some(payment_method) = filter.payment_method.as_ref() {
      sql.push_str(&format!(" AND payment_method = ?{}", values.len() + 1));
      values.push(Value::from(payment_method.clone()));
    }
    if let Some(sphere) = filter.sphere.as_ref() {
      sql.push_str(&format!(" AND sphere = ?{}", values.len() + 1));
      values.push(Value::from(sphere.clone()));
    }
    if let Some(search) = filter.search.as_ref() {
      let trimmed = search.trim();
      if !trimmed.is_empty() {
        let idx = values.len() + 1;
        sql.push_str(&format!(
          " AND (voucher_no LIKE ?{idx} OR description LIKE ?{idx} OR note LIKE ?{idx})"
        ));
        values.push(Value::from(format!("%{trimmed}%")));
      }
    }
    // Locked vouchers are skipped, not an error.
    if let Some(closed_until) = closed_until.as_ref() {
      sql.push_str(&format!(" AND date > ?{}", values.len() + 1));
      values.push(Value::from(closed_until.clone()));
    }
    sql.push_str(" ORDER BY date, voucher_no");

    let mut candidates: Vec<(i64, String, String, f64, Option<i64>)> = Vec::new();
    {
      let mut stmt = conn.prepare(&sql)?;
      let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })?;
      for row in rows {
        candidates.push(row?);
      }
    }

    let budget_range = match &target {
      AssignTarget::Budget(budget_id) => enforced_budget_range(conn, *budget_id)?,
      _ => None,
    };

    let tx = conn.transaction()?;
    let now = Utc::now().to_rfc3339();
    let tag_ids = match &target {
      AssignTarget::Tags(names) => resolve_tag_ids(&tx, names)?,
      _ => Vec::new(),
    };

    let mut updated = 0_i64;
    for (voucher_id, voucher_no, date, gross_amount, category_id) in candidates {
      match &target {
        AssignTarget::Budget(budget_id) => {
          // The budget range is hard on every write path; out-of-range
          // vouchers are skipped like locked ones.
          if let Some((start, end)) = &budget_range {
            if date_outside_range(&date, start.as_deref(), end.as_deref()) {
              continue;
            }
          }
          if filter.only_without && has_any_budget(&tx, voucher_id)? {
            continue;
          }
          let before = fetch_allocation(&tx, "voucher_budgets", "budget_id", voucher_id, *budget_id)?;
          if before == Some(gross_amount) {
            continue;
          }
          tx.execute(
            "INSERT OR REPLACE INTO voucher_budgets (voucher_id, budget_id, amount) VALUES (?1, ?2, ?3)",
            params![voucher_id, budget_id, gross_amount],
          )?;
          append_field_change(
            &tx,
            actor.clone(),
            &voucher_no,
            "budget",
            serde_json::json!(before.map(|amount| serde_json::json!({"budget_id": budget_id, "amount": amount}))),
            serde_json::json!({"budget_id": budget_id, "amount": gross_amount}),
          )?;
          updated += 1;
        }
        AssignTarget::Earmark(earmark_id) => {
          if filter.only_without && has_any_earmark(&tx, voucher_id)? {
            continue;
          }
          let before = fetch_allocation(&tx, "voucher_earmarks", "earmark_id", voucher_id, *earmark_id)?;
          if before == Some(gross_amount) {
            continue;
          }
          tx.execute(
            "INSERT OR REPLACE INTO voucher_earmarks (voucher_id, earmark_id, amount) VALUES (?1, ?2, ?3)",
            params![voucher_id, earmark_id, gross_amount],
          )?;
          append_field_change(
            &tx,
            actor.clone(),
            &voucher_no,
            "earmark",
            serde_json::json!(before.map(|amount| serde_json::json!({"earmark_id": earmark_id, "amount": amount}))),
            serde_json::json!({"earmark_id": earmark_id, "amount": gross_amount}),
          )?;
          updated += 1;
        }
        AssignTarget::Category(new_category_id) => {
          if filter.only_without && category_id.is_some() {
            continue;
          }
          if category_id == Some(*new_category_id) {
            continue;
          }
          tx.execute(
            "UPDATE vouchers SET category_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_category_id, now, voucher_id],
          )?;
          append_field_change(
            &tx,
            actor.clone(),
            &voucher_no,
            "category",
            serde_json::json!(category_id),
            serde_json::json!(new_category_id),
          )?;
          updated += 1;
        }
        AssignTarget::Tags(_) => {
          let before_tags = voucher_tag_names(&tx, voucher_id)?;
          if filter.only_without && !before_tags.is_empty() {
            continue;
          }
          let mut inserted = 0;
          for tag_id in &tag_ids {
            inserted += tx.execute(
              "INSERT OR IGNORE INTO voucher_tags (voucher_id, tag_id) VALUES (?1, ?2)",
              params![voucher_id, tag_id],
            )?;
          }
          if inserted == 0 {
            continue;
          }
          let after_tags = voucher_tag_names(&tx, voucher_id)?;
          append_field_change(
            &tx,
            actor.clone(),
            &voucher_no,
            "tags",
            serde_json::json!(before_tags),
            serde_json::json!(after_tags),
          )?;
          updated += 1;
        }
      }
    }

    tx.commit()?;
    Ok(BatchAssignResult { updated_count: updated })
  })
}

pub fn get_voucher(db: &Db, id: i64) -> Result<VoucherDetail, AppError> {
  db::with_conn(db, |conn| {
    let voucher = fetch_list_item(conn, id)?;

    let mut budgets = Vec::new();
    {
      let mut stmt = conn.prepare(
        "SELECT budget_id, amount FROM voucher_budgets WHERE voucher_id = ?1 ORDER BY budget_id",
      )?;
      let rows = stmt.query_map(params![id], |row| {
        Ok(BudgetAllocation {
          budget_id: row.get(0)?,
          amount: row.get(1)?,
        })
      })?;
      for row in rows {
        budgets.push(row?);
      }
    }

    let mut earmarks = Vec::new();
    {
      let mut stmt = conn.prepare(
        "SELECT earmark_id, amount FROM voucher_earmarks WHERE voucher_id = ?1 ORDER BY earmark_id",
      )?;
      let rows = stmt.query_map(params![id], |row| {
        Ok(EarmarkAllocation {
          earmark_id: row.get(0)?,
          amount: row.get(1)?,
        })
      })?;
      for row in rows {
        earmarks.push(row?);
      }
    }

    let tags = voucher_tag_names(conn, id)?;

    Ok(VoucherDetail {
      voucher,
      budgets,
      earmarks,
      tags,
    })
  })
}

pub fn list_vouchers(db: &Db, filter: VoucherFilter) -> Result<Paginated<VoucherListItem>, AppError> {
  let page = if filter.page < 1 { 1 } else { filter.page };
  let page_size = if filter.page_size < 1 { 50 } else { filter.page_size };
  let offset = (page - 1) * page_size;

  db::with_conn(db, |conn| {
    let mut conditions = String::from("v.year = ?1");
    let mut values: Vec<Value> = vec![Value::from(i64::from(filter.year))];

    if let Some(month) = filter.month {
      conditions.push_str(&format!(" AND v.month = ?{}", values.len() + 1));
      values.push(Value::from(i64::from(month)));
    }
    if let Some(voucher_type) = filter.voucher_type.as_ref() {
      conditions.push_str(&format!(" AND v.type = ?{}", values.len() + 1));
      values.push(Value::from(voucher_type.clone()));
    }
    if let Some(search) = filter.search.as_ref() {
      let trimmed = search.trim();
      if !trimmed.is_empty() {
        let idx = values.len() + 1;
        conditions.push_str(&format!(
          " AND (v.voucher_no LIKE ?{idx} OR v.description LIKE ?{idx} OR v.note LIKE ?{idx}
             OR c.name LIKE ?{idx} OR v.date LIKE ?{idx} OR CAST(v.gross_amount AS TEXT) LIKE ?{idx})"
        ));
        values.push(Value::from(format!("%{trimmed}%")));
      }
    }

    let total: i64 = conn.query_row(
      &format!(
        "SELECT COUNT(*) FROM vouchers v LEFT JOIN categories c ON c.id = v.category_id WHERE {conditions}"
      ),
      params_from_iter(values.iter()),
      |row| row.get(0),
    )?;

    let limit_idx = values.len() + 1;
    let offset_idx = values.len() + 2;
    values.push(Value::from(page_size));
    values.push(Value::from(offset));

    let mut stmt = conn.prepare(&format!(
      "SELECT {VOUCHER_COLUMNS}
       FROM vouchers v
       LEFT JOIN categories c ON c.id = v.category_id
       WHERE {conditions}
       ORDER BY v.date DESC, v.voucher_no DESC
       LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    ))?;
    let rows = stmt.query_map(params_from_iter(values.iter()), map_voucher_row)?;

    let mut items = Vec::new();
    for row in rows {
      items.push(row?);
    }

    Ok(Paginated { total, items })
  })
}

pub fn get_period_lock(db: &Db) -> Result<PeriodLockStatus, AppError> {
  db::with_conn(db, |conn| {
    Ok(PeriodLockStatus {
      closed_until: period::get_closed_until(conn)?,
    })
  })
}

pub fn close_period(db: &Db, closed_until: String, actor: Option<String>) -> Result<(), AppError> {
  validation::parse_date(&closed_until)?;
  db::with_conn(db, |conn| {
    period::set_closed_until(conn, &closed_until)?;
    append_audit(
      conn,
      actor,
      "CLOSE_PERIOD",
      "PERIOD",
      Some(closed_until.clone()),
      None,
      "{}".to_string(),
      None,
    )?;
    Ok(())
  })
}

pub fn reopen_period(db: &Db, actor: Option<String>) -> Result<(), AppError> {
  db::with_conn(db, |conn| {
    period::clear_closed_until(conn)?;
    append_audit(
      conn,
      actor,
      "REOPEN_PERIOD",
      "PERIOD",
      None,
      None,
      "{}".to_string(),
      None,
    )?;
    Ok(())
  })
}

const VOUCHER_COLUMNS: &str =
  "v.id, v.voucher_no, v.date, v.year, v.month, v.type, v.sphere, v.category_id, c.name,
   v.description, v.net_amount, v.vat_rate, v.vat_amount, v.gross_amount, v.payment_method,
   v.transfer_from, v.transfer_to, v.note, v.original_id, v.is_reversed, v.created_at, v.updated_at";

fn map_voucher_row(row: &rusqlite::Row) -> Result<VoucherListItem, rusqlite::Error> {
  Ok(VoucherListItem {
    id: row.get(0)?,
    voucher_no: row.get(1)?,
    date: row.get(2)?,
    year: row.get(3)?,
    month: row.get(4)?,
    voucher_type: row.get(5)?,
    sphere: row.get(6)?,
    category_id: row.get(7)?,
    category_name: row.get(8)?,
    description: row.get(9)?,
    net_amount: row.get(10)?,
    vat_rate: row.get(11)?,
    vat_amount: row.get(12)?,
    gross_amount: row.get(13)?,
    payment_method: row.get(14)?,
    transfer_from: row.get(15)?,
    transfer_to: row.get(16)?,
    note: row.get(17)?,
    original_id: row.get(18)?,
    is_reversed: row.get::<_, i64>(19)? == 1,
    created_at: row.get(20)?,
    updated_at: row.get(21)?,
  })
}

fn fetch_list_item(conn: &Connection, id: i64) -> Result<VoucherListItem, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {VOUCHER_COLUMNS}
     FROM vouchers v
     LEFT JOIN categories c ON c.id = v.category_id
     WHERE v.id = ?1"
  ))?;
  stmt
    .query_row(params![id], map_voucher_row)
    .map_err(|err| AppError::or_not_found(err, "Beleg nicht gefunden"))
}

struct StoredVoucher {
  id: i64,
  voucher_no: String,
  date: String,
  voucher_type: String,
  sphere: Option<String>,
  category_id: Option<i64>,
  description: Option<String>,
  net_amount: f64,
  vat_rate: f64,
  vat_amount: f64,
  gross_amount: f64,
  payment_method: Option<String>,
  transfer_from: Option<String>,
  transfer_to: Option<String>,
  original_id: Option<i64>,
  is_reversed: bool,
}

fn fetch_voucher(conn: &Connection, id: i64) -> Result<StoredVoucher, AppError> {
  let mut stmt = conn.prepare(
    "SELECT id, voucher_no, date, type, sphere, category_id, description, net_amount, vat_rate,
        vat_amount, gross_amount, payment_method, transfer_from, transfer_to, original_id, is_reversed
     FROM vouchers WHERE id = ?1",
  )?;
  stmt
    .query_row(params![id], |row| {
      Ok(StoredVoucher {
        id: row.get(0)?,
        voucher_no: row.get(1)?,
        date: row.get(2)?,
        voucher_type: row.get(3)?,
        sphere: row.get(4)?,
        category_id: row.get(5)?,
        description: row.get(6)?,
        net_amount: row.get(7)?,
        vat_rate: row.get(8)?,
        vat_amount: row.get(9)?,
        gross_amount: row.get(10)?,
        payment_method: row.get(11)?,
        transfer_from: row.get(12)?,
        transfer_to: row.get(13)?,
        original_id: row.get(14)?,
        is_reversed: row.get::<_, i64>(15)? == 1,
      })
    })
    .map_err(|err| AppError::or_not_found(err, "Beleg nicht gefunden"))
}

fn next_voucher_no(conn: &Connection) -> Result<String, AppError> {
  let max_no: Option<i64> = conn.query_row(
    "SELECT MAX(CAST(voucher_no AS INTEGER)) FROM vouchers",
    [],
    |row| row.get(0),
  )?;
  let next = max_no.unwrap_or(0) + 1;
  Ok(format!("{:06}", next))
}

fn ensure_supplied_amount_positive(input: AmountInput) -> Result<(), AppError> {
  let value = match input {
    AmountInput::Net(value) => value,
    AmountInput::Gross(value) => value,
  };
  if value <= 0.0 {
    Err(AppError::validation("Betrag muss > 0 sein"))
  } else {
    Ok(())
  }
}

fn check_references(
  conn: &Connection,
  input: &VoucherInput,
  budgets: &[BudgetAllocation],
  earmarks: &[EarmarkAllocation],
  gross_amount: f64,
  warnings: &mut Vec<String>,
) -> Result<(), AppError> {
  if let Some(category_id) = input.category_id {
    let is_active: i64 = conn
      .query_row(
        "SELECT is_active FROM categories WHERE id = ?1",
        params![category_id],
        |row| row.get(0),
      )
      .map_err(|err| AppError::or_not_found(err, format!("Kategorie {category_id} nicht gefunden")))?;
    if is_active == 0 {
      return Err(AppError::validation("Kategorie ist deaktiviert"));
    }
  }

  let mut budget_sum = 0.0;
  for allocation in budgets {
    let (enforce, start_date, end_date): (i64, Option<String>, Option<String>) = conn
      .query_row(
        "SELECT enforce_time_range, start_date, end_date FROM budgets WHERE id = ?1",
        params![allocation.budget_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .map_err(|err| AppError::or_not_found(err, format!("Budget {} nicht gefunden", allocation.budget_id)))?;
    if enforce == 1 && date_outside_range(&input.date, start_date.as_deref(), end_date.as_deref()) {
      return Err(AppError::validation(format!(
        "Belegdatum liegt ausserhalb des Budgetzeitraums von Budget {}",
        allocation.budget_id
      )));
    }
    budget_sum += allocation.amount;
  }

  let mut earmark_sum = 0.0;
  for allocation in earmarks {
    let (is_active, enforce, start_date, end_date): (i64, i64, Option<String>, Option<String>) = conn
      .query_row(
        "SELECT is_active, enforce_time_range, start_date, end_date FROM earmarks WHERE id = ?1",
        params![allocation.earmark_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .map_err(|err| {
        AppError::or_not_found(err, format!("Zweckbindung {} nicht gefunden", allocation.earmark_id))
      })?;
    if is_active == 0 {
      return Err(AppError::validation("Zweckbindung ist deaktiviert"));
    }
    // Time range on earmarks is advisory: the allocation is accepted, the
    // reports just count it as outside.
    if enforce == 1 && date_outside_range(&input.date, start_date.as_deref(), end_date.as_deref()) {
      warnings.push(format!(
        "Belegdatum liegt ausserhalb des Zeitraums von Zweckbindung {}",
        allocation.earmark_id
      ));
    }
    earmark_sum += allocation.amount;
  }

  if budget_sum > gross_amount + 0.005 {
    warnings.push("Budgetzuordnungen uebersteigen den Bruttobetrag".to_string());
  }
  if earmark_sum > gross_amount + 0.005 {
    warnings.push("Zweckbindungen uebersteigen den Bruttobetrag".to_string());
  }

  Ok(())
}

fn date_outside_range(date: &str, start_date: Option<&str>, end_date: Option<&str>) -> bool {
  if let Some(start) = start_date {
    if date < start {
      return true;
    }
  }
  if let Some(end) = end_date {
    if date > end {
      return true;
    }
  }
  false
}

fn enforced_budget_range(
  conn: &Connection,
  budget_id: i64,
) -> Result<Option<(Option<String>, Option<String>)>, AppError> {
  let (enforce, start_date, end_date): (i64, Option<String>, Option<String>) = conn.query_row(
    "SELECT enforce_time_range, start_date, end_date FROM budgets WHERE id = ?1",
    params![budget_id],
    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
  )?;
  Ok(if enforce == 1 {
    Some((start_date, end_date))
  } else {
    None
  })
}

fn insert_allocations(
  conn: &Connection,
  voucher_id: i64,
  budgets: &[BudgetAllocation],
  earmarks: &[EarmarkAllocation],
) -> Result<(), AppError> {
  for allocation in budgets {
    conn.execute(
      "INSERT INTO voucher_budgets (voucher_id, budget_id, amount) VALUES (?1, ?2, ?3)",
      params![voucher_id, allocation.budget_id, allocation.amount],
    )?;
  }
  for allocation in earmarks {
    conn.execute(
      "INSERT INTO voucher_earmarks (voucher_id, earmark_id, amount) VALUES (?1, ?2, ?3)",
      params![voucher_id, allocation.earmark_id, allocation.amount],
    )?;
  }
  Ok(())
}

fn link_tags(conn: &Connection, voucher_id: i64, tags: &[String]) -> Result<(), AppError> {
  let tag_ids = resolve_tag_ids(conn, tags)?;
  for tag_id in tag_ids {
    conn.execute(
      "INSERT OR IGNORE INTO voucher_tags (voucher_id, tag_id) VALUES (?1, ?2)",
      params![voucher_id, tag_id],
    )?;
  }
  Ok(())
}

fn resolve_tag_ids(conn: &Connection, tags: &[String]) -> Result<Vec<i64>, AppError> {
  let mut ids = Vec::new();
  for name in tags {
    let name = name.trim();
    if name.is_empty() {
      continue;
    }
    conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
    let id: i64 = conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
      row.get(0)
    })?;
    ids.push(id);
  }
  Ok(ids)
}

fn voucher_tag_names(conn: &Connection, voucher_id: i64) -> Result<Vec<String>, AppError> {
  let mut stmt = conn.prepare(
    "SELECT t.name FROM voucher_tags vt JOIN tags t ON t.id = vt.tag_id
     WHERE vt.voucher_id = ?1 ORDER BY t.name",
  )?;
  let rows = stmt.query_map(params![voucher_id], |row| row.get(0))?;
  let mut names = Vec::new();
  for row in rows {
    names.push(row?);
  }
  Ok(names)
}

enum AssignTarget {
  Budget(i64),
  Earmark(i64),
  Category(i64),
  Tags(Vec<String>),
}

fn resolve_target(assignment: &BatchAssignment) -> Result<AssignTarget, AppError> {
  let mut targets = Vec::new();
  if let Some(budget_id) = assignment.budget_id {
    targets.push(AssignTarget::Budget(budget_id));
  }
  if let Some(earmark_id) = assignment.earmark_id {
    targets.push(AssignTarget::Earmark(earmark_id));
  }
  if let Some(category_id) = assignment.category_id {
    targets.push(AssignTarget::Category(category_id));
  }
  if let Some(tags) = assignment.tags.clone() {
    targets.push(AssignTarget::Tags(tags));
  }
  if targets.len() != 1 {
    return Err(AppError::validation("Genau ein Zuordnungsziel angeben"));
  }
  Ok(targets.remove(0))
}

fn check_target_exists(conn: &Connection, target: &AssignTarget) -> Result<(), AppError> {
  match target {
    AssignTarget::Budget(budget_id) => {
      conn
        .query_row("SELECT id FROM budgets WHERE id = ?1", params![budget_id], |row| {
          row.get::<_, i64>(0)
        })
        .map_err(|err| AppError::or_not_found(err, format!("Budget {budget_id} nicht gefunden")))?;
    }
    AssignTarget::Earmark(earmark_id) => {
      let is_active: i64 = conn
        .query_row(
          "SELECT is_active FROM earmarks WHERE id = ?1",
          params![earmark_id],
          |row| row.get(0),
        )
        .map_err(|err| AppError::or_not_found(err, format!("Zweckbindung {earmark_id} nicht gefunden")))?;
      if is_active == 0 {
        return Err(AppError::validation("Zweckbindung ist deaktiviert"));
      }
    }
    AssignTarget::Category(category_id) => {
      let is_active: i64 = conn
        .query_row(
          "SELECT is_active FROM categories WHERE id = ?1",
          params![category_id],
          |row| row.get(0),
        )
        .map_err(|err| AppError::or_not_found(err, format!("Kategorie {category_id} nicht gefunden")))?;
      if is_active == 0 {
        return Err(AppError::validation("Kategorie ist deaktiviert"));
      }
    }
    AssignTarget::Tags(tags) => {
      if tags.iter().all(|name| name.trim().is_empty()) {
        return Err(AppError::validation("Mindestens ein Tag angeben"));
      }
    }
  }
  Ok(())
}

fn has_any_budget(conn: &Connection, voucher_id: i64) -> Result<bool, AppError> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM voucher_budgets WHERE voucher_id = ?1",
    params![voucher_id],
    |row| row.get(0),
  )?;
  Ok(count > 0)
}

fn has_any_earmark(conn: &Connection, voucher_id: i64) -> Result<bool, AppError> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM voucher_earmarks WHERE voucher_id = ?1",
    params![voucher_id],
    |row| row.get(0),
  )?;
  Ok(count > 0)
}

fn fetch_allocation(
  conn: &Connection,
  table: &str,
  id_column: &str,
  voucher_id: i64,
  target_id: i64,
) -> Result<Option<f64>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT amount FROM {table} WHERE voucher_id = ?1 AND {id_column} = ?2"
  ))?;
  let mut rows = stmt.query(params![voucher_id, target_id])?;
  if let Some(row) = rows.next()? {
    Ok(Some(row.get(0)?))
  } else {
    Ok(None)
  }
}
