use rusqlite::{params, Connection};

use crate::db::{self, Db};
use crate::error::AppError;
use crate::models::{BudgetUsage, EarmarkUsage, SphereTotal, YearSummary};

/// Usage of an earmarked fund: IN vouchers allocate into it, OUT vouchers
/// release from it. Stornos carry negated allocation copies, so reversed
/// pairs cancel out without special casing here.
pub fn get_earmark_usage(db: &Db, earmark_id: i64) -> Result<EarmarkUsage, AppError> {
  db::with_conn(db, |conn| earmark_usage(conn, earmark_id))
}

fn earmark_usage(conn: &Connection, earmark_id: i64) -> Result<EarmarkUsage, AppError> {
  let (name, budget, enforce, start_date, end_date): (String, Option<f64>, i64, Option<String>, Option<String>) =
    conn
      .query_row(
        "SELECT name, budget, enforce_time_range, start_date, end_date FROM earmarks WHERE id = ?1",
        params![earmark_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
      )
      .map_err(|err| AppError::or_not_found(err, format!("Zweckbindung {earmark_id} nicht gefunden")))?;

  let (allocated, released) = conn.query_row(
    "SELECT
        COALESCE(SUM(CASE WHEN v.type = 'IN' THEN ve.amount END), 0),
        COALESCE(SUM(CASE WHEN v.type = 'OUT' THEN ve.amount END), 0)
     FROM voucher_earmarks ve
     JOIN vouchers v ON v.id = ve.voucher_id
     WHERE ve.earmark_id = ?1",
    params![earmark_id],
    |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
  )?;

  // Soft time-range enforcement: out-of-range bookings were accepted at
  // write time, they just show up here as outside.
  let (allocated_outside_range, released_outside_range) = if enforce == 1 {
    let start = start_date.unwrap_or_else(|| "0000-00-00".to_string());
    let end = end_date.unwrap_or_else(|| "9999-12-31".to_string());
    conn.query_row(
      "SELECT
          COALESCE(SUM(CASE WHEN v.type = 'IN' THEN ve.amount END), 0),
          COALESCE(SUM(CASE WHEN v.type = 'OUT' THEN ve.amount END), 0)
       FROM voucher_earmarks ve
       JOIN vouchers v ON v.id = ve.voucher_id
       WHERE ve.earmark_id = ?1 AND (v.date < ?2 OR v.date > ?3)",
      params![earmark_id, start, end],
      |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
    )?
  } else {
    (0.0, 0.0)
  };

  let balance = allocated - released;
  Ok(EarmarkUsage {
    earmark_id,
    name,
    budget,
    allocated,
    released,
    balance,
    remaining: budget.map(|ceiling| ceiling + balance),
    allocated_outside_range,
    released_outside_range,
  })
}

pub fn get_budget_usage(db: &Db, budget_id: i64) -> Result<BudgetUsage, AppError> {
  db::with_conn(db, |conn| {
    let (name, amount_planned): (String, f64) = conn
      .query_row(
        "SELECT name, amount_planned FROM budgets WHERE id = ?1",
        params![budget_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .map_err(|err| AppError::or_not_found(err, format!("Budget {budget_id} nicht gefunden")))?;

    let allocated: f64 = conn.query_row(
      "SELECT COALESCE(SUM(amount), 0) FROM voucher_budgets WHERE budget_id = ?1",
      params![budget_id],
      |row| row.get(0),
    )?;

    Ok(BudgetUsage {
      budget_id,
      name,
      amount_planned,
      allocated,
      remainder: amount_planned - allocated,
    })
  })
}

pub fn get_year_summary(db: &Db, year: i32) -> Result<YearSummary, AppError> {
  db::with_conn(db, |conn| {
    let (income_total, expense_total) = conn.query_row(
      "SELECT
          COALESCE(SUM(CASE WHEN type = 'IN' THEN gross_amount END), 0),
          COALESCE(SUM(CASE WHEN type = 'OUT' THEN gross_amount END), 0)
       FROM vouchers WHERE year = ?1",
      params![year],
      |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
    )?;

    let mut spheres = Vec::new();
    let mut stmt = conn.prepare(
      "SELECT COALESCE(sphere, 'OHNE'),
          COALESCE(SUM(CASE WHEN type = 'IN' THEN gross_amount END), 0),
          COALESCE(SUM(CASE WHEN type = 'OUT' THEN gross_amount END), 0),
          COALESCE(SUM(CASE WHEN type = 'IN' THEN vat_amount END), 0),
          COALESCE(SUM(CASE WHEN type = 'OUT' THEN vat_amount END), 0)
       FROM vouchers
       WHERE year = ?1 AND type != 'TRANSFER'
       GROUP BY COALESCE(sphere, 'OHNE')
       ORDER BY COALESCE(sphere, 'OHNE')",
    )?;
    let rows = stmt.query_map(params![year], |row| {
      let income: f64 = row.get(1)?;
      let expense: f64 = row.get(2)?;
      Ok(SphereTotal {
        sphere: row.get(0)?,
        income,
        expense,
        vat_income: row.get(3)?,
        vat_expense: row.get(4)?,
        result: income - expense,
      })
    })?;
    for row in rows {
      spheres.push(row?);
    }

    Ok(YearSummary {
      year,
      income_total,
      expense_total,
      result: income_total - expense_total,
      spheres,
    })
  })
}
