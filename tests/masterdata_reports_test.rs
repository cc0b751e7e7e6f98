mod common;

use budgeto_ledger::db;
use budgeto_ledger::ledger;
use budgeto_ledger::masterdata;
use budgeto_ledger::models::*;
use budgeto_ledger::reports;

use common::{test_db, voucher_input};

fn earmark_with_range(db: &budgeto_ledger::db::Db, enforce: bool) -> Earmark {
  masterdata::create_earmark(
    db,
    EarmarkInput {
      name: "Jugendfonds".to_string(),
      budget: Some(1000.0),
      enforce_time_range: enforce,
      start_date: if enforce { Some("2025-01-01".to_string()) } else { None },
      end_date: if enforce { Some("2025-12-31".to_string()) } else { None },
    },
    None,
  )
  .unwrap()
}

#[test]
fn budget_with_enforced_range_rejects_outside_voucher() {
  let db = test_db();
  let budget = masterdata::create_budget(
    &db,
    BudgetInput {
      name: "Projekt 2025".to_string(),
      sphere: Some("ZWECK".to_string()),
      year: 2025,
      amount_planned: 2000.0,
      earmark_id: None,
      enforce_time_range: true,
      start_date: Some("2025-01-01".to_string()),
      end_date: Some("2025-12-31".to_string()),
    },
    None,
  )
  .unwrap();

  let mut input = voucher_input("2024-11-01", "OUT", 119.0);
  input.budgets = Some(vec![BudgetAllocation { budget_id: budget.id, amount: 119.0 }]);
  let err = ledger::create_voucher(&db, input, None).unwrap_err();
  assert_eq!(err.code, "VALIDATION");

  let mut input = voucher_input("2025-06-01", "OUT", 119.0);
  input.budgets = Some(vec![BudgetAllocation { budget_id: budget.id, amount: 119.0 }]);
  assert!(ledger::create_voucher(&db, input, None).is_ok());
}

#[test]
fn earmark_range_is_soft_and_only_warns() {
  let db = test_db();
  let earmark = earmark_with_range(&db, true);

  let mut input = voucher_input("2024-11-01", "IN", 200.0);
  input.earmarks = Some(vec![EarmarkAllocation { earmark_id: earmark.id, amount: 200.0 }]);
  let created = ledger::create_voucher(&db, input, None).unwrap();
  assert_eq!(created.warnings.len(), 1);

  let mut expense = voucher_input("2026-02-01", "OUT", 50.0);
  expense.earmarks = Some(vec![EarmarkAllocation { earmark_id: earmark.id, amount: 50.0 }]);
  ledger::create_voucher(&db, expense, None).unwrap();

  let usage = reports::get_earmark_usage(&db, earmark.id).unwrap();
  assert_eq!(usage.allocated, 200.0);
  assert_eq!(usage.allocated_outside_range, 200.0);
  assert_eq!(usage.released_outside_range, 50.0);
}

#[test]
fn earmark_usage_tracks_allocated_and_released() {
  let db = test_db();
  let earmark = earmark_with_range(&db, false);

  let mut income = voucher_input("2025-02-01", "IN", 500.0);
  income.vat_rate = 0.0;
  income.earmarks = Some(vec![EarmarkAllocation { earmark_id: earmark.id, amount: 500.0 }]);
  ledger::create_voucher(&db, income, None).unwrap();

  let mut expense = voucher_input("2025-03-01", "OUT", 200.0);
  expense.vat_rate = 0.0;
  expense.earmarks = Some(vec![EarmarkAllocation { earmark_id: earmark.id, amount: 200.0 }]);
  ledger::create_voucher(&db, expense, None).unwrap();

  let usage = reports::get_earmark_usage(&db, earmark.id).unwrap();
  assert_eq!(usage.allocated, 500.0);
  assert_eq!(usage.released, 200.0);
  assert_eq!(usage.balance, 300.0);
  assert_eq!(usage.remaining, Some(1300.0));
}

#[test]
fn reversal_nets_earmark_usage_to_zero() {
  let db = test_db();
  let earmark = earmark_with_range(&db, false);

  let mut income = voucher_input("2025-02-01", "IN", 500.0);
  income.vat_rate = 0.0;
  income.earmarks = Some(vec![EarmarkAllocation { earmark_id: earmark.id, amount: 500.0 }]);
  let created = ledger::create_voucher(&db, income, None).unwrap();

  ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: created.id,
      reason: Some("Fehlbuchung".to_string()),
      date: Some("2025-02-15".to_string()),
    },
    None,
  )
  .unwrap();

  let usage = reports::get_earmark_usage(&db, earmark.id).unwrap();
  assert_eq!(usage.allocated, 0.0);
  assert_eq!(usage.balance, 0.0);
}

#[test]
fn budget_usage_reports_remainder() {
  let db = test_db();
  let budget = masterdata::create_budget(
    &db,
    BudgetInput {
      name: "Material".to_string(),
      sphere: None,
      year: 2025,
      amount_planned: 1000.0,
      earmark_id: None,
      enforce_time_range: false,
      start_date: None,
      end_date: None,
    },
    None,
  )
  .unwrap();

  let mut input = voucher_input("2025-04-01", "OUT", 119.0);
  input.budgets = Some(vec![BudgetAllocation { budget_id: budget.id, amount: 119.0 }]);
  ledger::create_voucher(&db, input, None).unwrap();

  let usage = reports::get_budget_usage(&db, budget.id).unwrap();
  assert_eq!(usage.amount_planned, 1000.0);
  assert_eq!(usage.allocated, 119.0);
  assert_eq!(usage.remainder, 881.0);
}

#[test]
fn negative_planned_amount_rejected() {
  let db = test_db();
  let err = masterdata::create_budget(
    &db,
    BudgetInput {
      name: "Kaputt".to_string(),
      sphere: None,
      year: 2025,
      amount_planned: -1.0,
      earmark_id: None,
      enforce_time_range: false,
      start_date: None,
      end_date: None,
    },
    None,
  )
  .unwrap_err();
  assert_eq!(err.code, "VALIDATION");
}

#[test]
fn enforced_range_requires_both_dates() {
  let db = test_db();
  let err = masterdata::create_earmark(
    &db,
    EarmarkInput {
      name: "Unvollstaendig".to_string(),
      budget: None,
      enforce_time_range: true,
      start_date: Some("2025-01-01".to_string()),
      end_date: None,
    },
    None,
  )
  .unwrap_err();
  assert_eq!(err.code, "VALIDATION");
}

#[test]
fn inactive_earmark_rejects_new_allocations() {
  let db = test_db();
  let earmark = earmark_with_range(&db, false);
  masterdata::deactivate_earmark(&db, earmark.id, None).unwrap();

  let mut input = voucher_input("2025-02-01", "IN", 100.0);
  input.earmarks = Some(vec![EarmarkAllocation { earmark_id: earmark.id, amount: 100.0 }]);
  let err = ledger::create_voucher(&db, input, None).unwrap_err();
  assert_eq!(err.code, "VALIDATION");
}

#[test]
fn deleting_a_tag_detaches_it_from_vouchers() {
  let db = test_db();
  let mut input = voucher_input("2025-03-01", "OUT", 50.0);
  input.tags = Some(vec!["Kassenpruefung".to_string()]);
  let created = ledger::create_voucher(&db, input, None).unwrap();

  let tags = masterdata::list_tags(&db).unwrap();
  assert_eq!(tags.len(), 1);
  masterdata::delete_tag(&db, tags[0].id, None).unwrap();

  let detail = ledger::get_voucher(&db, created.id).unwrap();
  assert!(detail.tags.is_empty());
}

#[test]
fn db_failure_is_not_reported_as_missing_row() {
  let db = test_db();
  db::with_conn(&db, |conn| {
    conn.execute_batch("DROP TABLE earmarks")?;
    Ok(())
  })
  .unwrap();

  let err = reports::get_earmark_usage(&db, 1).unwrap_err();
  assert_eq!(err.code, "DB_ERROR");
}

#[test]
fn year_summary_groups_by_sphere() {
  let db = test_db();
  let mut income = voucher_input("2025-01-10", "IN", 1190.0);
  income.sphere = Some("IDEELL".to_string());
  ledger::create_voucher(&db, income, None).unwrap();

  let mut expense = voucher_input("2025-02-10", "OUT", 238.0);
  expense.sphere = Some("WGB".to_string());
  ledger::create_voucher(&db, expense, None).unwrap();

  let summary = reports::get_year_summary(&db, 2025).unwrap();
  assert_eq!(summary.income_total, 1190.0);
  assert_eq!(summary.expense_total, 238.0);
  assert_eq!(summary.result, 952.0);
  assert_eq!(summary.spheres.len(), 2);

  let ideell = summary
    .spheres
    .iter()
    .find(|sphere| sphere.sphere == "IDEELL")
    .unwrap();
  assert_eq!(ideell.income, 1190.0);
  assert_eq!(ideell.vat_income, 190.0);
}
