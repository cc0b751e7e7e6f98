mod common;

use budgeto_ledger::ledger;
use budgeto_ledger::masterdata;
use budgeto_ledger::models::*;

use common::{test_db, voucher_input};

#[test]
fn create_derives_net_from_gross() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2025-03-01", "OUT", 119.0), None).unwrap();
  assert_eq!(created.gross_amount, 119.0);
  assert!(created.warnings.is_empty());

  let detail = ledger::get_voucher(&db, created.id).unwrap();
  assert_eq!(detail.voucher.net_amount, 100.0);
  assert_eq!(detail.voucher.vat_amount, 19.0);
  assert_eq!(detail.voucher.voucher_no, "000001");
}

#[test]
fn create_derives_gross_from_net() {
  let db = test_db();
  let mut input = voucher_input("2025-03-01", "IN", 0.0);
  input.gross_amount = None;
  input.net_amount = Some(100.0);
  let created = ledger::create_voucher(&db, input, None).unwrap();
  assert_eq!(created.gross_amount, 119.0);
}

#[test]
fn create_rejects_missing_amounts() {
  let db = test_db();
  let mut input = voucher_input("2025-03-01", "OUT", 0.0);
  input.gross_amount = None;
  input.net_amount = None;
  let err = ledger::create_voucher(&db, input, None).unwrap_err();
  assert_eq!(err.code, "VALIDATION");
}

#[test]
fn transfer_with_equal_legs_rejected() {
  let db = test_db();
  let mut input = voucher_input("2025-03-01", "TRANSFER", 50.0);
  input.payment_method = None;
  input.transfer_from = Some("BAR".to_string());
  input.transfer_to = Some("BAR".to_string());
  let err = ledger::create_voucher(&db, input, None).unwrap_err();
  assert_eq!(err.code, "VALIDATION");
}

#[test]
fn transfer_with_distinct_legs_accepted() {
  let db = test_db();
  let mut input = voucher_input("2025-03-01", "TRANSFER", 50.0);
  input.payment_method = None;
  input.transfer_from = Some("BAR".to_string());
  input.transfer_to = Some("BANK".to_string());
  input.vat_rate = 0.0;
  let created = ledger::create_voucher(&db, input, None).unwrap();
  let detail = ledger::get_voucher(&db, created.id).unwrap();
  assert_eq!(detail.voucher.transfer_from.as_deref(), Some("BAR"));
  assert_eq!(detail.voucher.transfer_to.as_deref(), Some("BANK"));
}

#[test]
fn duplicate_budget_allocation_rejected() {
  let db = test_db();
  let budget = masterdata::create_budget(
    &db,
    BudgetInput {
      name: "Jugendarbeit".to_string(),
      sphere: Some("IDEELL".to_string()),
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

  let mut input = voucher_input("2025-03-01", "OUT", 119.0);
  input.budgets = Some(vec![
    BudgetAllocation { budget_id: budget.id, amount: 50.0 },
    BudgetAllocation { budget_id: budget.id, amount: 30.0 },
  ]);
  let err = ledger::create_voucher(&db, input, None).unwrap_err();
  assert_eq!(err.code, "VALIDATION");
}

#[test]
fn allocation_to_unknown_budget_fails() {
  let db = test_db();
  let mut input = voucher_input("2025-03-01", "OUT", 119.0);
  input.budgets = Some(vec![BudgetAllocation { budget_id: 99, amount: 10.0 }]);
  let err = ledger::create_voucher(&db, input, None).unwrap_err();
  assert_eq!(err.code, "NOT_FOUND");
}

#[test]
fn reverse_creates_mirror_and_flags_original() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2025-03-01", "OUT", 119.0), None).unwrap();

  let reversed = ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: created.id,
      reason: Some("Fehlbuchung".to_string()),
      date: Some("2025-03-10".to_string()),
    },
    None,
  )
  .unwrap();

  let storno = ledger::get_voucher(&db, reversed.id).unwrap();
  assert_eq!(storno.voucher.net_amount, -100.0);
  assert_eq!(storno.voucher.gross_amount, -119.0);
  assert_eq!(storno.voucher.vat_rate, 19.0);
  assert_eq!(storno.voucher.original_id, Some(created.id));
  assert!(storno.voucher.note.as_deref().unwrap().contains("Fehlbuchung"));

  let original = ledger::get_voucher(&db, created.id).unwrap();
  assert!(original.voucher.is_reversed);
}

#[test]
fn reversing_twice_fails() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2025-03-01", "OUT", 119.0), None).unwrap();
  let request = ReverseInput {
    original_id: created.id,
    reason: None,
    date: Some("2025-03-10".to_string()),
  };
  ledger::reverse_voucher(&db, request.clone(), None).unwrap();
  let err = ledger::reverse_voucher(&db, request, None).unwrap_err();
  assert_eq!(err.code, "ALREADY_REVERSED");

  let listed = ledger::list_vouchers(
    &db,
    VoucherFilter {
      year: 2025,
      month: None,
      voucher_type: None,
      page: 1,
      page_size: 50,
      search: None,
    },
  )
  .unwrap();
  let stornos: Vec<_> = listed
    .items
    .iter()
    .filter(|item| item.original_id == Some(created.id))
    .collect();
  assert_eq!(stornos.len(), 1);
}

#[test]
fn storno_of_storno_rejected() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2025-03-01", "OUT", 119.0), None).unwrap();
  let reversed = ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: created.id,
      reason: None,
      date: Some("2025-03-10".to_string()),
    },
    None,
  )
  .unwrap();

  let err = ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: reversed.id,
      reason: None,
      date: Some("2025-03-11".to_string()),
    },
    None,
  )
  .unwrap_err();
  assert_eq!(err.code, "VALIDATION");
}

#[test]
fn reverse_unknown_voucher_fails() {
  let db = test_db();
  let err = ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: 42,
      reason: None,
      date: None,
    },
    None,
  )
  .unwrap_err();
  assert_eq!(err.code, "NOT_FOUND");
}

#[test]
fn period_lock_blocks_create_update_delete() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2024-06-01", "OUT", 119.0), None).unwrap();

  ledger::close_period(&db, "2024-12-31".to_string(), None).unwrap();

  let err = ledger::create_voucher(&db, voucher_input("2024-06-01", "OUT", 50.0), None).unwrap_err();
  assert_eq!(err.code, "PERIOD_LOCKED");

  let err = ledger::update_voucher(&db, created.id, voucher_input("2024-06-01", "OUT", 60.0), None)
    .unwrap_err();
  assert_eq!(err.code, "PERIOD_LOCKED");

  let err = ledger::delete_voucher(&db, created.id, None).unwrap_err();
  assert_eq!(err.code, "PERIOD_LOCKED");

  ledger::reopen_period(&db, None).unwrap();
  assert!(ledger::delete_voucher(&db, created.id, None).is_ok());
}

#[test]
fn moving_a_voucher_into_the_locked_range_is_blocked() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2025-02-01", "OUT", 119.0), None).unwrap();
  ledger::close_period(&db, "2024-12-31".to_string(), None).unwrap();

  let err = ledger::update_voucher(&db, created.id, voucher_input("2024-06-01", "OUT", 119.0), None)
    .unwrap_err();
  assert_eq!(err.code, "PERIOD_LOCKED");
}

#[test]
fn locked_voucher_can_only_be_reversed_past_the_boundary() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2024-06-01", "OUT", 119.0), None).unwrap();
  ledger::close_period(&db, "2024-12-31".to_string(), None).unwrap();

  let err = ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: created.id,
      reason: None,
      date: Some("2024-11-30".to_string()),
    },
    None,
  )
  .unwrap_err();
  assert_eq!(err.code, "PERIOD_LOCKED");

  let reversed = ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: created.id,
      reason: None,
      date: Some("2025-01-15".to_string()),
    },
    None,
  )
  .unwrap();
  let original = ledger::get_voucher(&db, created.id).unwrap();
  assert!(original.voucher.is_reversed);
  let storno = ledger::get_voucher(&db, reversed.id).unwrap();
  assert_eq!(storno.voucher.gross_amount, -119.0);
}

#[test]
fn delete_of_reversed_voucher_is_blocked() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2025-03-01", "OUT", 119.0), None).unwrap();
  ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: created.id,
      reason: None,
      date: Some("2025-03-10".to_string()),
    },
    None,
  )
  .unwrap();

  let err = ledger::delete_voucher(&db, created.id, None).unwrap_err();
  assert_eq!(err.code, "ALREADY_REVERSED");
}

#[test]
fn deleting_a_storno_releases_the_original() {
  let db = test_db();
  let created = ledger::create_voucher(&db, voucher_input("2025-03-01", "OUT", 119.0), None).unwrap();
  let reversed = ledger::reverse_voucher(
    &db,
    ReverseInput {
      original_id: created.id,
      reason: None,
      date: Some("2025-03-10".to_string()),
    },
    None,
  )
  .unwrap();

  ledger::delete_voucher(&db, reversed.id, None).unwrap();
  let original = ledger::get_voucher(&db, created.id).unwrap();
  assert!(!original.voucher.is_reversed);
}

#[test]
fn update_replaces_allocations_and_tags() {
  let db = test_db();
  let budget = masterdata::create_budget(
    &db,
    BudgetInput {
      name: "Vereinsfest".to_string(),
      sphere: Some("IDEELL".to_string()),
      year: 2025,
      amount_planned: 500.0,
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
  input.tags = Some(vec!["Fest".to_string()]);
  let created = ledger::create_voucher(&db, input, None).unwrap();

  let mut replacement = voucher_input("2025-04-02", "OUT", 238.0);
  replacement.tags = Some(vec!["Nachtrag".to_string()]);
  ledger::update_voucher(&db, created.id, replacement, None).unwrap();

  let detail = ledger::get_voucher(&db, created.id).unwrap();
  assert_eq!(detail.voucher.gross_amount, 238.0);
  assert_eq!(detail.voucher.net_amount, 200.0);
  assert!(detail.budgets.is_empty());
  assert_eq!(detail.tags, vec!["Nachtrag".to_string()]);
}

#[test]
fn update_of_unknown_voucher_fails() {
  let db = test_db();
  let err = ledger::update_voucher(&db, 7, voucher_input("2025-03-01", "OUT", 119.0), None).unwrap_err();
  assert_eq!(err.code, "NOT_FOUND");
}

#[test]
fn voucher_numbers_are_sequential() {
  let db = test_db();
  let first = ledger::create_voucher(&db, voucher_input("2025-01-01", "IN", 10.0), None).unwrap();
  let second = ledger::create_voucher(&db, voucher_input("2025-01-02", "IN", 20.0), None).unwrap();
  assert_eq!(first.voucher_no, "000001");
  assert_eq!(second.voucher_no, "000002");
}
