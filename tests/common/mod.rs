use budgeto_ledger::db::{self, Db};
use budgeto_ledger::models::VoucherInput;

pub fn test_db() -> Db {
  db::init_db_in_memory().expect("in-memory db")
}

pub fn voucher_input(date: &str, voucher_type: &str, gross_amount: f64) -> VoucherInput {
  VoucherInput {
    date: date.to_string(),
    voucher_type: voucher_type.to_string(),
    sphere: Some("IDEELL".to_string()),
    category_id: None,
    description: None,
    net_amount: None,
    gross_amount: Some(gross_amount),
    vat_rate: 19.0,
    payment_method: Some("BANK".to_string()),
    transfer_from: None,
    transfer_to: None,
    note: None,
    budgets: None,
    earmarks: None,
    tags: None,
  }
}
