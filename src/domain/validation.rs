use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{
  BudgetAllocation, EarmarkAllocation, VoucherInput, PAYMENT_METHODS, SPHERES, VOUCHER_TYPES,
};

pub fn parse_date(date: &str) -> Result<NaiveDate, AppError> {
  NaiveDate::parse_from_str(date, "%Y-%m-%d")
    .map_err(|_| AppError::new("INVALID_DATE", "Datum muss YYYY-MM-DD sein"))
}

pub fn ensure_vat_rate(rate: f64) -> Result<(), AppError> {
  if !(0.0..=100.0).contains(&rate) {
    Err(AppError::new("INVALID_VAT", "Steuersatz muss zwischen 0 und 100 liegen"))
  } else {
    Ok(())
  }
}

fn ensure_payment_method(value: &str) -> Result<(), AppError> {
  if !PAYMENT_METHODS.contains(&value) {
    Err(AppError::validation("Zahlungsart muss BAR oder BANK sein"))
  } else {
    Ok(())
  }
}

pub fn ensure_type_rules(input: &VoucherInput) -> Result<(), AppError> {
  if !VOUCHER_TYPES.contains(&input.voucher_type.as_str()) {
    return Err(AppError::validation("Belegart muss IN, OUT oder TRANSFER sein"));
  }

  if let Some(sphere) = input.sphere.as_deref() {
    if !SPHERES.contains(&sphere) {
      return Err(AppError::validation(
        "Sphaere muss IDEELL, ZWECK, VERMOEGEN oder WGB sein",
      ));
    }
  } else if input.category_id.is_none() {
    return Err(AppError::validation("Sphaere oder Kategorie angeben"));
  }

  if input.voucher_type == "TRANSFER" {
    if input.payment_method.is_some() {
      return Err(AppError::validation("Transfer darf keine Zahlungsart haben"));
    }
    let from = input
      .transfer_from
      .as_deref()
      .ok_or_else(|| AppError::validation("Transfer benoetigt ein Von-Konto"))?;
    let to = input
      .transfer_to
      .as_deref()
      .ok_or_else(|| AppError::validation("Transfer benoetigt ein Nach-Konto"))?;
    ensure_payment_method(from)?;
    ensure_payment_method(to)?;
    if from == to {
      return Err(AppError::validation("Von- und Nach-Konto muessen sich unterscheiden"));
    }
  } else {
    if input.transfer_from.is_some() || input.transfer_to.is_some() {
      return Err(AppError::validation("Transferkonten nur bei TRANSFER erlaubt"));
    }
    match input.payment_method.as_deref() {
      Some(value) => ensure_payment_method(value)?,
      None => {
        if input.category_id.is_none() {
          return Err(AppError::validation("Zahlungsart fehlt"));
        }
      }
    }
  }

  Ok(())
}

pub fn ensure_allocations(
  budgets: &[BudgetAllocation],
  earmarks: &[EarmarkAllocation],
) -> Result<(), AppError> {
  let mut seen_budgets = HashSet::new();
  for allocation in budgets {
    if !seen_budgets.insert(allocation.budget_id) {
      return Err(AppError::validation(format!(
        "Doppelte Budgetzuordnung fuer Budget {}",
        allocation.budget_id
      )));
    }
    if allocation.amount < 0.0 {
      return Err(AppError::validation("Zuordnungsbetrag darf nicht negativ sein"));
    }
  }

  let mut seen_earmarks = HashSet::new();
  for allocation in earmarks {
    if !seen_earmarks.insert(allocation.earmark_id) {
      return Err(AppError::validation(format!(
        "Doppelte Zweckbindung fuer Zweckbindung {}",
        allocation.earmark_id
      )));
    }
    if allocation.amount < 0.0 {
      return Err(AppError::validation("Zuordnungsbetrag darf nicht negativ sein"));
    }
  }

  Ok(())
}
