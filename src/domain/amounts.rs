use crate::error::AppError;

/// Exactly one of net or gross is supplied at the boundary; the enum makes
/// the "neither" and "both" shapes unrepresentable past this point.
#[derive(Debug, Clone, Copy)]
pub enum AmountInput {
  Net(f64),
  Gross(f64),
}

#[derive(Debug, Clone, Copy)]
pub struct Amounts {
  pub net: f64,
  pub vat: f64,
  pub gross: f64,
}

impl AmountInput {
  pub fn from_fields(net: Option<f64>, gross: Option<f64>) -> Result<Self, AppError> {
    match (net, gross) {
      (Some(net), None) => Ok(AmountInput::Net(net)),
      (None, Some(gross)) => Ok(AmountInput::Gross(gross)),
      (Some(_), Some(_)) => Err(AppError::validation(
        "Entweder Netto- oder Bruttobetrag angeben, nicht beides",
      )),
      (None, None) => Err(AppError::validation(
        "Entweder Netto- oder Bruttobetrag angeben",
      )),
    }
  }
}

/// Rounds half away from zero, like the desktop UI does.
pub fn round_currency(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

pub fn normalize(input: AmountInput, vat_rate: f64) -> Amounts {
  let factor = 1.0 + vat_rate / 100.0;
  let (net, gross) = match input {
    AmountInput::Net(net) => (net, net * factor),
    AmountInput::Gross(gross) => (gross / factor, gross),
  };
  let net = round_currency(net);
  let gross = round_currency(gross);
  Amounts {
    net,
    vat: round_currency(gross - net),
    gross,
  }
}

pub fn negate(amounts: Amounts) -> Amounts {
  Amounts {
    net: -amounts.net,
    vat: -amounts.vat,
    gross: -amounts.gross,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn derives_net_from_gross() {
    let amounts = normalize(AmountInput::Gross(119.0), 19.0);
    assert_eq!(amounts.net, 100.0);
    assert_eq!(amounts.vat, 19.0);
    assert_eq!(amounts.gross, 119.0);
  }

  #[test]
  fn derives_gross_from_net() {
    let amounts = normalize(AmountInput::Net(100.0), 19.0);
    assert_eq!(amounts.gross, 119.0);
    assert_eq!(amounts.vat, 19.0);
  }

  #[test]
  fn zero_rate_keeps_amounts_equal() {
    let amounts = normalize(AmountInput::Gross(50.55), 0.0);
    assert_eq!(amounts.net, 50.55);
    assert_eq!(amounts.vat, 0.0);
  }

  #[test]
  fn rounds_to_two_decimals() {
    let amounts = normalize(AmountInput::Gross(10.0), 7.0);
    assert_eq!(amounts.net, 9.35);
    assert_eq!(amounts.vat, 0.65);
    assert!((amounts.net * 1.07 - amounts.gross).abs() < 0.01);
  }

  #[test]
  fn rejects_missing_amounts() {
    let err = AmountInput::from_fields(None, None).unwrap_err();
    assert_eq!(err.code, "VALIDATION");
  }

  #[test]
  fn rejects_both_amounts() {
    let err = AmountInput::from_fields(Some(1.0), Some(1.19)).unwrap_err();
    assert_eq!(err.code, "VALIDATION");
  }

  #[test]
  fn negation_mirrors_all_three_figures() {
    let amounts = negate(normalize(AmountInput::Gross(119.0), 19.0));
    assert_eq!(amounts.net, -100.0);
    assert_eq!(amounts.vat, -19.0);
    assert_eq!(amounts.gross, -119.0);
  }
}
