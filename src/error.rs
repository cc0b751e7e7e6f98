use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize, Error)]
#[error("{code}: {message}")]
pub struct AppError {
  pub code: String,
  pub message: String,
}

impl AppError {
  pub fn new(code: &str, message: impl Into<String>) -> Self {
    Self {
      code: code.to_string(),
      message: message.into(),
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    AppError::new("VALIDATION", message)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    AppError::new("NOT_FOUND", message)
  }

  /// Missing rows become NOT_FOUND, everything else stays a DB error.
  pub fn or_not_found(err: rusqlite::Error, message: impl Into<String>) -> Self {
    match err {
      rusqlite::Error::QueryReturnedNoRows => AppError::not_found(message),
      other => other.into(),
    }
  }

  pub fn period_locked(closed_until: &str) -> Self {
    AppError::new(
      "PERIOD_LOCKED",
      format!("Periode bis {closed_until} abgeschlossen"),
    )
  }

  pub fn already_reversed(voucher_no: &str) -> Self {
    AppError::new(
      "ALREADY_REVERSED",
      format!("Beleg {voucher_no} wurde bereits storniert"),
    )
  }
}

impl From<rusqlite::Error> for AppError {
  fn from(err: rusqlite::Error) -> Self {
    AppError::new("DB_ERROR", err.to_string())
  }
}

impl From<std::io::Error> for AppError {
  fn from(err: std::io::Error) -> Self {
    AppError::new("IO_ERROR", err.to_string())
  }
}

impl<T> From<std::sync::PoisonError<T>> for AppError {
  fn from(_: std::sync::PoisonError<T>) -> Self {
    AppError::new("LOCK_ERROR", "Database lock failed")
  }
}
