use serde::{Deserialize, Serialize};

pub const SPHERES: [&str; 4] = ["IDEELL", "ZWECK", "VERMOEGEN", "WGB"];
pub const PAYMENT_METHODS: [&str; 2] = ["BAR", "BANK"];
pub const VOUCHER_TYPES: [&str; 3] = ["IN", "OUT", "TRANSFER"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BudgetAllocation {
  pub budget_id: i64,
  pub amount: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EarmarkAllocation {
  pub earmark_id: i64,
  pub amount: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoucherInput {
  pub date: String,
  #[serde(rename = "type")]
  pub voucher_type: String,
  pub sphere: Option<String>,
  pub category_id: Option<i64>,
  pub description: Option<String>,
  pub net_amount: Option<f64>,
  pub gross_amount: Option<f64>,
  pub vat_rate: f64,
  pub payment_method: Option<String>,
  pub transfer_from: Option<String>,
  pub transfer_to: Option<String>,
  pub note: Option<String>,
  pub budgets: Option<Vec<BudgetAllocation>>,
  pub earmarks: Option<Vec<EarmarkAllocation>>,
  pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoucherCreated {
  pub id: i64,
  pub voucher_no: String,
  pub gross_amount: f64,
  pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoucherUpdated {
  pub id: i64,
  pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReverseInput {
  pub original_id: i64,
  pub reason: Option<String>,
  pub date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoucherReversed {
  pub id: i64,
  pub voucher_no: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoucherListItem {
  pub id: i64,
  pub voucher_no: String,
  pub date: String,
  pub year: i32,
  pub month: i32,
  #[serde(rename = "type")]
  pub voucher_type: String,
  pub sphere: Option<String>,
  pub category_id: Option<i64>,
  pub category_name: Option<String>,
  pub description: Option<String>,
  pub net_amount: f64,
  pub vat_rate: f64,
  pub vat_amount: f64,
  pub gross_amount: f64,
  pub payment_method: Option<String>,
  pub transfer_from: Option<String>,
  pub transfer_to: Option<String>,
  pub note: Option<String>,
  pub original_id: Option<i64>,
  pub is_reversed: bool,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoucherDetail {
  #[serde(flatten)]
  pub voucher: VoucherListItem,
  pub budgets: Vec<BudgetAllocation>,
  pub earmarks: Vec<EarmarkAllocation>,
  pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoucherFilter {
  pub year: i32,
  pub month: Option<i32>,
  #[serde(rename = "type")]
  pub voucher_type: Option<String>,
  pub page: i64,
  pub page_size: i64,
  pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub total: i64,
  pub items: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchAssignFilter {
  pub date_from: Option<String>,
  pub date_to: Option<String>,
  #[serde(rename = "type")]
  pub voucher_type: Option<String>,
  pub payment_method: Option<String>,
  pub sphere: Option<String>,
  pub search: Option<String>,
  pub only_without: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchAssignment {
  pub budget_id: Option<i64>,
  pub earmark_id: Option<i64>,
  pub category_id: Option<i64>,
  pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchAssignResult {
  pub updated_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Budget {
  pub id: i64,
  pub name: String,
  pub sphere: Option<String>,
  pub year: i32,
  pub amount_planned: f64,
  pub earmark_id: Option<i64>,
  pub enforce_time_range: bool,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BudgetInput {
  pub name: String,
  pub sphere: Option<String>,
  pub year: i32,
  pub amount_planned: f64,
  pub earmark_id: Option<i64>,
  pub enforce_time_range: bool,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Earmark {
  pub id: i64,
  pub name: String,
  pub budget: Option<f64>,
  pub is_active: bool,
  pub enforce_time_range: bool,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EarmarkInput {
  pub name: String,
  pub budget: Option<f64>,
  pub enforce_time_range: bool,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
  pub id: i64,
  pub name: String,
  pub sphere: Option<String>,
  pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CategoryInput {
  pub name: String,
  pub sphere: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tag {
  pub id: i64,
  pub name: String,
  pub color: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeriodLockStatus {
  pub closed_until: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EarmarkUsage {
  pub earmark_id: i64,
  pub name: String,
  pub budget: Option<f64>,
  pub allocated: f64,
  pub released: f64,
  pub balance: f64,
  pub remaining: Option<f64>,
  pub allocated_outside_range: f64,
  pub released_outside_range: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BudgetUsage {
  pub budget_id: i64,
  pub name: String,
  pub amount_planned: f64,
  pub allocated: f64,
  pub remainder: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SphereTotal {
  pub sphere: String,
  pub income: f64,
  pub expense: f64,
  pub vat_income: f64,
  pub vat_expense: f64,
  pub result: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct YearSummary {
  pub year: i32,
  pub income_total: f64,
  pub expense_total: f64,
  pub result: f64,
  pub spheres: Vec<SphereTotal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub id: i64,
  pub ts: String,
  pub actor: Option<String>,
  pub action: String,
  pub entity_type: String,
  pub entity_id: Option<String>,
  pub ref_id: Option<String>,
  pub payload_json: String,
  pub details: Option<String>,
}
