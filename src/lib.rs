pub mod audit;
pub mod db;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod masterdata;
pub mod models;
pub mod reports;
