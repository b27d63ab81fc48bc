//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the insert DTOs the repositories accept.

pub mod account_balance;
pub mod bank_connection;
pub mod bill_payment;
pub mod credit_score;
pub mod financial_profile;
pub mod transaction;
pub mod user;
pub mod webhook_event;
