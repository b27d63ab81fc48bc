//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod account_balance_repo;
pub mod bank_connection_repo;
pub mod bill_payment_repo;
pub mod credit_score_repo;
pub mod financial_profile_repo;
pub mod transaction_repo;
pub mod user_repo;
pub mod webhook_event_repo;

pub use account_balance_repo::AccountBalanceRepo;
pub use bank_connection_repo::BankConnectionRepo;
pub use bill_payment_repo::BillPaymentRepo;
pub use credit_score_repo::CreditScoreRepo;
pub use financial_profile_repo::FinancialProfileRepo;
pub use transaction_repo::TransactionRepo;
pub use user_repo::UserRepo;
pub use webhook_event_repo::WebhookEventRepo;
