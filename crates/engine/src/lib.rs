//! Ledgerlink engine: the workflows that move data between the provider
//! and the store.
//!
//! - [`lifecycle`]: device-flow authorization, token refresh, revocation and
//!   the status transitions they cause.
//! - [`sync`]: account, balance and transaction import for one connection.
//! - [`webhook`]: signature verification, deduplicated recording and
//!   processing of provider callbacks.
//! - [`scoring`]: credit assessment over a user's imported ledger.
//! - [`payments`]: bill payments submitted through a connection.
//!
//! Every workflow is written against [`Store`](ledgerlink_db::store::Store)
//! and [`OpenBankingApi`](ledgerlink_openbanking::OpenBankingApi), bundled in
//! an [`EngineContext`].

pub mod context;
pub mod lifecycle;
pub mod locks;
pub mod payments;
pub mod scoring;
pub mod sync;
pub mod webhook;

pub use context::EngineContext;
pub use lifecycle::{ConnectionLifecycle, DeviceFlowStarted, LifecycleError, PollOutcome};
pub use locks::ConnectionLocks;
pub use payments::{BillPaymentRequest, BillPayments, PaymentError};
pub use scoring::{CreditScoringEngine, ScoringError};
pub use sync::{AccountFailure, SyncEngine, SyncError, SyncReport, UserSyncSummary};
pub use webhook::{Recorded, RetrySummary, WebhookError, WebhookHeaders, WebhookProcessor};
