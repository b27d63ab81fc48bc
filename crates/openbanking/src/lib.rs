//! Client for the third-party Open Banking provider.
//!
//! - [`client`]: the [`OpenBankingApi`](client::OpenBankingApi) seam and its
//!   reqwest-backed implementation, which signs every request.
//! - [`error`]: the [`ProviderError`](error::ProviderError) taxonomy shared by
//!   the client and the retry policy.
//! - [`retry`]: bounded retries with exponential backoff and per-context
//!   rate-limit escalation.
//! - [`pacer`]: minimum spacing between outgoing calls.

pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod pacer;
pub mod retry;

pub use client::{OpenBankingApi, OpenBankingClient, Session};
pub use config::OpenBankingConfig;
pub use error::{DevicePollError, ProviderError};
pub use retry::{RetryConfig, RetryPolicy};
