//! Shared dependencies of the engine workflows.

use std::sync::Arc;

use ledgerlink_core::signing::{ConsentCipher, Credentials};
use ledgerlink_core::token_cipher::TokenCipher;
use ledgerlink_db::store::Store;
use ledgerlink_events::EventBus;
use ledgerlink_openbanking::{OpenBankingApi, RetryPolicy};

use crate::locks::ConnectionLocks;

/// Everything a workflow needs, cheap to clone.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn Store>,
    pub provider: Arc<dyn OpenBankingApi>,
    /// Encrypts tokens before they reach the store.
    pub tokens: TokenCipher,
    /// Client credentials, used to verify inbound webhook signatures.
    pub credentials: Credentials,
    /// Recovers consent tokens from access tokens.
    pub consent: ConsentCipher,
    pub retry: RetryPolicy,
    pub locks: Arc<ConnectionLocks>,
    pub events: Arc<EventBus>,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn OpenBankingApi>,
        tokens: TokenCipher,
        credentials: Credentials,
        events: Arc<EventBus>,
    ) -> Self {
        let consent = ConsentCipher::new(&credentials.client_secret);
        Self {
            store,
            provider,
            tokens,
            credentials,
            consent,
            retry: RetryPolicy::default(),
            locks: Arc::new(ConnectionLocks::new()),
            events,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
