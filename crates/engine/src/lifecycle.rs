//! Connection lifecycle: authorization, refresh, revocation.
//!
//! Status changes go through [`ConnectionStatus::transition`] so illegal
//! moves are rejected before anything is written, and every actual change
//! is published on the event bus. Provider failures map onto lifecycle
//! events by [`failure_event`]:
//!
//! | Provider error          | Event      | Resulting status |
//! |-------------------------|------------|------------------|
//! | 400, 401                | `Lapsed`   | `expired`        |
//! | 403                     | `Revoked`  | `revoked`        |
//! | 429, 5xx, timeout, I/O  | none       | unchanged        |
//! | anything else           | `Failed`   | `error`          |

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use ledgerlink_core::connection_state::{consent_lapsed, ConnectionEvent, REFRESH_MARGIN_MINUTES};
use ledgerlink_core::jwt::consent_token_from_access_token;
use ledgerlink_core::status::ConnectionStatus;
use ledgerlink_core::token_cipher::TokenCipherError;
use ledgerlink_core::types::{DbId, Timestamp};
use ledgerlink_db::models::bank_connection::{
    BankConnection, CreateBankConnection, DeviceAuthorizationUpdate, TokenUpdate,
};
use ledgerlink_db::store::StoreError;
use ledgerlink_events::DomainEvent;
use ledgerlink_openbanking::messages::TokenResponse;
use ledgerlink_openbanking::{DevicePollError, ProviderError, Session};

use crate::context::EngineContext;

/// Scopes requested when the caller names none.
pub const DEFAULT_SCOPES: &[&str] = &[
    "accounts.list.readonly",
    "accounts.balance.readonly",
    "accounts.transactions.readonly",
];

/// The refresh sweep skips connections idle for longer than this.
pub const REFRESH_ACTIVITY_WINDOW_DAYS: i64 = 7;

const DEFAULT_POLL_INTERVAL_SECS: i32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Bank connection {0} not found")]
    ConnectionNotFound(DbId),

    #[error("User {0} not found")]
    UserNotFound(DbId),

    #[error("This bank account is already connected")]
    Duplicate,

    #[error("Connection {id} is {status}; cannot {action}")]
    InvalidState {
        id: DbId,
        status: ConnectionStatus,
        action: &'static str,
    },

    #[error("Device authorization expired before approval")]
    AuthorizationExpired,

    #[error("Device authorization was denied")]
    AccessDenied,

    #[error("Connection {0} has no stored token")]
    MissingToken(DbId),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Token cipher error: {0}")]
    Cipher(#[from] TokenCipherError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one token poll during the device flow.
#[derive(Debug)]
pub enum PollOutcome {
    /// Tokens were issued; the connection is active.
    Active(BankConnection),
    /// The user has not approved yet.
    Pending { retry_after: Duration },
    /// Polling too fast; the interval has been doubled.
    SlowDown { retry_after: Duration },
}

/// What the user needs to approve a new or renewed connection.
#[derive(Debug, Serialize)]
pub struct DeviceFlowStarted {
    pub connection: BankConnection,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

/// Lifecycle event a provider failure implies, or `None` when the failure
/// is transient and says nothing about the connection.
pub fn failure_event(err: &ProviderError) -> Option<ConnectionEvent> {
    match err {
        ProviderError::BadRequest { .. } | ProviderError::Unauthorized { .. } => {
            Some(ConnectionEvent::Lapsed)
        }
        ProviderError::Forbidden { .. } => Some(ConnectionEvent::Revoked),
        ProviderError::Cancelled => None,
        e if e.is_transient() => None,
        _ => Some(ConnectionEvent::Failed),
    }
}

fn action_for(event: ConnectionEvent) -> &'static str {
    match event {
        ConnectionEvent::TokenGranted => "activate",
        ConnectionEvent::Lapsed => "expire",
        ConnectionEvent::Revoked => "revoke",
        ConnectionEvent::Failed => "record a failure",
        ConnectionEvent::Reinitiated => "re-authorize",
    }
}

#[derive(Clone)]
pub struct ConnectionLifecycle {
    ctx: EngineContext,
}

impl ConnectionLifecycle {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub async fn load(&self, id: DbId) -> Result<BankConnection, LifecycleError> {
        self.ctx
            .store
            .find_connection(id)
            .await?
            .ok_or(LifecycleError::ConnectionNotFound(id))
    }

    // ---- authorization ----

    /// Create a pending connection and start the device-code grant.
    pub async fn initiate(
        &self,
        mut input: CreateBankConnection,
    ) -> Result<DeviceFlowStarted, LifecycleError> {
        if self.ctx.store.find_user(input.user_id).await?.is_none() {
            return Err(LifecycleError::UserNotFound(input.user_id));
        }
        if input.scopes.is_empty() {
            input.scopes = DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
        }

        let connection = match self.ctx.store.create_connection(&input).await {
            Ok(connection) => connection,
            Err(StoreError::Conflict(_)) => return Err(LifecycleError::Duplicate),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            connection_id = connection.id,
            user_id = connection.user_id,
            bank_code = %connection.bank_code,
            "Bank connection created",
        );

        self.start_device_flow(connection).await
    }

    /// Start a fresh device flow for an expired, revoked or failed
    /// connection.
    pub async fn reauthorize(&self, id: DbId) -> Result<DeviceFlowStarted, LifecycleError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let connection = self.load(id).await?;
        let status = connection.status();
        status
            .transition(ConnectionEvent::Reinitiated)
            .map_err(|_| LifecycleError::InvalidState {
                id,
                status,
                action: action_for(ConnectionEvent::Reinitiated),
            })?;

        self.ctx.store.clear_connection_tokens(id).await?;
        self.start_device_flow(connection).await
    }

    async fn start_device_flow(
        &self,
        connection: BankConnection,
    ) -> Result<DeviceFlowStarted, LifecycleError> {
        let auth = match self
            .ctx
            .provider
            .initiate_device_authorization(&connection.scopes, Some(&connection.account_number))
            .await
        {
            Ok(auth) => auth,
            Err(e) => {
                tracing::error!(connection_id = connection.id, error = %e, "Device authorization request failed");
                if !e.is_transient() {
                    self.apply_quietly(&connection, ConnectionEvent::Failed, Some(e.user_message()))
                        .await;
                }
                return Err(e.into());
            }
        };

        let update = DeviceAuthorizationUpdate {
            device_code: auth.device_code.clone(),
            user_code: auth.user_code.clone(),
            verification_uri: auth.verification_uri.clone(),
            poll_interval_secs: i32::try_from(auth.interval).unwrap_or(i32::MAX),
            consent_expires_at: Utc::now() + seconds(auth.expires_in as i64),
        };
        self.ctx
            .store
            .record_device_authorization(connection.id, &update)
            .await?;

        let from = connection.status();
        if from != ConnectionStatus::Pending {
            self.announce(&connection, from, ConnectionStatus::Pending, Some("Re-authorization started"));
        }

        Ok(DeviceFlowStarted {
            connection: self.load(connection.id).await?,
            user_code: auth.user_code,
            verification_uri: auth.verification_uri,
            expires_in: auth.expires_in,
            interval: auth.interval,
        })
    }

    /// Poll the token endpoint once for a pending connection.
    pub async fn poll(
        &self,
        id: DbId,
        user_input: Option<&str>,
    ) -> Result<PollOutcome, LifecycleError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let connection = self.load(id).await?;
        let status = connection.status();

        // Approval may already have arrived by webhook.
        if status == ConnectionStatus::Active {
            return Ok(PollOutcome::Active(connection));
        }

        let (Some(device_code), Some(user_code), ConnectionStatus::Pending) = (
            connection.device_code.as_deref(),
            connection.user_code.as_deref(),
            status,
        ) else {
            return Err(LifecycleError::InvalidState {
                id,
                status,
                action: "poll for a token",
            });
        };

        if consent_lapsed(connection.consent_expires_at, Utc::now()) {
            self.apply(&connection, ConnectionEvent::Lapsed, Some("Device authorization expired"))
                .await?;
            return Err(LifecycleError::AuthorizationExpired);
        }

        let interval_secs = connection
            .poll_interval_secs
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .max(1);
        let interval = Duration::from_secs(interval_secs as u64);

        match self
            .ctx
            .provider
            .poll_for_token(device_code, user_code, user_input)
            .await
        {
            Ok(token) => Ok(PollOutcome::Active(self.grant(&connection, token).await?)),
            Err(DevicePollError::AuthorizationPending) => Ok(PollOutcome::Pending {
                retry_after: interval,
            }),
            Err(DevicePollError::SlowDown) => {
                let doubled = interval_secs.saturating_mul(2);
                if let Some(consent_expires_at) = connection.consent_expires_at {
                    let update = DeviceAuthorizationUpdate {
                        device_code: device_code.to_string(),
                        user_code: user_code.to_string(),
                        verification_uri: connection.verification_uri.clone().unwrap_or_default(),
                        poll_interval_secs: doubled,
                        consent_expires_at,
                    };
                    self.ctx.store.record_device_authorization(id, &update).await?;
                }
                Ok(PollOutcome::SlowDown {
                    retry_after: Duration::from_secs(doubled as u64),
                })
            }
            Err(DevicePollError::ExpiredToken) => {
                self.apply(&connection, ConnectionEvent::Lapsed, Some("Device authorization expired"))
                    .await?;
                Err(LifecycleError::AuthorizationExpired)
            }
            Err(DevicePollError::AccessDenied) => {
                self.apply(&connection, ConnectionEvent::Revoked, Some("Authorization denied by user"))
                    .await?;
                Err(LifecycleError::AccessDenied)
            }
            Err(DevicePollError::Provider(e)) => {
                self.record_provider_failure(&connection, &e).await;
                Err(e.into())
            }
        }
    }

    /// Store freshly issued tokens and mark the connection active.
    async fn grant(
        &self,
        connection: &BankConnection,
        token: TokenResponse,
    ) -> Result<BankConnection, LifecycleError> {
        let from = connection.status();
        from.transition(ConnectionEvent::TokenGranted)
            .map_err(|_| LifecycleError::InvalidState {
                id: connection.id,
                status: from,
                action: action_for(ConnectionEvent::TokenGranted),
            })?;

        let now = Utc::now();
        let update = TokenUpdate {
            encrypted_access_token: self.ctx.tokens.encrypt(&token.access_token)?,
            encrypted_refresh_token: token
                .refresh_token
                .as_deref()
                .map(|t| self.ctx.tokens.encrypt(t))
                .transpose()?,
            token_expires_at: now + seconds(token.expires_in),
            consent_id: consent_token_from_access_token(&token.access_token, &self.ctx.consent),
            consent_expires_at: token.refresh_expires_in.map(|s| now + seconds(s)),
            scopes: token.scopes(),
        };
        let updated = self
            .ctx
            .store
            .activate_connection(connection.id, &update)
            .await?;

        if from != ConnectionStatus::Active {
            self.announce(connection, from, ConnectionStatus::Active, None);
        }
        Ok(updated)
    }

    // ---- tokens ----

    /// Refresh a connection's tokens under its lock.
    pub async fn refresh(&self, id: DbId) -> Result<BankConnection, LifecycleError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let connection = self.load(id).await?;
        self.refresh_locked(&connection).await
    }

    /// Refresh without taking the lock; the caller must already hold it.
    pub async fn refresh_locked(
        &self,
        connection: &BankConnection,
    ) -> Result<BankConnection, LifecycleError> {
        let status = connection.status();
        if !matches!(
            status,
            ConnectionStatus::Active | ConnectionStatus::Expired | ConnectionStatus::Error
        ) {
            return Err(LifecycleError::InvalidState {
                id: connection.id,
                status,
                action: "refresh",
            });
        }

        let Some(encrypted) = connection.encrypted_refresh_token.as_deref() else {
            self.apply(connection, ConnectionEvent::Lapsed, Some("No refresh token; reconnect required"))
                .await?;
            return Err(LifecycleError::MissingToken(connection.id));
        };
        let refresh_token = self.ctx.tokens.decrypt(encrypted)?;

        let context = format!("refresh:{}", connection.id);
        let provider = &self.ctx.provider;
        match self
            .ctx
            .retry
            .run(&context, || provider.refresh_token(&refresh_token))
            .await
        {
            Ok(token) => {
                let updated = self.grant(connection, token).await?;
                tracing::info!(connection_id = connection.id, "Access token refreshed");
                Ok(updated)
            }
            Err(e) => {
                tracing::warn!(connection_id = connection.id, error = %e, "Token refresh failed");
                self.record_provider_failure(connection, &e).await;
                Err(e.into())
            }
        }
    }

    /// Refresh when the token is inside the refresh margin. The caller must
    /// hold the connection lock.
    pub async fn ensure_fresh(
        &self,
        connection: &BankConnection,
    ) -> Result<BankConnection, LifecycleError> {
        if connection.needs_refresh(Utc::now()) {
            self.refresh_locked(connection).await
        } else {
            Ok(connection.clone())
        }
    }

    /// Provider credentials for resource calls.
    pub fn session(&self, connection: &BankConnection) -> Result<Session, LifecycleError> {
        let encrypted = connection
            .encrypted_access_token
            .as_deref()
            .ok_or(LifecycleError::MissingToken(connection.id))?;
        let access_token = self.ctx.tokens.decrypt(encrypted)?;
        Ok(Session::new(access_token, connection.consent_id.clone()))
    }

    // ---- revocation ----

    /// Revoke at the provider, drop the tokens and mark the connection
    /// revoked. Revoking a revoked connection is a no-op.
    pub async fn revoke(&self, id: DbId) -> Result<BankConnection, LifecycleError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let connection = self.load(id).await?;
        self.revoke_locked(&connection).await?;
        self.load(id).await
    }

    async fn revoke_locked(&self, connection: &BankConnection) -> Result<(), LifecycleError> {
        if connection.status() == ConnectionStatus::Revoked {
            return Ok(());
        }

        if let Some(encrypted) = connection.encrypted_access_token.as_deref() {
            match self.ctx.tokens.decrypt(encrypted) {
                Ok(token) => match self.ctx.provider.revoke_token(&token).await {
                    Ok(()) => {}
                    Err(ProviderError::Unauthorized { .. } | ProviderError::NotFound { .. }) => {
                        tracing::debug!(connection_id = connection.id, "Token already invalid at provider");
                    }
                    Err(e) => return Err(e.into()),
                },
                Err(e) => {
                    tracing::warn!(connection_id = connection.id, error = %e, "Stored token unreadable, revoking locally");
                }
            }
        }

        self.ctx.store.clear_connection_tokens(connection.id).await?;
        self.apply(connection, ConnectionEvent::Revoked, Some("Revoked by user"))
            .await?;
        Ok(())
    }

    /// Revoke an active connection, then delete it with its data.
    pub async fn remove(&self, id: DbId) -> Result<(), LifecycleError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let connection = self.load(id).await?;
        if connection.status() == ConnectionStatus::Active {
            if let Err(e) = self.revoke_locked(&connection).await {
                tracing::warn!(connection_id = id, error = %e, "Provider revoke failed, deleting anyway");
            }
        }
        self.ctx.store.delete_connection(id).await?;
        tracing::info!(connection_id = id, user_id = connection.user_id, "Bank connection removed");
        Ok(())
    }

    // ---- sweeps ----

    /// Expire one connection if its consent window has passed.
    pub async fn expire_lapsed_consent(
        &self,
        id: DbId,
        now: Timestamp,
    ) -> Result<bool, LifecycleError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let connection = self.load(id).await?;
        let eligible = matches!(
            connection.status(),
            ConnectionStatus::Pending | ConnectionStatus::Active
        );
        if !eligible || !consent_lapsed(connection.consent_expires_at, now) {
            return Ok(false);
        }
        self.apply(&connection, ConnectionEvent::Lapsed, Some("Consent expired"))
            .await?;
        Ok(true)
    }

    /// Expire every pending or active connection whose consent lapsed.
    pub async fn expire_lapsed_consents(&self, now: Timestamp) -> Result<usize, LifecycleError> {
        let candidates = self.ctx.store.list_lapsed_consents(now).await?;
        let mut expired = 0;
        for connection in candidates {
            match self.expire_lapsed_consent(connection.id, now).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(connection_id = connection.id, error = %e, "Failed to expire consent");
                }
            }
        }
        Ok(expired)
    }

    /// Refresh active connections whose tokens are close to expiry and that
    /// synced recently. Returns the ids refreshed.
    pub async fn refresh_due(&self, now: Timestamp) -> Result<Vec<DbId>, LifecycleError> {
        let candidates = self
            .ctx
            .store
            .list_connections_needing_refresh(
                now + chrono::Duration::minutes(REFRESH_MARGIN_MINUTES),
                now - chrono::Duration::days(REFRESH_ACTIVITY_WINDOW_DAYS),
            )
            .await?;

        let mut refreshed = Vec::with_capacity(candidates.len());
        for connection in candidates {
            match self.refresh(connection.id).await {
                Ok(_) => refreshed.push(connection.id),
                Err(e) => {
                    tracing::warn!(connection_id = connection.id, error = %e, "Scheduled refresh failed");
                }
            }
        }
        Ok(refreshed)
    }

    // ---- status changes ----

    /// Apply a lifecycle event and persist the resulting status.
    pub async fn apply(
        &self,
        connection: &BankConnection,
        event: ConnectionEvent,
        reason: Option<&str>,
    ) -> Result<ConnectionStatus, LifecycleError> {
        let from = connection.status();
        let to = from
            .transition(event)
            .map_err(|_| LifecycleError::InvalidState {
                id: connection.id,
                status: from,
                action: action_for(event),
            })?;

        self.ctx
            .store
            .set_connection_status(connection.id, to, reason)
            .await?;
        if to != from {
            self.announce(connection, from, to, reason);
        }
        Ok(to)
    }

    /// Map a provider failure onto the connection's status, logging rather
    /// than failing when the status cannot be written.
    pub async fn record_provider_failure(&self, connection: &BankConnection, err: &ProviderError) {
        match failure_event(err) {
            Some(event) => {
                self.apply_quietly(connection, event, Some(err.user_message()))
                    .await;
            }
            None => {
                tracing::debug!(connection_id = connection.id, error = %err, "Transient provider failure, status unchanged");
            }
        }
    }

    async fn apply_quietly(
        &self,
        connection: &BankConnection,
        event: ConnectionEvent,
        reason: Option<&str>,
    ) {
        if let Err(e) = self.apply(connection, event, reason).await {
            tracing::warn!(connection_id = connection.id, error = %e, "Could not record connection status");
        }
    }

    fn announce(
        &self,
        connection: &BankConnection,
        from: ConnectionStatus,
        to: ConnectionStatus,
        reason: Option<&str>,
    ) {
        tracing::info!(
            connection_id = connection.id,
            from = %from,
            to = %to,
            reason,
            "Connection status changed",
        );
        self.ctx.events.publish(DomainEvent::connection_status_changed(
            connection.user_id,
            connection.id,
            from,
            to,
            reason,
        ));
    }
}

fn seconds(secs: i64) -> chrono::Duration {
    chrono::Duration::seconds(secs.max(0))
}
