//! Bank connection models and DTOs.

use ledgerlink_core::connection_state;
use ledgerlink_core::status::{ConnectionStatus, StatusId};
use ledgerlink_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `bank_connections` table.
///
/// Token columns hold AES-GCM ciphertext and are never serialized.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BankConnection {
    pub id: DbId,
    pub user_id: DbId,
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    pub status_id: StatusId,
    #[serde(skip_serializing)]
    pub device_code: Option<String>,
    pub user_code: Option<String>,
    pub verification_uri: Option<String>,
    pub poll_interval_secs: Option<i32>,
    #[serde(skip_serializing)]
    pub encrypted_access_token: Option<String>,
    #[serde(skip_serializing)]
    pub encrypted_refresh_token: Option<String>,
    pub token_expires_at: Option<Timestamp>,
    #[serde(skip_serializing)]
    pub consent_id: Option<String>,
    pub consent_expires_at: Option<Timestamp>,
    pub scopes: Vec<String>,
    pub last_synced_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BankConnection {
    /// Decoded lifecycle status. Unknown ids read as `Error`.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_id(self.status_id).unwrap_or(ConnectionStatus::Error)
    }

    pub fn is_authorized(&self, now: Timestamp) -> bool {
        connection_state::is_authorized(self.status(), self.token_expires_at, now)
    }

    pub fn needs_refresh(&self, now: Timestamp) -> bool {
        connection_state::needs_refresh(self.token_expires_at, now)
    }
}

/// DTO for creating a pending connection.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBankConnection {
    pub user_id: DbId,
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Device-code artifacts recorded when authorization is initiated.
#[derive(Debug, Clone)]
pub struct DeviceAuthorizationUpdate {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub poll_interval_secs: i32,
    pub consent_expires_at: Timestamp,
}

/// Token artifacts written after a successful exchange or refresh.
///
/// `None` for the refresh token, consent id or scopes leaves the stored
/// value unchanged. `consent_expires_at` is always overwritten; `None`
/// means the grant carries no consent deadline.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: Option<String>,
    pub token_expires_at: Timestamp,
    pub consent_id: Option<String>,
    pub consent_expires_at: Option<Timestamp>,
    pub scopes: Option<Vec<String>>,
}
