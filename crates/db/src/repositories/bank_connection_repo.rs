//! Repository for the `bank_connections` table.

use ledgerlink_core::status::{ConnectionStatus, StatusId};
use ledgerlink_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::bank_connection::{
    BankConnection, CreateBankConnection, DeviceAuthorizationUpdate, TokenUpdate,
};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const COLUMNS: &str = "\
    id, user_id, bank_code, bank_name, account_number, status_id, \
    device_code, user_code, verification_uri, poll_interval_secs, \
    encrypted_access_token, encrypted_refresh_token, token_expires_at, \
    consent_id, consent_expires_at, scopes, last_synced_at, error_message, \
    created_at, updated_at";

/// Provides CRUD and lifecycle updates for bank connections.
pub struct BankConnectionRepo;

impl BankConnectionRepo {
    // -----------------------------------------------------------------------
    // Create / read
    // -----------------------------------------------------------------------

    /// Insert a pending connection. Fails with a unique violation when the
    /// (user, bank, account) triple already exists.
    pub async fn create(
        pool: &PgPool,
        input: &CreateBankConnection,
    ) -> Result<BankConnection, sqlx::Error> {
        let query = format!(
            "INSERT INTO bank_connections (user_id, bank_code, bank_name, account_number, scopes, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(input.user_id)
            .bind(&input.bank_code)
            .bind(&input.bank_name)
            .bind(&input.account_number)
            .bind(&input.scopes)
            .bind(ConnectionStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<BankConnection>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bank_connections WHERE id = $1");
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_device_code(
        pool: &PgPool,
        device_code: &str,
    ) -> Result<Option<BankConnection>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bank_connections WHERE device_code = $1");
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(device_code)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_consent_id(
        pool: &PgPool,
        consent_id: &str,
    ) -> Result<Option<BankConnection>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM bank_connections WHERE consent_id = $1 \
             ORDER BY updated_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(consent_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_user(pool: &PgPool, user_id: DbId) -> Result<Vec<BankConnection>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM bank_connections WHERE user_id = $1 ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_by_status(
        pool: &PgPool,
        status_id: StatusId,
    ) -> Result<Vec<BankConnection>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM bank_connections WHERE status_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(status_id)
            .fetch_all(pool)
            .await
    }

    /// Active connections with a token expiring before `expires_before`
    /// (or no recorded expiry) that synced since `synced_since`.
    pub async fn list_needing_refresh(
        pool: &PgPool,
        expires_before: Timestamp,
        synced_since: Timestamp,
    ) -> Result<Vec<BankConnection>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM bank_connections \
             WHERE status_id = $1 \
               AND encrypted_refresh_token IS NOT NULL \
               AND (token_expires_at IS NULL OR token_expires_at < $2) \
               AND last_synced_at >= $3 \
             ORDER BY token_expires_at ASC NULLS FIRST"
        );
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(ConnectionStatus::Active.id())
            .bind(expires_before)
            .bind(synced_since)
            .fetch_all(pool)
            .await
    }

    pub async fn list_lapsed_consents(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<BankConnection>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM bank_connections \
             WHERE status_id IN ($1, $2) AND consent_expires_at < $3"
        );
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(ConnectionStatus::Pending.id())
            .bind(ConnectionStatus::Active.id())
            .bind(now)
            .fetch_all(pool)
            .await
    }

    pub async fn earliest_created_at(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<Timestamp>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<Timestamp>>(
            "SELECT MIN(created_at) FROM bank_connections WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Lifecycle updates
    // -----------------------------------------------------------------------

    pub async fn record_device_authorization(
        pool: &PgPool,
        id: DbId,
        update: &DeviceAuthorizationUpdate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE bank_connections SET \
                 device_code = $2, user_code = $3, verification_uri = $4, \
                 poll_interval_secs = $5, consent_expires_at = $6, \
                 status_id = $7, error_message = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&update.device_code)
        .bind(&update.user_code)
        .bind(&update.verification_uri)
        .bind(update.poll_interval_secs)
        .bind(update.consent_expires_at)
        .bind(ConnectionStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn activate(
        pool: &PgPool,
        id: DbId,
        update: &TokenUpdate,
    ) -> Result<Option<BankConnection>, sqlx::Error> {
        let query = format!(
            "UPDATE bank_connections SET \
                 encrypted_access_token = $2, \
                 encrypted_refresh_token = COALESCE($3, encrypted_refresh_token), \
                 token_expires_at = $4, \
                 consent_id = COALESCE($5, consent_id), \
                 consent_expires_at = $6, \
                 scopes = COALESCE($7, scopes), \
                 status_id = $8, \
                 device_code = NULL, user_code = NULL, verification_uri = NULL, \
                 error_message = NULL, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BankConnection>(&query)
            .bind(id)
            .bind(&update.encrypted_access_token)
            .bind(&update.encrypted_refresh_token)
            .bind(update.token_expires_at)
            .bind(&update.consent_id)
            .bind(update.consent_expires_at)
            .bind(&update.scopes)
            .bind(ConnectionStatus::Active.id())
            .fetch_optional(pool)
            .await
    }

    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE bank_connections SET status_id = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status_id)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_tokens(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE bank_connections SET \
                 encrypted_access_token = NULL, encrypted_refresh_token = NULL, \
                 token_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_synced(pool: &PgPool, id: DbId, synced_at: Timestamp) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE bank_connections SET last_synced_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(synced_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Hard delete. Balances and transactions cascade.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM bank_connections WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_stale(pool: &PgPool, before: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM bank_connections WHERE status_id IN ($1, $2) AND updated_at < $3",
        )
        .bind(ConnectionStatus::Expired.id())
        .bind(ConnectionStatus::Revoked.id())
        .bind(before)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
