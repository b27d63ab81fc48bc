//! Bank connection authorization state machine.
//!
//! ```text
//! pending --TokenGranted--> active --Lapsed--> expired
//!    |                        |  \--Revoked--> revoked (terminal)
//!    |                        \----Failed----> error
//!    \--Lapsed/Revoked/Failed--> expired/revoked/error
//! active|expired|error --TokenGranted--> active
//! revoked|expired|error --Reinitiated--> pending
//! ```
//!
//! The functions here are pure: callers persist the returned status.

use chrono::Duration;

use crate::error::CoreError;
use crate::status::ConnectionStatus;
use crate::types::Timestamp;

/// Tokens expiring within this margin are refreshed proactively.
pub const REFRESH_MARGIN_MINUTES: i64 = 60;

/// Something that happened to a connection that may move its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A token exchange or refresh succeeded.
    TokenGranted,
    /// The token or consent lapsed (refresh rejected with 400/401, consent
    /// expiry passed, device code expired).
    Lapsed,
    /// Access was withdrawn by the user or the provider (403, explicit
    /// revoke, consent rejected).
    Revoked,
    /// An unexpected provider failure that is not a protocol outcome.
    Failed,
    /// The user started a fresh device authorization for this connection.
    Reinitiated,
}

impl ConnectionStatus {
    /// A revoked connection accepts no event except a fresh authorization.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked)
    }

    /// Apply `event` and return the resulting status.
    ///
    /// Illegal transitions return [`CoreError::Conflict`] so the caller can
    /// leave the stored status untouched.
    pub fn transition(self, event: ConnectionEvent) -> Result<ConnectionStatus, CoreError> {
        use ConnectionEvent as E;
        use ConnectionStatus as S;

        let next = match (self, event) {
            (S::Revoked, E::Revoked) => S::Revoked,
            (S::Revoked | S::Expired | S::Error, E::Reinitiated) => S::Pending,
            (S::Revoked, _) => return Err(illegal(self, event)),
            (_, E::TokenGranted) => S::Active,
            (_, E::Lapsed) => S::Expired,
            (_, E::Revoked) => S::Revoked,
            (_, E::Failed) => S::Error,
            (S::Pending | S::Active, E::Reinitiated) => return Err(illegal(self, event)),
        };
        Ok(next)
    }
}

fn illegal(from: ConnectionStatus, event: ConnectionEvent) -> CoreError {
    CoreError::Conflict(format!("connection in status '{from}' cannot apply {event:?}"))
}

/// Whether a token should be refreshed before the next data fetch.
///
/// A missing expiry is treated as stale.
pub fn needs_refresh(token_expires_at: Option<Timestamp>, now: Timestamp) -> bool {
    match token_expires_at {
        Some(expires_at) => expires_at < now + Duration::minutes(REFRESH_MARGIN_MINUTES),
        None => true,
    }
}

/// A connection is authorized only while active with an unexpired token.
pub fn is_authorized(
    status: ConnectionStatus,
    token_expires_at: Option<Timestamp>,
    now: Timestamp,
) -> bool {
    status == ConnectionStatus::Active && token_expires_at.is_some_and(|t| t > now)
}

/// Whether the consent window has elapsed.
pub fn consent_lapsed(consent_expires_at: Option<Timestamp>, now: Timestamp) -> bool {
    consent_expires_at.is_some_and(|t| t < now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ConnectionEvent as E;
    use ConnectionStatus as S;

    #[test]
    fn pending_becomes_active_on_token() {
        assert_eq!(S::Pending.transition(E::TokenGranted).unwrap(), S::Active);
    }

    #[test]
    fn refresh_recovers_expired_and_error() {
        assert_eq!(S::Expired.transition(E::TokenGranted).unwrap(), S::Active);
        assert_eq!(S::Error.transition(E::TokenGranted).unwrap(), S::Active);
        assert_eq!(S::Active.transition(E::TokenGranted).unwrap(), S::Active);
    }

    #[test]
    fn protocol_outcomes_from_active() {
        assert_eq!(S::Active.transition(E::Lapsed).unwrap(), S::Expired);
        assert_eq!(S::Active.transition(E::Revoked).unwrap(), S::Revoked);
        assert_eq!(S::Active.transition(E::Failed).unwrap(), S::Error);
    }

    #[test]
    fn revoked_is_terminal_until_reinitiated() {
        assert!(S::Revoked.transition(E::TokenGranted).is_err());
        assert!(S::Revoked.transition(E::Failed).is_err());
        assert!(S::Revoked.transition(E::Lapsed).is_err());
        assert_eq!(S::Revoked.transition(E::Revoked).unwrap(), S::Revoked);
        assert_eq!(S::Revoked.transition(E::Reinitiated).unwrap(), S::Pending);
    }

    #[test]
    fn live_connections_cannot_be_reinitiated() {
        assert!(S::Active.transition(E::Reinitiated).is_err());
        assert!(S::Pending.transition(E::Reinitiated).is_err());
    }

    #[test]
    fn refresh_margin_is_one_hour() {
        let now = Utc::now();
        assert!(needs_refresh(None, now));
        assert!(needs_refresh(Some(now + Duration::minutes(59)), now));
        assert!(!needs_refresh(Some(now + Duration::minutes(61)), now));
    }

    #[test]
    fn authorized_requires_active_and_future_expiry() {
        let now = Utc::now();
        let later = Some(now + Duration::minutes(5));
        assert!(is_authorized(S::Active, later, now));
        assert!(!is_authorized(S::Active, Some(now - Duration::seconds(1)), now));
        assert!(!is_authorized(S::Expired, later, now));
        assert!(!is_authorized(S::Active, None, now));
    }

    #[test]
    fn consent_lapse_ignores_missing_expiry() {
        let now = Utc::now();
        assert!(!consent_lapsed(None, now));
        assert!(consent_lapsed(Some(now - Duration::seconds(1)), now));
        assert!(!consent_lapsed(Some(now + Duration::days(1)), now));
    }
}
