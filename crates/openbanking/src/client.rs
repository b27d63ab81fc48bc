//! Signed HTTP client for the Open Banking provider.
//!
//! [`OpenBankingApi`] is the seam the engine depends on;
//! [`OpenBankingClient`] implements it over [`reqwest`]. Every request
//! carries a fresh idempotency key and signature, resource requests also
//! carry the bearer token and the encrypted consent token when the session
//! has one.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;

use ledgerlink_core::jwt::consent_token_from_access_token;
use ledgerlink_core::signing::{AuthScheme, ConsentCipher, Credentials, SignedRequestBuilder};

use crate::config::OpenBankingConfig;
use crate::error::{DevicePollError, ProviderError};
use crate::messages::{
    Account, AccountBalanceData, BillCategory, BillCustomer, Biller, DeviceAuthorization,
    DeviceCodeRequest, DeviceTokenRequest, Envelope, PayBillRequest, PaymentReceipt,
    RefreshTokenRequest, RevokeRequest, TokenResponse, TransactionPage, TransferEnquiry,
    TransferEnquiryRequest, TransferRequest, ValidateBillRequest,
};
use crate::pacer::RequestPacer;

pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Upper bound on pages fetched for one account window.
pub const MAX_TRANSACTION_PAGES: u32 = 500;

/// Credentials for resource calls on behalf of one connection.
#[derive(Clone)]
pub struct Session {
    pub access_token: String,
    /// Plaintext consent token; encrypted per request.
    pub consent_token: Option<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, consent_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            consent_token,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("consent_token", &self.consent_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Trait seam
// ---------------------------------------------------------------------------

/// Operations the provider exposes.
#[async_trait]
pub trait OpenBankingApi: Send + Sync {
    /// Start the device-code grant.
    async fn initiate_device_authorization(
        &self,
        scopes: &[String],
        account_number: Option<&str>,
    ) -> Result<DeviceAuthorization, ProviderError>;

    /// Exchange a device code for tokens once the user has approved.
    async fn poll_for_token(
        &self,
        device_code: &str,
        user_code: &str,
        user_input: Option<&str>,
    ) -> Result<TokenResponse, DevicePollError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError>;

    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError>;

    async fn get_accounts(&self, session: &Session) -> Result<Vec<Account>, ProviderError>;

    async fn get_account_balance(
        &self,
        session: &Session,
        account_number: &str,
    ) -> Result<AccountBalanceData, ProviderError>;

    /// One page (1-based) of an account's transactions between two dates.
    async fn get_account_transactions(
        &self,
        session: &Session,
        account_number: &str,
        from: NaiveDate,
        to: NaiveDate,
        page: u32,
    ) -> Result<TransactionPage, ProviderError>;

    async fn get_bill_categories(&self, session: &Session)
        -> Result<Vec<BillCategory>, ProviderError>;

    async fn get_billers(
        &self,
        session: &Session,
        category_id: &str,
    ) -> Result<Vec<Biller>, ProviderError>;

    async fn validate_bill(
        &self,
        session: &Session,
        request: &ValidateBillRequest,
    ) -> Result<BillCustomer, ProviderError>;

    async fn pay_bill(
        &self,
        session: &Session,
        request: &PayBillRequest,
    ) -> Result<PaymentReceipt, ProviderError>;

    async fn transfer_enquiry(
        &self,
        session: &Session,
        request: &TransferEnquiryRequest,
    ) -> Result<TransferEnquiry, ProviderError>;

    async fn transfer(
        &self,
        session: &Session,
        request: &TransferRequest,
    ) -> Result<PaymentReceipt, ProviderError>;

    /// Every page of an account's transactions, in provider order.
    async fn get_all_account_transactions(
        &self,
        session: &Session,
        account_number: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        collect_pages(|page| self.get_account_transactions(session, account_number, from, to, page))
            .await
    }
}

/// Fetch pages from 1 until the provider's page count is reached or a page
/// comes back empty.
pub async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<serde_json::Value>, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<TransactionPage, ProviderError>>,
{
    let mut records = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch(page).await?;
        let exhausted = batch.transactions.is_empty() || page >= batch.total_pages;
        records.extend(batch.transactions);
        if exhausted {
            break;
        }
        if page >= MAX_TRANSACTION_PAGES {
            tracing::warn!(page, total_pages = batch.total_pages, "Transaction page limit reached");
            break;
        }
        page += 1;
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// HTTP client for the provider API.
pub struct OpenBankingClient {
    http: reqwest::Client,
    base_url: String,
    signer: SignedRequestBuilder,
    pacer: RequestPacer,
}

impl OpenBankingClient {
    pub fn new(config: OpenBankingConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self::with_client(http, config))
    }

    /// Reuse an existing [`reqwest::Client`]. Its timeout settings apply.
    pub fn with_client(http: reqwest::Client, config: OpenBankingConfig) -> Self {
        Self {
            http,
            base_url: config.base_url,
            signer: SignedRequestBuilder::new(config.credentials),
            pacer: RequestPacer::new(config.min_request_interval),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        self.signer.credentials()
    }

    pub fn consent_cipher(&self) -> &ConsentCipher {
        self.signer.consent_cipher()
    }

    /// Build a session, recovering the consent token from the access token.
    pub fn session_for(&self, access_token: &str) -> Session {
        let consent = consent_token_from_access_token(access_token, self.consent_cipher());
        Session::new(access_token, consent)
    }

    // ---- private helpers ----

    fn request(
        &self,
        method: Method,
        path: &str,
        auth: AuthScheme<'_>,
        consent_token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let signed = self.signer.sign(auth, consent_token);
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(ACCEPT, "application/json");
        for (name, value) in signed.pairs() {
            builder = builder.header(name, value);
        }
        builder
    }

    fn oauth(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(Method::POST, path, AuthScheme::Basic, None)
    }

    fn resource(&self, method: Method, path: &str, session: &Session) -> reqwest::RequestBuilder {
        self.request(
            method,
            path,
            AuthScheme::Bearer(&session.access_token),
            session.consent_token.as_deref(),
        )
    }

    /// Pace, send, and turn non-2xx responses into [`ProviderError`].
    async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProviderError> {
        self.pacer.wait().await;
        let response = builder.send().await?;
        tracing::debug!(
            url = %response.url().path(),
            status = response.status().as_u16(),
            "Provider response",
        );
        Self::ensure_success(response).await
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_response(status.as_u16(), &body, retry_after))
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn parse_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        Self::parse::<Envelope<T>>(response).await?.into_data()
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        session: &Session,
    ) -> Result<T, ProviderError> {
        let response = self.execute(self.resource(Method::GET, path, session)).await?;
        Self::parse_envelope(response).await
    }

    async fn post_data<B: serde::Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        session: &Session,
        body: &B,
    ) -> Result<T, ProviderError> {
        let response = self
            .execute(self.resource(Method::POST, path, session).json(body))
            .await?;
        Self::parse_envelope(response).await
    }
}

/// `Retry-After` in delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl OpenBankingApi for OpenBankingClient {
    async fn initiate_device_authorization(
        &self,
        scopes: &[String],
        account_number: Option<&str>,
    ) -> Result<DeviceAuthorization, ProviderError> {
        let body = DeviceCodeRequest {
            client_id: &self.credentials().client_id,
            scope: scopes.join(" "),
            account_number,
        };
        let response = self.execute(self.oauth("/oauth2/device/code").json(&body)).await?;
        Self::parse(response).await
    }

    async fn poll_for_token(
        &self,
        device_code: &str,
        user_code: &str,
        user_input: Option<&str>,
    ) -> Result<TokenResponse, DevicePollError> {
        let body = DeviceTokenRequest {
            grant_type: DEVICE_CODE_GRANT,
            client_id: &self.credentials().client_id,
            device_code,
            user_code,
            user_input,
        };
        let response = self
            .execute(self.oauth("/oauth2/token").json(&body))
            .await
            .map_err(DevicePollError::classify)?;
        Ok(Self::parse(response).await?)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        let body = RefreshTokenRequest {
            grant_type: REFRESH_TOKEN_GRANT,
            client_id: &self.credentials().client_id,
            refresh_token,
        };
        let response = self.execute(self.oauth("/oauth2/token").json(&body)).await?;
        Self::parse(response).await
    }

    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError> {
        let body = RevokeRequest {
            client_id: &self.credentials().client_id,
            token,
        };
        self.execute(self.oauth("/oauth2/revoke").json(&body)).await?;
        Ok(())
    }

    async fn get_accounts(&self, session: &Session) -> Result<Vec<Account>, ProviderError> {
        self.get_data("/accounts", session).await
    }

    async fn get_account_balance(
        &self,
        session: &Session,
        account_number: &str,
    ) -> Result<AccountBalanceData, ProviderError> {
        self.get_data(&format!("/accounts/{account_number}/balance"), session)
            .await
    }

    async fn get_account_transactions(
        &self,
        session: &Session,
        account_number: &str,
        from: NaiveDate,
        to: NaiveDate,
        page: u32,
    ) -> Result<TransactionPage, ProviderError> {
        let query = [
            ("from_date", date_param(from)),
            ("to_date", date_param(to)),
            ("page", page.to_string()),
        ];
        let builder = self
            .resource(
                Method::GET,
                &format!("/accounts/{account_number}/transactions"),
                session,
            )
            .query(&query);
        let response = self.execute(builder).await?;
        Self::parse_envelope(response).await
    }

    async fn get_bill_categories(
        &self,
        session: &Session,
    ) -> Result<Vec<BillCategory>, ProviderError> {
        self.get_data("/bills/categories", session).await
    }

    async fn get_billers(
        &self,
        session: &Session,
        category_id: &str,
    ) -> Result<Vec<Biller>, ProviderError> {
        self.get_data(&format!("/bills/categories/{category_id}/billers"), session)
            .await
    }

    async fn validate_bill(
        &self,
        session: &Session,
        request: &ValidateBillRequest,
    ) -> Result<BillCustomer, ProviderError> {
        self.post_data("/bills/validate", session, request).await
    }

    async fn pay_bill(
        &self,
        session: &Session,
        request: &PayBillRequest,
    ) -> Result<PaymentReceipt, ProviderError> {
        self.post_data("/bills/pay", session, request).await
    }

    async fn transfer_enquiry(
        &self,
        session: &Session,
        request: &TransferEnquiryRequest,
    ) -> Result<TransferEnquiry, ProviderError> {
        self.post_data("/transactions/transfer/enquiry", session, request)
            .await
    }

    async fn transfer(
        &self,
        session: &Session,
        request: &TransferRequest,
    ) -> Result<PaymentReceipt, ProviderError> {
        self.post_data("/transactions/transfer", session, request).await
    }
}
