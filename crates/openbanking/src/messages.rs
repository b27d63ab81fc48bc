//! Typed request and response bodies for the provider API.
//!
//! OAuth endpoints return bare JSON objects; resource endpoints wrap their
//! payload in an [`Envelope`]. Amounts arrive as either JSON numbers or
//! decimal strings, so they go through [`amount`].

use serde::{Deserialize, Serialize};

use ledgerlink_core::normalize::RawTransaction;

use crate::error::ProviderError;

// ---------------------------------------------------------------------------
// Lenient scalar decoding
// ---------------------------------------------------------------------------

/// Deserializers for numbers the provider sometimes sends as strings.
pub(crate) mod amount {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    fn to_f64<E: serde::de::Error>(value: NumberOrString) -> Result<f64, E> {
        match value {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .replace(',', "")
                .parse()
                .map_err(|_| E::custom(format!("invalid amount: {s}"))),
        }
    }

    pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        to_f64(NumberOrString::deserialize(deserializer)?)
    }

    pub fn optional<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
            Some(value) => to_f64(value).map(Some),
            None => Ok(None),
        }
    }
}

/// Identifiers that may be numeric or textual.
mod identifier {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(i64),
        Str(String),
    }

    pub fn optional<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Id>::deserialize(deserializer)? {
            Some(Id::Int(n)) => Some(n.to_string()),
            Some(Id::Str(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
    }

    pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        optional(deserializer)?.ok_or_else(|| serde::de::Error::custom("empty identifier"))
    }
}

fn default_interval() -> u64 {
    5
}

fn default_page() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// OAuth
// ---------------------------------------------------------------------------

/// Response of `POST /oauth2/device/code`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until the device code lapses.
    pub expires_in: u64,
    /// Minimum seconds between token polls.
    #[serde(alias = "poll_interval", default = "default_interval")]
    pub interval: u64,
}

/// Response of `POST /oauth2/token` for both grants.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Refresh token lifetime in seconds; bounds the consent window.
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
}

impl TokenResponse {
    /// Granted scopes, split on whitespace or commas.
    pub fn scopes(&self) -> Option<Vec<String>> {
        self.scope.as_ref().map(|s| {
            s.split([' ', ','])
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DeviceCodeRequest<'a> {
    pub client_id: &'a str,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeviceTokenRequest<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub device_code: &'a str,
    pub user_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_input: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshTokenRequest<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RevokeRequest<'a> {
    pub client_id: &'a str,
    pub token: &'a str,
}

// ---------------------------------------------------------------------------
// Resource envelope
// ---------------------------------------------------------------------------

/// `{status, message, data}` wrapper used by resource endpoints.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// The payload, or a decode error when the provider sent none.
    pub fn into_data(self) -> Result<T, ProviderError> {
        self.data.ok_or_else(|| {
            ProviderError::Decode(format!(
                "response envelope has no data (status: {})",
                self.status.as_deref().unwrap_or("unknown")
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Account {
    #[serde(deserialize_with = "identifier::required")]
    pub account_number: String,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Response of `GET /accounts/{n}/balance`, in major units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountBalanceData {
    #[serde(default, deserialize_with = "amount::optional")]
    pub available_balance: Option<f64>,
    #[serde(default, deserialize_with = "amount::optional")]
    pub ledger_balance: Option<f64>,
    #[serde(default, deserialize_with = "amount::optional")]
    pub current_balance: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl AccountBalanceData {
    /// Ledger balance, falling back to the current balance.
    pub fn effective_ledger(&self) -> Option<f64> {
        self.ledger_balance.or(self.current_balance)
    }
}

/// One page of `GET /accounts/{n}/transactions`.
///
/// Records stay as raw JSON so one malformed record can be skipped without
/// rejecting the whole page.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
    #[serde(default = "default_page", alias = "current_page")]
    pub page: u32,
    #[serde(default = "default_page", alias = "pages")]
    pub total_pages: u32,
}

/// A single provider transaction record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderTransaction {
    #[serde(default, alias = "transaction_id", deserialize_with = "identifier::optional")]
    pub id: Option<String>,
    #[serde(deserialize_with = "amount::required")]
    pub amount: f64,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub debit_credit: Option<String>,
    #[serde(default, alias = "description")]
    pub narration: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub transaction_time: Option<String>,
    #[serde(default)]
    pub value_date: Option<String>,
    #[serde(default, deserialize_with = "amount::optional")]
    pub balance_after: Option<f64>,
}

impl ProviderTransaction {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_raw(&self) -> RawTransaction {
        RawTransaction {
            id: self.id.clone(),
            amount: self.amount,
            transaction_type: self.transaction_type.clone(),
            debit_credit: self.debit_credit.clone(),
            narration: self.narration.clone(),
            reference: self.reference.clone(),
            transaction_time: self.transaction_time.clone(),
            value_date: self.value_date.clone(),
            balance_after: self.balance_after,
        }
    }
}

// ---------------------------------------------------------------------------
// Bills
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BillCategory {
    #[serde(deserialize_with = "identifier::required")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Biller {
    #[serde(deserialize_with = "identifier::required")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "identifier::optional")]
    pub category_id: Option<String>,
    /// Fixed amount, when the biller does not accept arbitrary amounts.
    #[serde(default, deserialize_with = "amount::optional")]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateBillRequest {
    pub category_id: String,
    pub biller_id: String,
    pub bill_reference: String,
}

/// Customer details returned when a bill reference validates.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BillCustomer {
    pub bill_reference: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "amount::optional")]
    pub amount_due: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayBillRequest {
    pub category_id: String,
    pub biller_id: String,
    pub bill_reference: String,
    pub source_account: String,
    /// Major units.
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
}

/// Acknowledgement of a submitted payment or transfer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PaymentReceipt {
    pub reference: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TransferEnquiryRequest {
    pub bank_code: String,
    pub account_number: String,
}

/// Name enquiry result for a destination account.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TransferEnquiry {
    pub account_name: String,
    #[serde(deserialize_with = "identifier::required")]
    pub account_number: String,
    #[serde(default)]
    pub bank_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    pub source_account: String,
    pub destination_bank_code: String,
    pub destination_account: String,
    /// Major units.
    pub amount: f64,
    pub narration: String,
    pub reference: String,
}
