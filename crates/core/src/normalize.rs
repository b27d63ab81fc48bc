//! Normalisation of provider transaction records into ledger rows.
//!
//! Amounts are stored signed in minor units: credits positive, debits
//! negative. The direction comes from the provider's `transaction_type`,
//! falling back to `debit_credit` and finally the sign of the amount.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{to_minor_units, MinorUnits};

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// Map provider type hints to a direction.
    ///
    /// `WITHDRAWAL`/`DEBIT` are debits, `DEPOSIT`/`CREDIT` are credits and
    /// `TRANSFER` (or anything else) defers to `debit_credit`.
    pub fn from_provider(transaction_type: Option<&str>, debit_credit: Option<&str>) -> Option<Self> {
        let by_type = transaction_type.and_then(|t| match t.trim().to_ascii_uppercase().as_str() {
            "WITHDRAWAL" | "DEBIT" => Some(Self::Debit),
            "DEPOSIT" | "CREDIT" => Some(Self::Credit),
            _ => None,
        });
        by_type.or_else(|| {
            debit_credit.and_then(|dc| match dc.trim().to_ascii_uppercase().as_str() {
                "DEBIT" | "DR" => Some(Self::Debit),
                "CREDIT" | "CR" => Some(Self::Credit),
                _ => None,
            })
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Salary,
    Transfer,
    Groceries,
    Transportation,
    Utilities,
    Housing,
    Healthcare,
    Education,
    Others,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Salary => "salary",
            Self::Transfer => "transfer",
            Self::Groceries => "groceries",
            Self::Transportation => "transportation",
            Self::Utilities => "utilities",
            Self::Housing => "housing",
            Self::Healthcare => "healthcare",
            Self::Education => "education",
            Self::Others => "others",
        }
    }
}

static CATEGORY_RULES: LazyLock<Vec<(Regex, Category)>> = LazyLock::new(|| {
    [
        (r"salary|wage|payroll", Category::Salary),
        (r"transfer|deposit|trf|tfr", Category::Transfer),
        (r"grocery|supermarket|food", Category::Groceries),
        (r"fuel|petrol|uber|bolt|transport", Category::Transportation),
        (r"utility|electricity|water|phone|internet|airtime", Category::Utilities),
        (r"rent|mortgage", Category::Housing),
        (r"medical|hospital|pharmacy", Category::Healthcare),
        (r"school|education|tuition", Category::Education),
    ]
    .into_iter()
    .filter_map(|(pattern, category)| {
        Regex::new(&format!("(?i){pattern}"))
            .ok()
            .map(|re| (re, category))
    })
    .collect()
});

/// Assign a spending category from description keywords. First match wins.
pub fn categorize(description: &str) -> Category {
    CATEGORY_RULES
        .iter()
        .find(|(re, _)| re.is_match(description))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Others)
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Parse a provider date: RFC 3339, `YYYY-MM-DDTHH:MM:SS`,
/// `YYYY-MM-DD HH:MM:SS` or a bare `YYYY-MM-DD`.
pub fn parse_transaction_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A provider transaction record as received, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTransaction {
    pub id: Option<String>,
    pub amount: f64,
    pub transaction_type: Option<String>,
    pub debit_credit: Option<String>,
    pub narration: Option<String>,
    pub reference: Option<String>,
    pub transaction_time: Option<String>,
    pub value_date: Option<String>,
    pub balance_after: Option<f64>,
}

/// A validated ledger row ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTransaction {
    pub external_transaction_id: String,
    pub amount: MinorUnits,
    pub direction: Direction,
    pub category: Category,
    pub description: String,
    pub reference: Option<String>,
    pub transaction_date: NaiveDate,
    pub balance_after: Option<MinorUnits>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("transaction has no id")]
    MissingId,
    #[error("transaction {0} has no date")]
    MissingDate(String),
    #[error("transaction {id} has an unparseable date: {value}")]
    InvalidDate { id: String, value: String },
    #[error("transaction {0} has a non-finite amount")]
    InvalidAmount(String),
}

const DEFAULT_DESCRIPTION: &str = "Unknown transaction";

/// Validate and normalise one provider record.
pub fn normalize_transaction(raw: &RawTransaction) -> Result<NormalizedTransaction, NormalizeError> {
    let id = raw
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(NormalizeError::MissingId)?
        .to_string();

    let date_value = raw
        .transaction_time
        .as_deref()
        .or(raw.value_date.as_deref())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| NormalizeError::MissingDate(id.clone()))?;
    let transaction_date =
        parse_transaction_date(date_value).ok_or_else(|| NormalizeError::InvalidDate {
            id: id.clone(),
            value: date_value.to_string(),
        })?;

    let magnitude = to_minor_units(raw.amount.abs()).ok_or_else(|| NormalizeError::InvalidAmount(id.clone()))?;
    let direction = Direction::from_provider(raw.transaction_type.as_deref(), raw.debit_credit.as_deref())
        .unwrap_or(if raw.amount < 0.0 { Direction::Debit } else { Direction::Credit });
    let amount = match direction {
        Direction::Credit => magnitude,
        Direction::Debit => -magnitude,
    };

    let description = raw
        .narration
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_DESCRIPTION)
        .to_string();

    Ok(NormalizedTransaction {
        external_transaction_id: id,
        amount,
        direction,
        category: categorize(&description),
        description,
        reference: raw.reference.clone().filter(|r| !r.is_empty()),
        transaction_date,
        balance_after: raw.balance_after.and_then(to_minor_units),
    })
}
