//! Credit scoring: feature extraction from a transaction ledger and the
//! deterministic score, grade and risk classification built on it.
//!
//! Everything here is pure. The engine crate loads the ledger, calls
//! [`assess`], and persists the result.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{to_major_units, MinorUnits, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const MODEL_VERSION: &str = "1.0";

pub const MIN_SCORE: i32 = 300;
pub const MAX_SCORE: i32 = 850;

/// Fewer transactions than this yields [`InsufficientData`].
pub const MIN_TRANSACTIONS: usize = 10;

/// Default ledger window in months.
pub const DEFAULT_WINDOW_MONTHS: u32 = 6;

/// Monthly income (major units) at which the income contribution is 100.
const INCOME_REFERENCE: f64 = 50_000.0;
const INCOME_MAX_POINTS: f64 = 150.0;
const SAVINGS_MAX_POINTS: f64 = 100.0;
const DEBT_MAX_POINTS: f64 = 80.0;
const DEBT_ZERO_AT_RATIO: f64 = 0.4;
const ACCOUNT_AGE_MAX_POINTS: f64 = 60.0;
const ACCOUNT_AGE_CAP_MONTHS: f64 = 24.0;
const FREQUENCY_MAX_POINTS: f64 = 40.0;
const FREQUENCY_CAP: f64 = 100.0;
const STABILITY_POINTS: f64 = 60.0;
const VOLATILITY_POINTS: f64 = 20.0;
const BOUNCED_PENALTY: f64 = 10.0;

const AVERAGE_DAYS_PER_MONTH: f64 = 30.44;

static DEBT_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)loan|repayment|credit card|mortgage|instal{1,2}ment|debt|overdraft")
        .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One ledger row as seen by the scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringTransaction {
    /// Signed minor units: credits positive, debits negative.
    pub amount: MinorUnits,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub balance_after: Option<MinorUnits>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Employed,
    SelfEmployed,
    Unemployed,
    Student,
    Retired,
    #[default]
    Unknown,
}

impl EmploymentStatus {
    /// Lenient parse of a declared employment status. Unrecognised values
    /// map to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "employed" | "full_time" | "part_time" => Self::Employed,
            "self_employed" => Self::SelfEmployed,
            "unemployed" => Self::Unemployed,
            "student" => Self::Student,
            "retired" => Self::Retired,
            _ => Self::Unknown,
        }
    }

    fn adjustment(self) -> f64 {
        match self {
            Self::Employed => 20.0,
            Self::SelfEmployed => 10.0,
            Self::Unemployed => -50.0,
            Self::Student => -10.0,
            Self::Retired | Self::Unknown => 0.0,
        }
    }
}

/// Declared applicant data supplied by the identity collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub employment: EmploymentStatus,
    pub age: Option<u32>,
}

impl Demographics {
    fn age_adjustment(&self) -> f64 {
        match self.age {
            Some(age) if age < 25 => -20.0,
            Some(age) if age > 50 => 10.0,
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Behavioural features derived from the ledger. Monetary figures are in
/// major units.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Features {
    pub avg_monthly_income: f64,
    pub avg_monthly_expenses: f64,
    pub savings_rate: f64,
    pub debt_to_income: f64,
    pub income_stability: f64,
    pub spending_volatility: f64,
    pub bounced_transactions: u32,
    pub account_age_months: f64,
    pub transaction_count: u32,
}

#[derive(Default)]
struct MonthTotals {
    income: f64,
    expenses: f64,
    debt: f64,
}

/// Months elapsed between `earliest` and `now`, never negative.
pub fn account_age_months(earliest: Timestamp, now: Timestamp) -> f64 {
    let days = (now - earliest).num_seconds() as f64 / 86_400.0;
    (days / AVERAGE_DAYS_PER_MONTH).max(0.0)
}

/// Derive [`Features`] from the ledger window.
///
/// Monthly figures are averaged over the calendar months that contain at
/// least one transaction.
pub fn extract_features(transactions: &[ScoringTransaction], account_age_months: f64) -> Features {
    let mut months: BTreeMap<(i32, u32), MonthTotals> = BTreeMap::new();
    let mut bounced = 0u32;

    for txn in transactions {
        let bucket = months
            .entry((txn.transaction_date.year(), txn.transaction_date.month()))
            .or_default();
        let amount = to_major_units(txn.amount);
        if amount > 0.0 {
            bucket.income += amount;
        } else {
            bucket.expenses += -amount;
            if DEBT_KEYWORDS.is_match(&txn.description) {
                bucket.debt += -amount;
            }
        }
        if txn.balance_after.is_some_and(|b| b < 0) {
            bounced += 1;
        }
    }

    let incomes: Vec<f64> = months.values().map(|m| m.income).collect();
    let expenses: Vec<f64> = months.values().map(|m| m.expenses).collect();
    let debts: Vec<f64> = months.values().map(|m| m.debt).collect();

    let avg_income = mean(&incomes);
    let avg_expenses = mean(&expenses);
    let avg_debt = mean(&debts);

    let savings_rate = if avg_income > 0.0 {
        ((avg_income - avg_expenses) / avg_income).max(0.0)
    } else {
        0.0
    };

    let debt_to_income = if avg_income > 0.0 {
        avg_debt / avg_income
    } else if avg_debt > 0.0 {
        1.0
    } else {
        0.0
    };

    let income_stability = coefficient_of_variation(&incomes)
        .map(|cv| (1.0 - cv).max(0.0))
        .unwrap_or(0.0);
    let spending_volatility = coefficient_of_variation(&expenses).unwrap_or(0.0);

    Features {
        avg_monthly_income: avg_income,
        avg_monthly_expenses: avg_expenses,
        savings_rate,
        debt_to_income,
        income_stability,
        spending_volatility,
        bounced_transactions: bounced,
        account_age_months: account_age_months.max(0.0),
        transaction_count: u32::try_from(transactions.len()).unwrap_or(u32::MAX),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation over mean; `None` when the mean is not
/// positive.
fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values);
    if m <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / m)
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// Per-factor point contributions. `total()` before clamping equals the
/// sum of the fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub income: f64,
    pub savings: f64,
    pub debt_to_income: f64,
    pub account_age: f64,
    pub transaction_frequency: f64,
    pub income_stability: f64,
    pub spending_volatility: f64,
    pub bounced_transactions: f64,
    pub employment: f64,
    pub age: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.base
            + self.income
            + self.savings
            + self.debt_to_income
            + self.account_age
            + self.transaction_frequency
            + self.income_stability
            + self.spending_volatility
            + self.bounced_transactions
            + self.employment
            + self.age
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Compute each factor's contribution.
pub fn score_breakdown(features: &Features, demographics: &Demographics) -> ScoreBreakdown {
    let income = if features.avg_monthly_income > 0.0 {
        ((features.avg_monthly_income / INCOME_REFERENCE).log10() * 50.0 + 100.0)
            .clamp(0.0, INCOME_MAX_POINTS)
    } else {
        0.0
    };

    ScoreBreakdown {
        base: MIN_SCORE as f64,
        income: finite_or_zero(income),
        savings: finite_or_zero(SAVINGS_MAX_POINTS * features.savings_rate.clamp(0.0, 1.0)),
        debt_to_income: finite_or_zero(
            DEBT_MAX_POINTS * (1.0 - features.debt_to_income / DEBT_ZERO_AT_RATIO).max(0.0),
        ),
        account_age: finite_or_zero(
            ACCOUNT_AGE_MAX_POINTS
                * (features.account_age_months / ACCOUNT_AGE_CAP_MONTHS).clamp(0.0, 1.0),
        ),
        transaction_frequency: FREQUENCY_MAX_POINTS
            * (features.transaction_count as f64 / FREQUENCY_CAP).min(1.0),
        income_stability: finite_or_zero(
            STABILITY_POINTS * (features.income_stability.clamp(0.0, 1.0) - 0.5),
        ),
        spending_volatility: finite_or_zero(
            (VOLATILITY_POINTS * (1.0 - features.spending_volatility))
                .clamp(-VOLATILITY_POINTS, VOLATILITY_POINTS),
        ),
        bounced_transactions: -BOUNCED_PENALTY * features.bounced_transactions as f64,
        employment: demographics.employment.adjustment(),
        age: demographics.age_adjustment(),
    }
}

/// Clamp a raw total into `[300, 850]` and round.
pub fn clamp_score(total: f64) -> i32 {
    let total = finite_or_zero(total);
    (total.round() as i64).clamp(MIN_SCORE as i64, MAX_SCORE as i64) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "F")]
    F,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Grade {
    pub fn from_score(score: i32) -> Self {
        match score {
            800.. => Self::APlus,
            750..=799 => Self::A,
            700..=749 => Self::BPlus,
            650..=699 => Self::B,
            600..=649 => Self::CPlus,
            550..=599 => Self::C,
            500..=549 => Self::D,
            400..=499 => Self::E,
            _ => Self::F,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
        }
    }
}

/// Risk classification. Ordered from safest to riskiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn from_score(score: i32) -> Self {
        match score {
            750.. => Self::Low,
            650..=749 => Self::Medium,
            550..=649 => Self::High,
            _ => Self::VeryHigh,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

/// Logistic estimate of default probability, 0.5 at the band midpoint.
pub fn default_probability(score: i32) -> f64 {
    let normalized = (score - MIN_SCORE) as f64 / (MAX_SCORE - MIN_SCORE) as f64;
    1.0 / (1.0 + (5.0 * (normalized - 0.5)).exp())
}

// ---------------------------------------------------------------------------
// Explanations
// ---------------------------------------------------------------------------

pub fn risk_factors(features: &Features) -> Vec<String> {
    let rules: [(bool, &str); 7] = [
        (features.debt_to_income > 0.4, "High debt-to-income ratio"),
        (features.savings_rate < 0.1, "Low savings rate"),
        (features.income_stability < 0.7, "Irregular income"),
        (features.spending_volatility > 0.3, "Unstable spending patterns"),
        (features.bounced_transactions > 3, "Frequent bounced transactions"),
        (features.transaction_count < 20, "Low banking activity"),
        (features.account_age_months < 6.0, "New banking relationship"),
    ];
    rules
        .into_iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, text)| text.to_string())
        .collect()
}

pub fn improvement_suggestions(features: &Features) -> Vec<String> {
    let rules: [(bool, &str); 5] = [
        (
            features.savings_rate < 0.15,
            "Increase your savings rate to improve financial stability",
        ),
        (
            features.debt_to_income > 0.3,
            "Reduce your debt-to-income ratio by paying down existing debts",
        ),
        (
            features.transaction_count < 30,
            "Maintain consistent banking activity to build credit history",
        ),
        (
            features.bounced_transactions > 1,
            "Avoid bounced transactions by maintaining adequate account balances",
        ),
        (
            features.income_stability < 0.75,
            "Stabilize your income sources for better creditworthiness",
        ),
    ];
    rules
        .into_iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, text)| text.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient transaction data: found {found}, need at least {required}")]
pub struct InsufficientData {
    pub found: usize,
    pub required: usize,
}

/// The full result of one scoring run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditAssessment {
    pub score: i32,
    pub grade: Grade,
    pub risk_level: RiskLevel,
    pub default_probability: f64,
    pub breakdown: ScoreBreakdown,
    pub features: Features,
    pub risk_factors: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub model_version: &'static str,
}

pub fn assess_features(features: Features, demographics: &Demographics) -> CreditAssessment {
    let breakdown = score_breakdown(&features, demographics);
    let score = clamp_score(breakdown.total());
    CreditAssessment {
        score,
        grade: Grade::from_score(score),
        risk_level: RiskLevel::from_score(score),
        default_probability: default_probability(score),
        risk_factors: risk_factors(&features),
        improvement_suggestions: improvement_suggestions(&features),
        breakdown,
        features,
        model_version: MODEL_VERSION,
    }
}

/// Score a ledger window. Fails with [`InsufficientData`] below
/// [`MIN_TRANSACTIONS`] rows.
pub fn assess(
    transactions: &[ScoringTransaction],
    account_age_months: f64,
    demographics: &Demographics,
) -> Result<CreditAssessment, InsufficientData> {
    if transactions.len() < MIN_TRANSACTIONS {
        return Err(InsufficientData {
            found: transactions.len(),
            required: MIN_TRANSACTIONS,
        });
    }
    let features = extract_features(transactions, account_age_months);
    Ok(assess_features(features, demographics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_features() -> Features {
        Features {
            avg_monthly_income: 200_000.0,
            avg_monthly_expenses: 120_000.0,
            savings_rate: 0.4,
            debt_to_income: 0.1,
            income_stability: 1.0,
            spending_volatility: 0.0,
            bounced_transactions: 0,
            account_age_months: 12.0,
            transaction_count: 80,
        }
    }

    fn employed_thirty() -> Demographics {
        Demographics {
            employment: EmploymentStatus::Employed,
            age: Some(30),
        }
    }

    fn txn(amount_major: i64, description: &str, y: i32, m: u32, d: u32) -> ScoringTransaction {
        ScoringTransaction {
            amount: amount_major * 100,
            description: description.into(),
            transaction_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            balance_after: Some(100_000),
        }
    }

    // -- Scoring -----------------------------------------------------------

    #[test]
    fn example_profile_lands_in_good_band() {
        let a = assess_features(example_features(), &employed_thirty());
        assert_eq!(a.score, 662);
        assert!(a.score >= 650);
        assert_eq!(a.grade, Grade::B);
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert_eq!(a.model_version, "1.0");
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = assess_features(example_features(), &employed_thirty());
        let b = assess_features(example_features(), &employed_thirty());
        assert_eq!(a, b);
    }

    #[test]
    fn breakdown_components_match_formulas() {
        let b = score_breakdown(&example_features(), &employed_thirty());
        assert!((b.income - (4f64.log10() * 50.0 + 100.0)).abs() < 1e-9);
        assert!((b.savings - 40.0).abs() < 1e-9);
        assert!((b.debt_to_income - 60.0).abs() < 1e-9);
        assert!((b.account_age - 30.0).abs() < 1e-9);
        assert!((b.transaction_frequency - 32.0).abs() < 1e-9);
        assert!((b.income_stability - 30.0).abs() < 1e-9);
        assert!((b.spending_volatility - 20.0).abs() < 1e-9);
        assert_eq!(b.employment, 20.0);
        assert_eq!(b.age, 0.0);
    }

    #[test]
    fn income_contribution_is_capped() {
        let mut f = example_features();
        f.avg_monthly_income = 1e12;
        assert_eq!(score_breakdown(&f, &Demographics::default()).income, 150.0);
        f.avg_monthly_income = 1.0;
        assert_eq!(score_breakdown(&f, &Demographics::default()).income, 0.0);
    }

    #[test]
    fn score_is_bounded_for_extreme_features() {
        let worst = Features {
            bounced_transactions: 500,
            spending_volatility: 50.0,
            debt_to_income: 10.0,
            ..Default::default()
        };
        let unemployed_young = Demographics {
            employment: EmploymentStatus::Unemployed,
            age: Some(20),
        };
        assert_eq!(assess_features(worst, &unemployed_young).score, MIN_SCORE);

        let best = Features {
            avg_monthly_income: 1e9,
            savings_rate: 1.0,
            income_stability: 1.0,
            account_age_months: 120.0,
            transaction_count: 10_000,
            ..Default::default()
        };
        let older = Demographics {
            employment: EmploymentStatus::Employed,
            age: Some(60),
        };
        assert!(assess_features(best, &older).score <= MAX_SCORE);

        let nan = Features {
            avg_monthly_income: f64::NAN,
            savings_rate: f64::NAN,
            ..Default::default()
        };
        let s = assess_features(nan, &Demographics::default()).score;
        assert!((MIN_SCORE..=MAX_SCORE).contains(&s));
    }

    #[test]
    fn grade_and_risk_bands_are_monotonic() {
        let mut prev_grade = Grade::from_score(MIN_SCORE);
        let mut prev_risk = RiskLevel::from_score(MIN_SCORE);
        for score in MIN_SCORE..=MAX_SCORE {
            let grade = Grade::from_score(score);
            let risk = RiskLevel::from_score(score);
            assert!(grade >= prev_grade, "grade regressed at {score}");
            assert!(risk <= prev_risk, "risk worsened at {score}");
            prev_grade = grade;
            prev_risk = risk;
        }
    }

    #[test]
    fn band_edges() {
        assert_eq!(Grade::from_score(850).as_str(), "A+");
        assert_eq!(Grade::from_score(800).as_str(), "A+");
        assert_eq!(Grade::from_score(799).as_str(), "A");
        assert_eq!(Grade::from_score(650).as_str(), "B");
        assert_eq!(Grade::from_score(400).as_str(), "E");
        assert_eq!(Grade::from_score(399).as_str(), "F");
        assert_eq!(RiskLevel::from_score(750), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(749), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(550), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(549).as_str(), "very_high");
    }

    #[test]
    fn default_probability_decreases_with_score() {
        assert!((default_probability(575) - 0.5).abs() < 1e-9);
        assert!(default_probability(300) > default_probability(700));
        assert!(default_probability(850) < 0.1);
    }

    // -- Features ----------------------------------------------------------

    #[test]
    fn features_average_over_active_months() {
        let txns = vec![
            txn(100_000, "SALARY JAN", 2024, 1, 25),
            txn(-40_000, "Rent", 2024, 1, 27),
            txn(-10_000, "Loan repayment", 2024, 1, 28),
            txn(100_000, "SALARY FEB", 2024, 2, 25),
            txn(-50_000, "Groceries", 2024, 2, 26),
        ];
        let f = extract_features(&txns, 12.0);
        assert_eq!(f.avg_monthly_income, 100_000.0);
        assert_eq!(f.avg_monthly_expenses, 50_000.0);
        assert!((f.savings_rate - 0.5).abs() < 1e-9);
        assert!((f.debt_to_income - 0.05).abs() < 1e-9);
        assert_eq!(f.income_stability, 1.0);
        assert_eq!(f.spending_volatility, 0.0);
        assert_eq!(f.transaction_count, 5);
    }

    #[test]
    fn bounced_transactions_count_negative_balances() {
        let mut t = txn(-10, "POS", 2024, 1, 1);
        t.balance_after = Some(-5);
        let txns = vec![t.clone(), t, txn(10, "Deposit", 2024, 1, 2)];
        assert_eq!(extract_features(&txns, 1.0).bounced_transactions, 2);
    }

    #[test]
    fn debt_without_income_is_maximal_ratio() {
        let txns = vec![txn(-100, "Overdraft fee", 2024, 1, 1)];
        let f = extract_features(&txns, 1.0);
        assert_eq!(f.debt_to_income, 1.0);
        assert_eq!(f.savings_rate, 0.0);
        assert_eq!(f.income_stability, 0.0);
    }

    #[test]
    fn debt_keywords_match_case_insensitively() {
        for d in ["LOAN DISBURSEMENT FEE", "Credit Card payment", "instalment 3", "Installment 4", "Mortgage"] {
            assert!(DEBT_KEYWORDS.is_match(d), "{d}");
        }
        assert!(!DEBT_KEYWORDS.is_match("Supermarket"));
    }

    // -- Assessment --------------------------------------------------------

    #[test]
    fn fewer_than_minimum_transactions_is_insufficient() {
        let txns: Vec<_> = (1..=9).map(|d| txn(100, "Deposit", 2024, 1, d)).collect();
        assert_eq!(
            assess(&txns, 12.0, &Demographics::default()),
            Err(InsufficientData { found: 9, required: 10 })
        );
    }

    #[test]
    fn explanations_follow_thresholds() {
        let f = Features {
            debt_to_income: 0.5,
            savings_rate: 0.05,
            income_stability: 0.5,
            spending_volatility: 0.4,
            bounced_transactions: 4,
            transaction_count: 10,
            account_age_months: 2.0,
            ..Default::default()
        };
        assert_eq!(risk_factors(&f).len(), 7);
        assert_eq!(improvement_suggestions(&f).len(), 5);

        let healthy = example_features();
        assert!(risk_factors(&healthy).is_empty());
        assert!(improvement_suggestions(&healthy).is_empty());
    }

    #[test]
    fn employment_status_parses_leniently() {
        assert_eq!(EmploymentStatus::parse("Self-Employed"), EmploymentStatus::SelfEmployed);
        assert_eq!(EmploymentStatus::parse("employed"), EmploymentStatus::Employed);
        assert_eq!(EmploymentStatus::parse("astronaut"), EmploymentStatus::Unknown);
    }
}
