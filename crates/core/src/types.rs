/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Monetary amounts are stored in minor units (kobo for NGN).
pub type MinorUnits = i64;

/// Convert a provider amount in major units (e.g. `1250.50`) to minor units.
///
/// Returns `None` for non-finite input.
pub fn to_minor_units(amount: f64) -> Option<MinorUnits> {
    if !amount.is_finite() {
        return None;
    }
    Some((amount * 100.0).round() as MinorUnits)
}

/// Convert minor units back to major units for arithmetic and display.
pub fn to_major_units(amount: MinorUnits) -> f64 {
    amount as f64 / 100.0
}
