//! Projection of the identity store's `users` table.

use chrono::{Datelike, NaiveDate};
use ledgerlink_core::scoring::{Demographics, EmploymentStatus};
use ledgerlink_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub full_name: String,
    pub employment_status: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// Age in whole years on `today`, if a birth date is on file.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        let mut years = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    pub fn demographics(&self, today: NaiveDate) -> Demographics {
        Demographics {
            employment: self
                .employment_status
                .as_deref()
                .map(EmploymentStatus::parse)
                .unwrap_or_default(),
            age: self.age_on(today),
        }
    }
}

/// DTO for inserting a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub full_name: String,
    pub employment_status: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}
