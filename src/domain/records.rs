//! Records handed over by the data layer for document generation.
//!
//! These mirror the rows the admin application stores; only the fields that
//! appear on paperwork are modelled. Everything optional is rendered with a
//! placeholder rather than rejected.

use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

use super::dates;
use super::error::DomainError;

pub const DEFAULT_CURRENCY: &str = "INR";

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub applicant_name: String,
    #[serde(default)]
    pub membership_type: Option<String>,
    #[serde(default)]
    pub membership_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub qualification: Option<String>,
    /// Medical council registration number.
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub applied_on: Option<Date>,
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub valid_until: Option<Date>,
    #[serde(default)]
    pub fee: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeStructure {
    pub category: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    /// Early-bird style cut-off after which the row no longer applies.
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub valid_until: Option<Date>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeminarRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub starts_on: Option<Date>,
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub ends_on: Option<Date>,
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub registration_deadline: Option<Date>,
    /// Admin-authored rich text, inserted without escaping.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fee_structures: Vec<FeeStructure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElectionPosition {
    pub title: String,
    #[serde(default)]
    pub seats: Option<u32>,
    #[serde(default)]
    pub eligibility: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElectionRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    /// Nomination deadline.
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub deadline: Option<Date>,
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub voting_date: Option<Date>,
    #[serde(default)]
    pub returning_officer: Option<String>,
    /// Admin-authored rich text, inserted without escaping.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub positions: Vec<ElectionPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub receipt_number: String,
    pub payer_name: String,
    #[serde(default)]
    pub purpose: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default, deserialize_with = "dates::deserialize_optional")]
    pub paid_on: Option<Date>,
}

impl MembershipRecord {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("applicant_name", &self.applicant_name)
    }
}

impl SeminarRecord {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("title", &self.title)?;
        if let (Some(starts), Some(ends)) = (self.starts_on, self.ends_on)
            && ends < starts
        {
            return Err(DomainError::validation(
                "ends_on",
                "seminar cannot end before it starts",
            ));
        }
        for fee in &self.fee_structures {
            require_text("fee_structures.category", &fee.category)?;
            if fee.amount.is_sign_negative() {
                return Err(DomainError::validation(
                    "fee_structures.amount",
                    "fee amount must not be negative",
                ));
            }
        }
        Ok(())
    }
}

impl ElectionRecord {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("title", &self.title)?;
        for position in &self.positions {
            require_text("positions.title", &position.title)?;
        }
        Ok(())
    }
}

impl PaymentRecord {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("receipt_number", &self.receipt_number)?;
        require_text("payer_name", &self.payer_name)?;
        if self.amount.is_sign_negative() {
            return Err(DomainError::validation(
                "amount",
                "amount must not be negative",
            ));
        }
        Ok(())
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Format an amount as `INR 1,500.00`.
pub fn format_amount(amount: Decimal, currency: Option<&str>) -> String {
    let currency = currency
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CURRENCY);
    let rounded = format!("{:.2}", amount.round_dp(2));
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rounded.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{currency} {sign}{grouped}.{fraction}")
}
