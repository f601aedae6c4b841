//! Shared domain enumerations.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Kinds of downloadable paperwork the service renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    MembershipForm,
    SeminarForm,
    ElectionForm,
    PaymentReceipt,
    /// Ad-hoc template rendered through the generic endpoint.
    Custom,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::MembershipForm,
        DocumentKind::SeminarForm,
        DocumentKind::ElectionForm,
        DocumentKind::PaymentReceipt,
        DocumentKind::Custom,
    ];

    /// Identifier used in artifact filenames and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::MembershipForm => "membership_form",
            DocumentKind::SeminarForm => "seminar_form",
            DocumentKind::ElectionForm => "election_form",
            DocumentKind::PaymentReceipt => "payment_receipt",
            DocumentKind::Custom => "document",
        }
    }

    /// Path segment used by the HTTP surface.
    pub fn route_segment(self) -> &'static str {
        match self {
            DocumentKind::MembershipForm => "membership-form",
            DocumentKind::SeminarForm => "seminar-form",
            DocumentKind::ElectionForm => "election-form",
            DocumentKind::PaymentReceipt => "payment-receipt",
            DocumentKind::Custom => "custom",
        }
    }

    /// Human readable heading used in synthesized templates.
    pub fn display_name(self) -> &'static str {
        match self {
            DocumentKind::MembershipForm => "Membership Application Form",
            DocumentKind::SeminarForm => "Seminar Registration Form",
            DocumentKind::ElectionForm => "Nomination Form",
            DocumentKind::PaymentReceipt => "Payment Receipt",
            DocumentKind::Custom => "Document",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        DocumentKind::ALL
            .into_iter()
            .find(|kind| kind.route_segment() == normalized)
            .ok_or_else(|| DomainError::validation("kind", format!("unknown document kind `{value}`")))
    }
}
