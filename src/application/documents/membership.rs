use crate::{
    application::render::TokenMap,
    domain::{
        error::DomainError,
        records::{MembershipRecord, format_amount},
        types::DocumentKind,
    },
};

use super::{
    Branding, DocumentSource, NOT_AVAILABLE, date_or_tba, file_stem, template, text_or,
};

impl MembershipRecord {
    fn fee_display(&self) -> String {
        self.fee
            .map(|fee| format_amount(fee, self.currency.as_deref()))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

impl DocumentSource for MembershipRecord {
    fn kind(&self) -> DocumentKind {
        DocumentKind::MembershipForm
    }

    fn validate(&self) -> Result<(), DomainError> {
        MembershipRecord::validate(self)
    }

    fn title(&self) -> String {
        self.applicant_name.trim().to_string()
    }

    fn file_stem(&self) -> String {
        file_stem(&self.applicant_name, "membership-application-form")
    }

    fn fill_tokens(&self, tokens: &mut TokenMap) {
        tokens
            .insert_text("MEMBER_NAME", self.applicant_name.trim())
            .insert_text(
                "MEMBERSHIP_TYPE",
                text_or(self.membership_type.as_deref(), NOT_AVAILABLE),
            )
            .insert_text(
                "MEMBERSHIP_NUMBER",
                text_or(self.membership_number.as_deref(), NOT_AVAILABLE),
            )
            .insert_text("EMAIL", text_or(self.email.as_deref(), NOT_AVAILABLE))
            .insert_text("PHONE", text_or(self.phone.as_deref(), NOT_AVAILABLE))
            .insert_text("ADDRESS", text_or(self.address.as_deref(), NOT_AVAILABLE))
            .insert_text(
                "QUALIFICATION",
                text_or(self.qualification.as_deref(), NOT_AVAILABLE),
            )
            .insert_text(
                "REGISTRATION_NUMBER",
                text_or(self.registration_number.as_deref(), NOT_AVAILABLE),
            )
            .insert_text("APPLIED_ON", date_or_tba(self.applied_on))
            .insert_text("VALID_UNTIL", date_or_tba(self.valid_until))
            .insert_text("FEE_AMOUNT", self.fee_display());
    }

    fn default_template(&self, branding: &Branding, generated_on: &str) -> String {
        let kind = DocumentKind::MembershipForm;
        let applicant = template::section(
            "Applicant details",
            &[
                template::field("Name", self.applicant_name.trim()),
                template::field(
                    "Qualification",
                    text_or(self.qualification.as_deref(), NOT_AVAILABLE),
                ),
                template::field(
                    "Medical council registration",
                    text_or(self.registration_number.as_deref(), NOT_AVAILABLE),
                ),
                template::field("Email", text_or(self.email.as_deref(), NOT_AVAILABLE)),
                template::field("Phone", text_or(self.phone.as_deref(), NOT_AVAILABLE)),
                template::field("Address", text_or(self.address.as_deref(), NOT_AVAILABLE)),
            ],
        );
        let membership = template::section(
            "Membership",
            &[
                template::field(
                    "Membership type",
                    text_or(self.membership_type.as_deref(), NOT_AVAILABLE),
                ),
                template::field(
                    "Membership number",
                    text_or(self.membership_number.as_deref(), NOT_AVAILABLE),
                ),
                template::field("Applied on", &date_or_tba(self.applied_on)),
                template::field("Valid until", &date_or_tba(self.valid_until)),
                template::field("Fee", &self.fee_display()),
            ],
        );
        let office = template::section(
            "For office use",
            &[
                template::blank_field("Receipt number"),
                template::blank_field("Approved on"),
            ],
        );

        template::document(
            &format!("{} - {}", kind.display_name(), self.applicant_name.trim()),
            &[
                template::header(branding, kind.display_name(), None),
                applicant,
                membership,
                office,
                template::signature_block("Applicant signature", "Secretary"),
                template::footer(generated_on),
            ],
        )
    }
}
