use crate::{
    application::render::TokenMap,
    domain::{
        error::DomainError,
        records::{SeminarRecord, format_amount},
        types::DocumentKind,
    },
};

use super::{
    Branding, DocumentSource, TO_BE_ANNOUNCED, date_or_tba, file_stem, template, text_or,
};

impl SeminarRecord {
    /// Fee rows as an HTML table; cell text is escaped.
    fn fee_table(&self) -> String {
        if self.fee_structures.is_empty() {
            return format!("<p class=\"fees\">Fees: {TO_BE_ANNOUNCED}</p>");
        }

        let rows: String = self
            .fee_structures
            .iter()
            .map(|fee| {
                format!(
                    "<tr><td>{}</td><td class=\"amount\">{}</td><td>{}</td></tr>",
                    template::embed(fee.category.trim()),
                    template::embed(&format_amount(fee.amount, fee.currency.as_deref())),
                    template::embed(
                        &fee.valid_until
                            .map(crate::domain::dates::display_date)
                            .unwrap_or_else(|| "-".to_string())
                    ),
                )
            })
            .collect();

        format!(
            "<table class=\"fee-table\"><thead><tr><th>Category</th><th>Amount</th><th>Valid until</th></tr></thead><tbody>{rows}</tbody></table>"
        )
    }

    fn description_markup(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

impl DocumentSource for SeminarRecord {
    fn kind(&self) -> DocumentKind {
        DocumentKind::SeminarForm
    }

    fn validate(&self) -> Result<(), DomainError> {
        SeminarRecord::validate(self)
    }

    fn title(&self) -> String {
        self.title.trim().to_string()
    }

    fn file_stem(&self) -> String {
        file_stem(&self.title, "registration-form")
    }

    fn fill_tokens(&self, tokens: &mut TokenMap) {
        tokens
            .insert_text("SEMINAR_TITLE", self.title.trim())
            .insert_text("VENUE", text_or(self.venue.as_deref(), TO_BE_ANNOUNCED))
            .insert_text("START_DATE", date_or_tba(self.starts_on))
            .insert_text("END_DATE", date_or_tba(self.ends_on))
            .insert_text(
                "REGISTRATION_DEADLINE",
                date_or_tba(self.registration_deadline),
            )
            .insert_raw("DESCRIPTION", self.description_markup().unwrap_or_default())
            .insert_raw("FEE_TABLE", self.fee_table());
    }

    fn default_template(&self, branding: &Branding, generated_on: &str) -> String {
        let kind = DocumentKind::SeminarForm;
        let mut parts = vec![
            template::header(branding, self.title.trim(), Some(kind.display_name())),
            template::section(
                "Seminar",
                &[
                    template::field("Venue", text_or(self.venue.as_deref(), TO_BE_ANNOUNCED)),
                    template::field("Starts", &date_or_tba(self.starts_on)),
                    template::field("Ends", &date_or_tba(self.ends_on)),
                    template::field(
                        "Register by",
                        &date_or_tba(self.registration_deadline),
                    ),
                ],
            ),
        ];
        if let Some(description) = self.description_markup() {
            parts.push(template::raw_block(description));
        }
        parts.push(template::section("Fees", &[self.fee_table()]));
        parts.push(template::section(
            "Participant details",
            &[
                template::blank_field("Full name"),
                template::blank_field("Membership number"),
                template::blank_field("Registration category"),
                template::blank_field("Email"),
                template::blank_field("Phone"),
            ],
        ));
        parts.push(template::signature_block("Participant signature", "Date"));
        parts.push(template::footer(generated_on));

        template::document(
            &format!("{} - {}", self.title.trim(), kind.display_name()),
            &parts,
        )
    }
}
