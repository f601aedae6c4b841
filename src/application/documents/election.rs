use crate::{
    application::render::TokenMap,
    domain::{error::DomainError, records::ElectionRecord, types::DocumentKind},
};

use super::{
    Branding, DocumentSource, NOT_AVAILABLE, TO_BE_ANNOUNCED, date_or_tba, file_stem, template,
    text_or,
};

const DECLARATION: &str = "I consent to this nomination and declare that I am eligible to contest the position named above under the rules of the association.";

impl ElectionRecord {
    /// Open positions as a list; entries are escaped.
    fn positions_list(&self) -> String {
        if self.positions.is_empty() {
            return format!("<p class=\"positions\">Positions: {TO_BE_ANNOUNCED}</p>");
        }

        let items: String = self
            .positions
            .iter()
            .map(|position| {
                let mut item = template::embed(position.title.trim());
                if let Some(seats) = position.seats {
                    let noun = if seats == 1 { "seat" } else { "seats" };
                    item.push_str(&format!(" ({seats} {noun})"));
                }
                if let Some(eligibility) = position
                    .eligibility
                    .as_deref()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                {
                    item.push_str(" - ");
                    item.push_str(&template::embed(eligibility));
                }
                format!("<li>{item}</li>")
            })
            .collect();

        format!("<ul class=\"positions\">{items}</ul>")
    }
}

impl DocumentSource for ElectionRecord {
    fn kind(&self) -> DocumentKind {
        DocumentKind::ElectionForm
    }

    fn validate(&self) -> Result<(), DomainError> {
        ElectionRecord::validate(self)
    }

    fn title(&self) -> String {
        self.title.trim().to_string()
    }

    fn file_stem(&self) -> String {
        file_stem(&self.title, "nomination-form")
    }

    fn fill_tokens(&self, tokens: &mut TokenMap) {
        tokens
            .insert_text("ELECTION_TITLE", self.title.trim())
            .insert_text("NOMINATION_DEADLINE", date_or_tba(self.deadline))
            .insert_text("VOTING_DATE", date_or_tba(self.voting_date))
            .insert_text(
                "RETURNING_OFFICER",
                text_or(self.returning_officer.as_deref(), NOT_AVAILABLE),
            )
            .insert_raw(
                "DESCRIPTION",
                self.description.as_deref().map(str::trim).unwrap_or_default(),
            )
            .insert_raw("POSITIONS", self.positions_list());
    }

    fn default_template(&self, branding: &Branding, generated_on: &str) -> String {
        let kind = DocumentKind::ElectionForm;
        let mut parts = vec![
            template::header(branding, self.title.trim(), Some(kind.display_name())),
            template::section(
                "Election",
                &[
                    template::field("Nomination deadline", &date_or_tba(self.deadline)),
                    template::field("Voting date", &date_or_tba(self.voting_date)),
                    template::field(
                        "Returning officer",
                        text_or(self.returning_officer.as_deref(), NOT_AVAILABLE),
                    ),
                ],
            ),
        ];
        if let Some(description) = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
        {
            parts.push(template::raw_block(description));
        }
        parts.push(template::section("Open positions", &[self.positions_list()]));
        parts.push(template::section(
            "Candidate",
            &[
                template::blank_field("Full name"),
                template::blank_field("Membership number"),
                template::blank_field("Position contested"),
            ],
        ));
        for role in ["Proposer", "Seconder"] {
            parts.push(template::section(
                role,
                &[
                    template::blank_field("Full name"),
                    template::blank_field("Membership number"),
                    template::blank_field("Signature"),
                ],
            ));
        }
        parts.push(template::section(
            "Declaration",
            &[format!("<p>{}</p>", template::embed(DECLARATION))],
        ));
        parts.push(template::signature_block("Candidate signature", "Date"));
        parts.push(template::footer(generated_on));

        template::document(
            &format!("{} - {}", self.title.trim(), kind.display_name()),
            &parts,
        )
    }
}
