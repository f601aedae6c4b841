use crate::{
    application::render::TokenMap,
    domain::{
        error::DomainError,
        records::{DEFAULT_CURRENCY, PaymentRecord, format_amount},
        types::DocumentKind,
    },
};

use super::{Branding, DocumentSource, NOT_AVAILABLE, date_or_tba, template, text_or};

impl PaymentRecord {
    fn currency_code(&self) -> &str {
        text_or(self.currency.as_deref(), DEFAULT_CURRENCY)
    }
}

impl DocumentSource for PaymentRecord {
    fn kind(&self) -> DocumentKind {
        DocumentKind::PaymentReceipt
    }

    fn validate(&self) -> Result<(), DomainError> {
        PaymentRecord::validate(self)
    }

    fn title(&self) -> String {
        format!("Receipt {}", self.receipt_number.trim())
    }

    fn file_stem(&self) -> String {
        let number = slug::slugify(&self.receipt_number);
        if number.is_empty() {
            "receipt".to_string()
        } else {
            format!("receipt-{number}")
        }
    }

    fn fill_tokens(&self, tokens: &mut TokenMap) {
        tokens
            .insert_text("RECEIPT_NUMBER", self.receipt_number.trim())
            .insert_text("PAYER_NAME", self.payer_name.trim())
            .insert_text("PURPOSE", text_or(self.purpose.as_deref(), NOT_AVAILABLE))
            .insert_text(
                "AMOUNT",
                format_amount(self.amount, Some(self.currency_code())),
            )
            .insert_text("CURRENCY", self.currency_code())
            .insert_text(
                "PAYMENT_METHOD",
                text_or(self.payment_method.as_deref(), NOT_AVAILABLE),
            )
            .insert_text(
                "TRANSACTION_ID",
                text_or(self.transaction_id.as_deref(), NOT_AVAILABLE),
            )
            .insert_text("PAID_ON", date_or_tba(self.paid_on));
    }

    fn default_template(&self, branding: &Branding, generated_on: &str) -> String {
        let kind = DocumentKind::PaymentReceipt;
        let details = template::section(
            "Payment",
            &[
                template::field("Receipt number", self.receipt_number.trim()),
                template::field("Date", &date_or_tba(self.paid_on)),
                template::field("Received from", self.payer_name.trim()),
                template::field("Towards", text_or(self.purpose.as_deref(), NOT_AVAILABLE)),
                template::field(
                    "Amount",
                    &format_amount(self.amount, Some(self.currency_code())),
                ),
                template::field(
                    "Payment method",
                    text_or(self.payment_method.as_deref(), NOT_AVAILABLE),
                ),
                template::field(
                    "Transaction ID",
                    text_or(self.transaction_id.as_deref(), NOT_AVAILABLE),
                ),
            ],
        );

        template::document(
            &self.title(),
            &[
                template::header(branding, kind.display_name(), None),
                details,
                template::signature_block("", "Treasurer"),
                "<p class=\"footer\">This is a computer generated receipt.</p>".to_string(),
                template::footer(generated_on),
            ],
        )
    }
}
