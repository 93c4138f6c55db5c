//! Validated commands
//!
//! Commands are the only way external input reaches the billing core. They
//! are validated once, at the service boundary, and then converted into
//! domain values.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use core_kernel::{Cents, Currency, CustomerId};
use domain_billing::{Discount, DiscountType, LineItem, PaymentStatus};

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}

fn percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percentage"));
    }
    Ok(())
}

fn discount_in_range(discount: &DiscountInput) -> Result<(), ValidationError> {
    if discount.discount_type == DiscountType::Percent && discount.value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percent_discount_over_100"));
    }
    Ok(())
}

fn default_provider() -> String {
    "manual".to_string()
}

fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Succeeded
}

/// A line or invoice discount as submitted
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "discount_in_range"))]
pub struct DiscountInput {
    pub discount_type: DiscountType,
    #[validate(custom(function = "non_negative"))]
    pub value: Decimal,
}

impl DiscountInput {
    pub fn into_discount(self) -> Discount {
        Discount {
            discount_type: self.discount_type,
            value: self.value,
        }
    }
}

/// A line item on a new invoice
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewLineItem {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(custom(function = "non_negative"))]
    pub quantity: Decimal,
    #[validate(range(min = 0))]
    pub unit_price_cents: Cents,
    #[validate(custom(function = "percentage"))]
    pub tax_percent: Option<Decimal>,
    #[validate(nested)]
    pub discount: Option<DiscountInput>,
}

impl NewLineItem {
    pub fn into_line_item(self, position: i32) -> LineItem {
        LineItem {
            quantity: self.quantity,
            tax_percent: self.tax_percent,
            discount: self.discount.map(DiscountInput::into_discount),
            ..LineItem::new(self.description, self.unit_price_cents).with_position(position)
        }
    }
}

/// Creates a draft invoice together with its line items
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInvoiceCommand {
    pub customer_id: CustomerId,
    pub currency: Currency,
    /// Defaults to today in the organization's timezone
    pub issue_date: Option<NaiveDate>,
    /// Defaults to `issue_date + payment_terms_days` when terms are set
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(range(max = 365))]
    pub payment_terms_days: u32,
    #[validate(nested)]
    pub discount: Option<DiscountInput>,
    #[validate(length(max = 64))]
    pub tax_label: Option<String>,
    #[validate(custom(function = "percentage"))]
    pub tax_percent: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(max = 200), nested)]
    pub line_items: Vec<NewLineItem>,
}

impl CreateInvoiceCommand {
    /// Resolves the due date from explicit date or payment terms
    pub fn resolve_due_date(&self, issue_date: NaiveDate) -> Option<NaiveDate> {
        self.due_date.or_else(|| {
            (self.payment_terms_days > 0).then(|| {
                issue_date + chrono::Days::new(u64::from(self.payment_terms_days))
            })
        })
    }
}

/// Records a payment reported by the seller or a provider
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordPaymentCommand {
    #[validate(range(min = 1))]
    pub amount_cents: Cents,
    #[serde(default = "default_payment_status")]
    pub status: PaymentStatus,
    #[serde(default = "default_provider")]
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[validate(length(max = 255))]
    pub provider_reference: Option<String>,
}

impl RecordPaymentCommand {
    pub fn succeeded(amount_cents: Cents) -> Self {
        Self {
            amount_cents,
            status: PaymentStatus::Succeeded,
            provider: default_provider(),
            provider_reference: None,
        }
    }
}

/// Issues a credit note against an invoice
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IssueCreditNoteCommand {
    #[validate(range(min = 1))]
    pub amount_cents: Cents,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(description: &str) -> NewLineItem {
        NewLineItem {
            description: description.to_string(),
            quantity: dec!(1),
            unit_price_cents: 1000,
            tax_percent: None,
            discount: None,
        }
    }

    fn command() -> CreateInvoiceCommand {
        CreateInvoiceCommand {
            customer_id: CustomerId::new(),
            currency: Currency::USD,
            issue_date: None,
            due_date: None,
            payment_terms_days: 30,
            discount: None,
            tax_label: None,
            tax_percent: Some(dec!(7)),
            notes: None,
            line_items: vec![line("Widget")],
        }
    }

    #[test]
    fn test_valid_command_passes() {
        assert!(command().validate().is_ok());
    }

    #[test]
    fn test_empty_description_fails() {
        let mut cmd = command();
        cmd.line_items.push(line(""));
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_percent_discount_over_100_fails() {
        let mut cmd = command();
        cmd.discount = Some(DiscountInput {
            discount_type: DiscountType::Percent,
            value: dec!(150),
        });
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_negative_quantity_fails() {
        let mut cmd = command();
        cmd.line_items[0].quantity = dec!(-1);
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_due_date_from_terms() {
        let cmd = command();
        let issue = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(cmd.resolve_due_date(issue), NaiveDate::from_ymd_opt(2024, 2, 14));

        let mut no_terms = command();
        no_terms.payment_terms_days = 0;
        assert_eq!(no_terms.resolve_due_date(issue), None);
    }

    #[test]
    fn test_zero_amount_payment_fails() {
        assert!(RecordPaymentCommand::succeeded(0).validate().is_err());
        assert!(RecordPaymentCommand::succeeded(1).validate().is_ok());
    }
}
