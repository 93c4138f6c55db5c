//! Invoice repository implementation
//!
//! Database access for organizations, customers, invoices with their line
//! items, and the payment and credit-note ledgers that settle them.
//!
//! Reads return row types that mirror the table columns; the adapter layer
//! decodes them into domain types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use domain_billing::{
    format_invoice_number, CreditNote, Invoice, InvoiceStatus, LineItem, Payment,
};
use domain_automation::NewInvoice;

use crate::error::DatabaseError;

const INVOICE_COLUMNS: &str = r#"
    id, organization_id, customer_id, number, public_token, status, currency,
    issue_date, due_date, payment_terms_days, discount_type, discount_value,
    tax_label, tax_percent, notes, sent_at, viewed_at, paid_at, created_at, updated_at
"#;

/// Repository for invoices and their money records
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<OrganizationRow>, DatabaseError> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT id, name, timezone, billing_email FROM organizations WHERE id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Retrieves a customer only if it belongs to `organization_id`
    pub async fn get_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<CustomerRow>, DatabaseError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT id, organization_id, name, email
            FROM customers
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(customer_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Retrieves an invoice only if it belongs to `organization_id`
    pub async fn get_invoice(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceRow>, DatabaseError> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 AND organization_id = $2"
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(invoice_id)
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_invoice_by_token(
        &self,
        public_token: &str,
    ) -> Result<Option<InvoiceRow>, DatabaseError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE public_token = $1");
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(public_token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Lines of an invoice in display order
    pub async fn line_items(&self, invoice_id: Uuid) -> Result<Vec<LineItemRow>, DatabaseError> {
        fetch_line_items(&self.pool, invoice_id).await
    }

    pub async fn payments(&self, invoice_id: Uuid) -> Result<Vec<PaymentRow>, DatabaseError> {
        fetch_payments(&self.pool, invoice_id).await
    }

    pub async fn credit_notes(&self, invoice_id: Uuid) -> Result<Vec<CreditNoteRow>, DatabaseError> {
        fetch_credit_notes(&self.pool, invoice_id).await
    }

    /// Inserts a draft invoice with its lines in a single transaction
    ///
    /// The number comes from the organization's row in
    /// `invoice_number_sequences`; the upsert holds that row's lock until
    /// commit, so concurrent creates in one organization never share a number.
    ///
    /// # Returns
    ///
    /// The allocated invoice number
    pub async fn create_invoice(&self, invoice: &NewInvoice) -> Result<String, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_number_sequences (organization_id, last_value)
            VALUES ($1, 1)
            ON CONFLICT (organization_id)
            DO UPDATE SET last_value = invoice_number_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(invoice.organization_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let number = format_invoice_number(sequence);

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, organization_id, customer_id, number, public_token, status, currency,
                issue_date, due_date, payment_terms_days, discount_type, discount_value,
                tax_label, tax_percent, notes, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'DRAFT', $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.organization_id.as_uuid())
        .bind(invoice.customer_id.as_uuid())
        .bind(&number)
        .bind(&invoice.public_token)
        .bind(invoice.currency.code())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.payment_terms_days as i32)
        .bind(invoice.discount.map(|d| d.discount_type.as_str()))
        .bind(invoice.discount.map(|d| d.value))
        .bind(&invoice.tax_label)
        .bind(invoice.tax_percent)
        .bind(&invoice.notes)
        .bind(invoice.created_at)
        .execute(&mut *tx)
        .await?;

        for line in &invoice.line_items {
            insert_line_item(&mut *tx, *invoice.id.as_uuid(), line).await?;
        }

        tx.commit().await?;
        Ok(number)
    }

    /// Writes status and lifecycle timestamps if the stored status is `expected`
    ///
    /// Returns `false` when another writer changed the status first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no invoice matched
    pub async fn update_lifecycle(
        &self,
        invoice: &Invoice,
        expected: InvoiceStatus,
    ) -> Result<bool, DatabaseError> {
        if write_lifecycle(&self.pool, invoice, expected).await? {
            return Ok(true);
        }
        match self
            .get_invoice(*invoice.organization_id.as_uuid(), *invoice.id.as_uuid())
            .await?
        {
            Some(_) => Ok(false),
            None => Err(DatabaseError::not_found("Invoice", invoice.id)),
        }
    }

    pub async fn insert_payment(&self, payment: &Payment) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, invoice_id, status, amount_cents, provider, provider_reference, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.invoice_id.as_uuid())
        .bind(payment.status.as_str())
        .bind(payment.amount_cents)
        .bind(&payment.provider)
        .bind(&payment.provider_reference)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_credit_note(&self, credit_note: &CreditNote) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO credit_notes (id, invoice_id, amount_cents, reason, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(credit_note.id.as_uuid())
        .bind(credit_note.invoice_id.as_uuid())
        .bind(credit_note.amount_cents)
        .bind(&credit_note.reason)
        .bind(credit_note.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Inserts one line item on an open connection or transaction
/// Reads an invoice row and holds its lock until the transaction ends
pub(crate) async fn lock_invoice(
    conn: &mut PgConnection,
    organization_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<InvoiceRow>, DatabaseError> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 AND organization_id = $2 FOR UPDATE"
    );
    let row = sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(invoice_id)
        .bind(organization_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub(crate) async fn write_lifecycle<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice: &Invoice,
    expected: InvoiceStatus,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE invoices
        SET status = $3, sent_at = $4, viewed_at = $5, paid_at = $6, updated_at = $7
        WHERE id = $1 AND organization_id = $2 AND status = $8
        "#,
    )
    .bind(invoice.id.as_uuid())
    .bind(invoice.organization_id.as_uuid())
    .bind(invoice.status.as_str())
    .bind(invoice.sent_at)
    .bind(invoice.viewed_at)
    .bind(invoice.paid_at)
    .bind(invoice.updated_at)
    .bind(expected.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn fetch_line_items<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice_id: Uuid,
) -> Result<Vec<LineItemRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, LineItemRow>(
        r#"
        SELECT id, description, quantity, unit_price_cents, tax_percent,
               discount_type, discount_value, kind, position
        FROM invoice_line_items
        WHERE invoice_id = $1
        ORDER BY position, created_at
        "#,
    )
    .bind(invoice_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub(crate) async fn fetch_payments<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice_id: Uuid,
) -> Result<Vec<PaymentRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT id, invoice_id, status, amount_cents, provider, provider_reference, created_at
        FROM payments
        WHERE invoice_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(invoice_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub(crate) async fn fetch_credit_notes<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice_id: Uuid,
) -> Result<Vec<CreditNoteRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, CreditNoteRow>(
        r#"
        SELECT id, invoice_id, amount_cents, reason, created_at
        FROM credit_notes
        WHERE invoice_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(invoice_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub(crate) async fn insert_line_item(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    line: &LineItem,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO invoice_line_items (
            id, invoice_id, description, quantity, unit_price_cents, tax_percent,
            discount_type, discount_value, kind, position
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(line.id.as_uuid())
    .bind(invoice_id)
    .bind(&line.description)
    .bind(line.quantity)
    .bind(line.unit_price_cents)
    .bind(line.tax_percent)
    .bind(line.discount.map(|d| d.discount_type.as_str()))
    .bind(line.discount.map(|d| d.value))
    .bind(line.kind.as_str())
    .bind(line.position)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct OrganizationRow {
    pub id: Uuid,
    pub name: String,
    pub timezone: String,
    pub billing_email: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CustomerRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub number: String,
    pub public_token: String,
    pub status: String,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub payment_terms_days: i32,
    pub discount_type: Option<String>,
    pub discount_value: Option<Decimal>,
    pub tax_label: Option<String>,
    pub tax_percent: Option<Decimal>,
    pub notes: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct LineItemRow {
    pub id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price_cents: i64,
    pub tax_percent: Option<Decimal>,
    pub discount_type: Option<String>,
    pub discount_value: Option<Decimal>,
    pub kind: String,
    pub position: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub status: String,
    pub amount_cents: i64,
    pub provider: String,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CreditNoteRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
