//! Process-level adapters for the automation ports
//!
//! PostgreSQL adapters live in `infra_db`; these cover mail delivery, the
//! compliance gate and document rendering.

pub mod compliance;
pub mod documents;
pub mod mailer;

pub use compliance::InvoiceComplianceGate;
pub use documents::PlainTextDocumentService;
pub use mailer::{LoggingMailer, SmtpMailer};
