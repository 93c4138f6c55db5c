//! Outbound mail adapters
//!
//! [`SmtpMailer`] relays through an SMTP server with STARTTLS.
//! [`LoggingMailer`] only logs, for development setups without a relay.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::fmt::Write as _;
use std::time::Instant;
use tracing::{info, instrument};

use core_kernel::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError};
use domain_automation::{EmailTemplate, Mailer, OutboundEmail};

const ADAPTER_ID: &str = "smtp-mailer";

/// Renders the plain-text body for a template
///
/// The context is printed as labelled lines after a greeting, so every
/// template key produces a readable message without a template engine.
pub fn render_text(template: &EmailTemplate) -> String {
    let context = template.context.as_object();
    let field = |name: &str| {
        context
            .and_then(|c| c.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let mut body = String::new();
    match field("customer_name") {
        Some(name) => {
            let _ = writeln!(body, "Hello {},", name);
        }
        None => body.push_str("Hello,\n"),
    }
    body.push('\n');

    if let Some(context) = context {
        for (key, value) in context {
            if key == "customer_name" || value.is_null() {
                continue;
            }
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(body, "{}: {}", key.replace('_', " "), value);
        }
    }

    if let Some(organization) = field("organization_name") {
        let _ = write!(body, "\n{}\n", organization);
    }
    body
}

/// SMTP relay mailer
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
    ) -> Result<Self, PortError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| PortError::validation_field(format!("invalid sender: {}", e), "mail_from"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| PortError::internal(format!("failed to create SMTP relay: {}", e)))?
            .port(port);
        if let Some((user, password)) = credentials {
            builder = builder.credentials(Credentials::new(user, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message, PortError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| PortError::validation_field(format!("invalid recipient: {}", e), "to"))?;

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(render_text(&email.template)));
        for attachment in &email.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                PortError::validation(format!(
                    "invalid content type for {}: {}",
                    attachment.filename, e
                ))
            })?;
            parts = parts.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .multipart(parts)
            .map_err(|e| PortError::internal(format!("failed to build message: {}", e)))
    }
}

impl DomainPort for SmtpMailer {}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip_all, fields(template = %email.template.key))]
    async fn send(&self, email: OutboundEmail) -> Result<(), PortError> {
        let message = self.build_message(&email)?;

        self.transport.send(message).await.map_err(|e| {
            if e.is_permanent() {
                PortError::validation(format!("recipient rejected: {}", e))
            } else {
                PortError::connection(format!("failed to send email: {}", e))
            }
        })?;

        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl HealthCheckable for SmtpMailer {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let (status, message) = match self.transport.test_connection().await {
            Ok(true) => (AdapterHealth::Healthy, None),
            Ok(false) => (
                AdapterHealth::Degraded,
                Some("SMTP server did not accept the connection".to_string()),
            ),
            Err(e) => (AdapterHealth::Unhealthy, Some(e.to_string())),
        };

        HealthCheckResult::new(ADAPTER_ID, status, start.elapsed().as_millis() as u64, message)
    }
}

/// Mailer that records outbound mail in the log instead of sending it
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMailer;

impl DomainPort for LoggingMailer {}

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), PortError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            template = %email.template.key,
            attachments = email.attachments.len(),
            "Email not sent (no SMTP relay configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_text_greets_customer() {
        let template = EmailTemplate::new(
            "reminder.friendly",
            json!({
                "customer_name": "Wile E. Coyote",
                "organization_name": "Acme Corp",
                "amount_due": "$50.00",
                "due_date": null,
            }),
        );
        let body = render_text(&template);
        assert!(body.starts_with("Hello Wile E. Coyote,"));
        assert!(body.contains("amount due: $50.00"));
        assert!(!body.contains("due date"));
        assert!(body.trim_end().ends_with("Acme Corp"));
    }

    #[test]
    fn test_invalid_sender_is_rejected() {
        let result = SmtpMailer::new("smtp.example.com", 587, None, "not an address");
        assert!(matches!(result, Err(PortError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_logging_mailer_accepts_everything() {
        let email = OutboundEmail {
            to: "buyer@example.com".into(),
            subject: "Invoice INV-000001".into(),
            template: EmailTemplate::new("invoice.issued", json!({})),
            attachments: Vec::new(),
        };
        assert!(LoggingMailer.send(email).await.is_ok());
    }
}
