//! HTTP tests for interface_api
//!
//! The router runs on the in-memory adapters from `domain_automation::mock`
//! with a clock frozen on the standard issue date.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};
use std::sync::Arc;

use core_kernel::{HealthCheckable, OrganizationId};
use domain_automation::mock::{MockJobStatus, MockPorts};
use domain_billing::{Customer, Organization};
use interface_api::{create_router, AppState};
use test_utils::{
    CustomerFixtures, OrganizationFixtures, TemporalFixtures, TestLateFeePolicyBuilder,
    TestReminderPolicyBuilder,
};

struct TestApp {
    server: TestServer,
    ports: MockPorts,
    org: Organization,
    customer: Customer,
}

impl TestApp {
    async fn new() -> Self {
        let ports = MockPorts::new(TemporalFixtures::clock_at_issue());
        let org = OrganizationFixtures::acme();
        let customer = CustomerFixtures::with_email(org.id);
        ports.store.insert_organization(org.clone()).await;
        ports.store.insert_customer(customer.clone()).await;

        let health = vec![ports.store.clone() as Arc<dyn HealthCheckable>];
        let state = AppState::new(Arc::new(ports.service()), health);
        let server = TestServer::new(create_router(state)).unwrap();

        Self {
            server,
            ports,
            org,
            customer,
        }
    }

    fn scoped(&self, request: TestRequest, organization_id: OrganizationId) -> TestRequest {
        request.add_header(
            HeaderName::from_static("x-organization-id"),
            HeaderValue::from_str(&organization_id.to_string()).unwrap(),
        )
    }

    fn post(&self, path: &str) -> TestRequest {
        self.scoped(self.server.post(&format!("/api/v1{}", path)), self.org.id)
    }

    fn get(&self, path: &str) -> TestRequest {
        self.scoped(self.server.get(&format!("/api/v1{}", path)), self.org.id)
    }

    fn invoice_body(&self) -> Value {
        json!({
            "customer_id": self.customer.id,
            "currency": "USD",
            "payment_terms_days": 30,
            "line_items": [
                { "description": "Consulting", "quantity": "2", "unit_price_cents": 2500 }
            ]
        })
    }

    /// Creates a draft and returns its id
    async fn create_invoice(&self) -> String {
        let response = self.post("/invoices").json(&self.invoice_body()).await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["id"].as_str().unwrap().to_string()
    }

    async fn sent_invoice(&self) -> Value {
        let id = self.create_invoice().await;
        self.post(&format!("/invoices/{}/send", id))
            .await
            .assert_status_ok();
        self.get(&format!("/invoices/{}", id)).await.json::<Value>()
    }
}

// ============================================================================
// Health and tenancy
// ============================================================================

mod health_and_tenancy_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_needs_no_tenant() {
        let app = TestApp::new().await;
        let response = app.server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_reports_adapters() {
        let app = TestApp::new().await;
        let body = app.server.get("/health/ready").await.json::<Value>();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["adapters"][0]["adapter_id"], "mock-billing-store");
    }

    #[tokio::test]
    async fn test_missing_organization_header_is_rejected() {
        let app = TestApp::new().await;
        let response = app.server.post("/api/v1/invoices").json(&app.invoice_body()).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_malformed_organization_header_is_rejected() {
        let app = TestApp::new().await;
        let response = app
            .server
            .get("/api/v1/invoices/whatever")
            .add_header(
                HeaderName::from_static("x-organization-id"),
                HeaderValue::from_static("not-a-uuid"),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_read_invoice() {
        let app = TestApp::new().await;
        let id = app.create_invoice().await;

        let other = OrganizationFixtures::globex();
        app.ports.store.insert_organization(other.clone()).await;
        let response = app
            .scoped(app.server.get(&format!("/api/v1/invoices/{}", id)), other.id)
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_invoice_id_is_bad_request() {
        let app = TestApp::new().await;
        app.get("/invoices/12345").await.assert_status(StatusCode::BAD_REQUEST);
    }
}

// ============================================================================
// Invoice creation and totals
// ============================================================================

mod invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_invoice_returns_draft_with_totals() {
        let app = TestApp::new().await;
        let response = app.post("/invoices").json(&app.invoice_body()).await;
        response.assert_status(StatusCode::CREATED);

        let body = response.json::<Value>();
        assert_eq!(body["number"], "INV-000001");
        assert_eq!(body["status"], "DRAFT");
        assert_eq!(body["issue_date"], "2026-03-01");
        assert_eq!(body["due_date"], "2026-03-31");
        assert_eq!(body["totals"]["total_cents"], 5000);
        assert_eq!(body["due_cents"], 5000);
        assert_eq!(body["public_token"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_numbers_increase_per_organization() {
        let app = TestApp::new().await;
        app.create_invoice().await;
        let body = app
            .post("/invoices")
            .json(&app.invoice_body())
            .await
            .json::<Value>();
        assert_eq!(body["number"], "INV-000002");
    }

    #[tokio::test]
    async fn test_invalid_line_item_is_unprocessable() {
        let app = TestApp::new().await;
        let mut body = app.invoice_body();
        body["line_items"][0]["description"] = json!("");

        let response = app.post("/invoices").json(&body).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Value>()["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_foreign_customer_is_unprocessable() {
        let app = TestApp::new().await;
        let mut body = app.invoice_body();
        body["customer_id"] = json!(CustomerFixtures::with_email(OrganizationId::new()).id);

        app.post("/invoices")
            .json(&body)
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_totals_endpoint_reflects_payments() {
        let app = TestApp::new().await;
        let id = app.create_invoice().await;
        app.post(&format!("/invoices/{}/send", id)).await.assert_status_ok();
        app.post(&format!("/invoices/{}/payments", id))
            .json(&json!({ "amount_cents": 1500 }))
            .await
            .assert_status(StatusCode::CREATED);

        let totals = app
            .get(&format!("/invoices/{}/totals", id))
            .await
            .json::<Value>();
        assert_eq!(totals["totals"]["total_cents"], 5000);
        assert_eq!(totals["paid_cents"], 1500);
        assert_eq!(totals["due_cents"], 3500);
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_send_emails_buyer_and_schedules_automation() {
        let app = TestApp::new().await;
        app.ports
            .store
            .insert_reminder_policy(TestReminderPolicyBuilder::new(app.org.id).build())
            .await;
        app.ports
            .store
            .insert_late_fee_policy(TestLateFeePolicyBuilder::new(app.org.id).build())
            .await;
        let id = app.create_invoice().await;

        let response = app.post(&format!("/invoices/{}/send", id)).await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["status"], "SENT");
        assert_eq!(body["resent"], false);
        assert_eq!(body["emailed"], true);
        assert_eq!(body["schedule"]["reminders"], 3);
        assert_eq!(body["schedule"]["late_fees"], 1);

        assert_eq!(app.ports.mailer.sent().await.len(), 1);
        assert_eq!(app.ports.queue.jobs_with_status(MockJobStatus::Pending).await.len(), 4);
    }

    #[tokio::test]
    async fn test_compliance_failure_blocks_send() {
        let app = TestApp::new().await;
        app.ports
            .compliance
            .fail_with("tax_id", "seller tax id is required")
            .await;
        let id = app.create_invoice().await;

        let response = app.post(&format!("/invoices/{}/send", id)).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body = response.json::<Value>();
        assert_eq!(body["error"], "compliance_failed");
        assert_eq!(body["details"][0]["field"], "tax_id");

        let invoice = app.get(&format!("/invoices/{}", id)).await.json::<Value>();
        assert_eq!(invoice["status"], "DRAFT");
        assert!(app.ports.mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_void_then_send_is_conflict() {
        let app = TestApp::new().await;
        let id = app.create_invoice().await;

        let voided = app.post(&format!("/invoices/{}/void", id)).await;
        voided.assert_status_ok();
        assert_eq!(voided.json::<Value>()["status"], "VOID");

        let response = app.post(&format!("/invoices/{}/send", id)).await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(
            response.json::<Value>()["message"],
            "cannot send a void invoice"
        );
    }

    #[tokio::test]
    async fn test_full_payment_marks_invoice_paid() {
        let app = TestApp::new().await;
        let invoice = app.sent_invoice().await;
        let id = invoice["id"].as_str().unwrap();

        let response = app
            .post(&format!("/invoices/{}/payments", id))
            .json(&json!({ "amount_cents": 5000, "provider": "stripe" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body = response.json::<Value>();
        assert_eq!(body["payment"]["status"], "SUCCEEDED");
        assert_eq!(body["settlement"]["outcome"], "paid");

        let invoice = app.get(&format!("/invoices/{}", id)).await.json::<Value>();
        assert_eq!(invoice["status"], "PAID");
        assert_eq!(invoice["due_cents"], 0);
    }

    #[tokio::test]
    async fn test_credit_note_and_mark_paid() {
        let app = TestApp::new().await;
        let invoice = app.sent_invoice().await;
        let id = invoice["id"].as_str().unwrap();

        let outstanding = app
            .post(&format!("/invoices/{}/mark-paid", id))
            .await
            .json::<Value>();
        assert_eq!(outstanding["outcome"], "outstanding");
        assert_eq!(outstanding["due_cents"], 5000);

        let response = app
            .post(&format!("/invoices/{}/credit-notes", id))
            .json(&json!({ "amount_cents": 5000, "reason": "goodwill" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<Value>()["settlement"]["outcome"], "paid");
    }
}

// ============================================================================
// Hosted link
// ============================================================================

mod public_link_tests {
    use super::*;

    #[tokio::test]
    async fn test_hosted_link_marks_viewed() {
        let app = TestApp::new().await;
        let invoice = app.sent_invoice().await;
        let token = invoice["public_token"].as_str().unwrap();

        let response = app.server.get(&format!("/public/invoices/{}", token)).await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["status"], "VIEWED");
        assert_eq!(body["organization_name"], "Acme Corp");
        assert_eq!(body["amount_due"], "$50.00");
        assert_eq!(body["line_items"][0]["quantity"], "2");

        let id = invoice["id"].as_str().unwrap();
        let stored = app.get(&format!("/invoices/{}", id)).await.json::<Value>();
        assert!(stored["viewed_at"].is_string());
    }

    #[tokio::test]
    async fn test_draft_link_is_not_found() {
        let app = TestApp::new().await;
        let id = app.create_invoice().await;
        let draft = app.get(&format!("/invoices/{}", id)).await.json::<Value>();
        let token = draft["public_token"].as_str().unwrap();

        app.server
            .get(&format!("/i/{}", token))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let app = TestApp::new().await;
        app.server
            .get("/public/invoices/0000deadbeef")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

// ============================================================================
// Automation scheduling
// ============================================================================

mod schedule_tests {
    use super::*;

    #[tokio::test]
    async fn test_schedule_without_policies_enqueues_nothing() {
        let app = TestApp::new().await;
        let invoice = app.sent_invoice().await;
        let id = invoice["id"].as_str().unwrap();

        let body = app
            .post(&format!("/invoices/{}/automation/schedule", id))
            .await
            .json::<Value>();
        assert_eq!(body["reminders"], 0);
        assert_eq!(body["late_fees"], 0);
        assert!(app.ports.queue.records().await.is_empty());
    }
}
