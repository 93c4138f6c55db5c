//! PostgreSQL adapter tests
//!
//! Each test starts its own PostgreSQL container, so they are ignored by
//! default. Run them with `cargo test -p infra_db -- --ignored` on a host
//! with Docker.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

use core_kernel::{Clock, FixedClock, InvoiceId, OrganizationId};
use domain_automation::mock::{MockAuditLog, MockMailer};
use domain_automation::{
    ApplyLateFeePayload, AuditLog, AutomationWorker, BillingStore, JobQueue, JobSource,
    LateFeeOutcome, LateFeeWriteResult, NewInvoice, NewJob, SettlementWrite, LEASE_EXPIRED_ERROR,
};
use domain_billing::{
    AuditAction, AuditEntry, Customer, Discount, InvoiceStatus, LineItem, Organization,
    ReminderDelivery, ReminderTemplate, SkipReason,
};
use infra_db::{PostgresAuditLog, PostgresBillingStore, PostgresJobQueue};
use rust_decimal_macros::dec;
use test_utils::{
    create_isolated_test_database, CustomerFixtures, OrganizationFixtures, TemporalFixtures,
    TestDatabase, TestLateFeePolicyBuilder, TestReminderPolicyBuilder,
};

struct Seeded {
    db: TestDatabase,
    org: Organization,
    customer: Customer,
    store: PostgresBillingStore,
}

async fn seeded() -> Seeded {
    let db = create_isolated_test_database()
        .await
        .expect("Failed to create test database");
    let org = OrganizationFixtures::acme();
    let customer = CustomerFixtures::with_email(org.id);
    db.seed_tenant(&org, std::slice::from_ref(&customer))
        .await
        .expect("seed tenant");
    let store = PostgresBillingStore::new(db.pool().clone());
    Seeded {
        db,
        org,
        customer,
        store,
    }
}

fn new_invoice(org: &Organization, customer: &Customer, lines: Vec<LineItem>) -> NewInvoice {
    let id = InvoiceId::new();
    NewInvoice {
        id,
        organization_id: org.id,
        customer_id: customer.id,
        public_token: id.as_uuid().simple().to_string(),
        currency: core_kernel::Currency::USD,
        issue_date: TemporalFixtures::issue_date(),
        due_date: Some(TemporalFixtures::due_date()),
        payment_terms_days: 30,
        discount: None,
        tax_label: None,
        tax_percent: None,
        notes: None,
        line_items: lines
            .into_iter()
            .enumerate()
            .map(|(position, line)| line.with_position(position as i32))
            .collect(),
        created_at: TemporalFixtures::issued_at(),
    }
}

/// Creates an invoice and moves it to `SENT`
async fn sent_invoice(s: &Seeded, total_cents: i64) -> InvoiceId {
    let mut invoice = s
        .store
        .create_invoice(new_invoice(&s.org, &s.customer, vec![LineItem::new("Consulting", total_cents)]))
        .await
        .expect("create invoice");
    invoice.status = InvoiceStatus::Sent;
    invoice.sent_at = Some(TemporalFixtures::issued_at());
    let written = s
        .store
        .save_lifecycle(&invoice, InvoiceStatus::Draft)
        .await
        .expect("send invoice");
    assert!(written);
    invoice.id
}

// ============================================================================
// Billing store
// ============================================================================

mod billing_store_tests {
    use super::*;
    use core_kernel::HealthCheckable;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_invoice_numbers_are_sequential_per_organization() {
        let s = seeded().await;
        let other = OrganizationFixtures::globex();
        let other_customer = CustomerFixtures::with_email(other.id);
        s.db.seed_organization(&other).await.unwrap();
        s.db.seed_customer(&other_customer).await.unwrap();

        let first = s
            .store
            .create_invoice(new_invoice(&s.org, &s.customer, vec![LineItem::new("A", 100)]))
            .await
            .unwrap();
        let second = s
            .store
            .create_invoice(new_invoice(&s.org, &s.customer, vec![LineItem::new("B", 100)]))
            .await
            .unwrap();
        let foreign = s
            .store
            .create_invoice(new_invoice(&other, &other_customer, vec![LineItem::new("C", 100)]))
            .await
            .unwrap();

        assert_eq!(first.number, "INV-000001");
        assert_eq!(second.number, "INV-000002");
        assert_eq!(foreign.number, "INV-000001");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_concurrent_creates_never_share_a_number() {
        let s = seeded().await;
        let store = Arc::new(s.store.clone());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let new = new_invoice(&s.org, &s.customer, vec![LineItem::new("Seat", 1000)]);
            handles.push(tokio::spawn(async move { store.create_invoice(new).await }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().number);
        }
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 8);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_load_invoice_round_trips_lines_and_discounts() {
        let s = seeded().await;
        let mut new = new_invoice(
            &s.org,
            &s.customer,
            vec![
                LineItem::new("Design", 12_000)
                    .with_quantity(dec!(1.5))
                    .with_tax_percent(dec!(19)),
                LineItem::new("Hosting", 2_500).with_discount(Discount::fixed(500)),
            ],
        );
        new.discount = Some(Discount::percent(dec!(10)));
        new.tax_label = Some("VAT".to_string());
        new.tax_percent = Some(dec!(7.5));
        let created = s.store.create_invoice(new).await.unwrap();

        let aggregate = s.store.load_invoice(s.org.id, created.id).await.unwrap();

        assert_eq!(aggregate.invoice, created);
        assert_eq!(aggregate.organization.timezone, s.org.timezone);
        assert_eq!(aggregate.customer.email.as_deref(), Some("ap@initech.test"));
        assert!(aggregate.payments.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_load_invoice_is_scoped_to_organization() {
        let s = seeded().await;
        let invoice_id = sent_invoice(&s, 5000).await;

        let result = s.store.load_invoice(OrganizationId::new(), invoice_id).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_payments_and_credit_notes_reduce_amount_due() {
        let s = seeded().await;
        let invoice_id = sent_invoice(&s, 10_000).await;

        s.store
            .append_payment(&domain_billing::Payment::succeeded(invoice_id, 4_000))
            .await
            .unwrap();
        s.store
            .append_credit_note(&domain_billing::CreditNote::new(invoice_id, 1_000, "Goodwill"))
            .await
            .unwrap();

        let aggregate = s.store.load_invoice(s.org.id, invoice_id).await.unwrap();
        assert_eq!(aggregate.amount_due().due_cents, 5_000);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_lifecycle_write_skips_when_status_moved() {
        let s = seeded().await;
        let invoice_id = sent_invoice(&s, 5_000).await;

        let mut stale = s.store.load_invoice(s.org.id, invoice_id).await.unwrap().invoice;
        stale.status = InvoiceStatus::Overdue;
        assert!(!s.store.save_lifecycle(&stale, InvoiceStatus::Viewed).await.unwrap());

        let stored = s.store.load_invoice(s.org.id, invoice_id).await.unwrap().invoice;
        assert_eq!(stored.status, InvoiceStatus::Sent);

        let mut missing = stale.clone();
        missing.id = InvoiceId::new();
        let err = s.store.save_lifecycle(&missing, InvoiceStatus::Sent).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_settle_counts_late_fee_written_after_load() {
        let s = seeded().await;
        let invoice_id = sent_invoice(&s, 5_000).await;
        let policy = TestLateFeePolicyBuilder::new(s.org.id).build();
        s.store.create_late_fee_policy(&policy).await.unwrap();
        s.store
            .append_payment(&domain_billing::Payment::succeeded(invoice_id, 5_000))
            .await
            .unwrap();

        let before = s.store.load_invoice(s.org.id, invoice_id).await.unwrap();
        assert_eq!(before.amount_due().due_cents, 0);

        s.store
            .apply_late_fee(domain_automation::LateFeeWrite {
                organization_id: s.org.id,
                invoice_id,
                policy_id: policy.id,
                fee_cents: 500,
                line: LineItem::late_fee("Late fee", 500, 1),
                applied_at: TemporalFixtures::after_due(),
            })
            .await
            .unwrap();

        let result = s
            .store
            .settle_invoice(s.org.id, invoice_id, TemporalFixtures::after_due())
            .await
            .unwrap();
        assert_eq!(result, SettlementWrite::Outstanding { due_cents: 500 });
        let stored = s.store.load_invoice(s.org.id, invoice_id).await.unwrap().invoice;
        assert_eq!(stored.status, InvoiceStatus::Overdue);
        assert!(stored.paid_at.is_none());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_settle_marks_covered_invoice_paid_once() {
        let s = seeded().await;
        let invoice_id = sent_invoice(&s, 5_000).await;
        s.store
            .append_payment(&domain_billing::Payment::succeeded(invoice_id, 5_000))
            .await
            .unwrap();
        let at = TemporalFixtures::after_due();

        let first = s.store.settle_invoice(s.org.id, invoice_id, at).await.unwrap();
        let SettlementWrite::Settled(invoice) = first else {
            panic!("expected settlement, got {first:?}");
        };
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.paid_at, Some(at));

        let second = s.store.settle_invoice(s.org.id, invoice_id, at).await.unwrap();
        assert!(matches!(second, SettlementWrite::AlreadyPaid(_)));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_reminder_policy_round_trip_keeps_rule_order() {
        let s = seeded().await;
        let policy = TestReminderPolicyBuilder::new(s.org.id)
            .with_rule(-3, ReminderTemplate::Friendly)
            .with_rule(7, ReminderTemplate::Firm)
            .with_disabled_rule(14, ReminderTemplate::Firm)
            .build();
        s.store.create_reminder_policy(&policy).await.unwrap();

        let policies = s.store.reminder_policies(s.org.id).await.unwrap();
        assert_eq!(policies, vec![policy.clone()]);

        let rule = s
            .store
            .find_reminder_rule(s.org.id, policy.rules[1].id)
            .await
            .unwrap();
        assert_eq!(rule.map(|r| r.days_offset), Some(7));
        assert!(s
            .store
            .find_reminder_rule(OrganizationId::new(), policy.rules[1].id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_second_enabled_late_fee_policy_conflicts() {
        let s = seeded().await;
        s.store
            .create_late_fee_policy(&TestLateFeePolicyBuilder::new(s.org.id).build())
            .await
            .unwrap();

        let second = s
            .store
            .create_late_fee_policy(&TestLateFeePolicyBuilder::new(s.org.id).percent(dec!(2)).build())
            .await;
        assert!(second.unwrap_err().is_conflict());

        s.store
            .create_late_fee_policy(&TestLateFeePolicyBuilder::new(s.org.id).disabled().build())
            .await
            .unwrap();
        let enabled = s.store.enabled_late_fee_policy(s.org.id).await.unwrap();
        assert_eq!(enabled.map(|p| p.charge.type_str()), Some("FLAT"));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_reminder_delivery_claim_is_unique() {
        let s = seeded().await;
        let invoice_id = sent_invoice(&s, 5000).await;
        let policy = TestReminderPolicyBuilder::new(s.org.id).build();
        let delivery = ReminderDelivery {
            invoice_id,
            rule_id: policy.rules[0].id,
            due_date: TemporalFixtures::due_date(),
            claimed_at: TemporalFixtures::issued_at(),
        };

        assert!(s.store.claim_reminder_delivery(&delivery).await.unwrap());
        assert!(!s.store.claim_reminder_delivery(&delivery).await.unwrap());

        let moved = ReminderDelivery {
            due_date: TemporalFixtures::due_date() + ChronoDuration::days(14),
            ..delivery.clone()
        };
        assert!(s.store.claim_reminder_delivery(&moved).await.unwrap());

        s.store
            .release_reminder_delivery(delivery.invoice_id, delivery.rule_id, delivery.due_date)
            .await
            .unwrap();
        assert!(s.store.claim_reminder_delivery(&delivery).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_health_check_reports_healthy() {
        let s = seeded().await;
        let health = s.store.health_check().await;
        assert!(health.is_healthy());
        assert_eq!(health.adapter_id, "postgres-billing-store");
    }
}

// ============================================================================
// Late fees against the real transaction
// ============================================================================

mod late_fee_tests {
    use super::*;

    fn worker(s: &Seeded, clock: Arc<FixedClock>) -> AutomationWorker {
        AutomationWorker::new(
            Arc::new(s.store.clone()),
            Arc::new(MockMailer::new()),
            Arc::new(MockAuditLog::new()),
            clock,
            "https://billing.test",
        )
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_concurrent_late_fee_runs_apply_once() {
        let s = seeded().await;
        let invoice_id = sent_invoice(&s, 5000).await;
        let policy = TestLateFeePolicyBuilder::new(s.org.id).flat(500).build();
        s.store.create_late_fee_policy(&policy).await.unwrap();

        let worker = Arc::new(worker(&s, Arc::new(TemporalFixtures::clock_after_due())));
        let payload = ApplyLateFeePayload {
            organization_id: s.org.id,
            invoice_id,
            policy_id: policy.id,
        };

        let mut handles = Vec::new();
        for _ in 0..4 {
            let worker = worker.clone();
            handles.push(tokio::spawn(async move { worker.apply_late_fee(payload).await }));
        }
        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                LateFeeOutcome::Applied(_) => applied += 1,
                LateFeeOutcome::Skipped(reason) => assert_eq!(reason, SkipReason::AlreadyApplied),
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(s.db.row_count("late_fee_applications").await.unwrap(), 1);

        let aggregate = s.store.load_invoice(s.org.id, invoice_id).await.unwrap();
        assert_eq!(aggregate.invoice.status, InvoiceStatus::Overdue);
        assert_eq!(aggregate.invoice.line_items.len(), 2);
        assert_eq!(aggregate.amount_due().due_cents, 5500);

        let application = s
            .store
            .find_late_fee_application(invoice_id, policy.id)
            .await
            .unwrap()
            .expect("application row");
        assert_eq!(application.fee_cents, 500);
        assert_eq!(application.line_item_id, aggregate.invoice.line_items[1].id);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_late_fee_write_on_paid_invoice_reports_closed() {
        let s = seeded().await;
        let invoice_id = sent_invoice(&s, 5000).await;
        let policy = TestLateFeePolicyBuilder::new(s.org.id).build();
        s.store.create_late_fee_policy(&policy).await.unwrap();

        let mut invoice = s.store.load_invoice(s.org.id, invoice_id).await.unwrap().invoice;
        invoice.status = InvoiceStatus::Paid;
        invoice.paid_at = Some(TemporalFixtures::after_due());
        assert!(s.store.save_lifecycle(&invoice, InvoiceStatus::Sent).await.unwrap());

        let result = s
            .store
            .apply_late_fee(domain_automation::LateFeeWrite {
                organization_id: s.org.id,
                invoice_id,
                policy_id: policy.id,
                fee_cents: 500,
                line: LineItem::late_fee("Late fee", 500, 1),
                applied_at: TemporalFixtures::after_due(),
            })
            .await
            .unwrap();

        assert_eq!(result, LateFeeWriteResult::InvoiceClosed);
        let aggregate = s.store.load_invoice(s.org.id, invoice_id).await.unwrap();
        assert_eq!(aggregate.invoice.line_items.len(), 1);
    }
}

// ============================================================================
// Job queue
// ============================================================================

mod job_queue_tests {
    use super::*;

    fn reminder_job(delay: Duration) -> NewJob {
        NewJob {
            topic: "automation.send_reminder".to_string(),
            payload: serde_json::json!({ "invoice_id": InvoiceId::new() }),
            idempotency_key: "reminder:test".to_string(),
            delay,
            max_attempts: 3,
        }
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_jobs_become_due_after_their_delay() {
        let db = create_isolated_test_database().await.unwrap();
        let clock = Arc::new(TemporalFixtures::clock_at_issue());
        let queue = PostgresJobQueue::new(db.pool().clone(), clock.clone());

        queue.enqueue(reminder_job(Duration::from_secs(3600))).await.unwrap();
        assert!(queue.claim_due(10, Duration::from_secs(60)).await.unwrap().is_empty());

        clock.advance(ChronoDuration::hours(1));
        let jobs = queue.claim_due(10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].attempts, 1);
        assert_eq!(jobs[0].run_at, TemporalFixtures::issued_at() + ChronoDuration::hours(1));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_leased_job_is_invisible_until_lease_expires() {
        let db = create_isolated_test_database().await.unwrap();
        let clock = Arc::new(TemporalFixtures::clock_at_issue());
        let queue = PostgresJobQueue::new(db.pool().clone(), clock.clone());
        queue.enqueue(reminder_job(Duration::ZERO)).await.unwrap();

        assert_eq!(queue.claim_due(10, Duration::from_secs(60)).await.unwrap().len(), 1);
        assert!(queue.claim_due(10, Duration::from_secs(60)).await.unwrap().is_empty());

        clock.advance(ChronoDuration::seconds(61));
        let reclaimed = queue.claim_due(10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempts, 2);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_expired_final_lease_is_dead_lettered() {
        let db = create_isolated_test_database().await.unwrap();
        let clock = Arc::new(TemporalFixtures::clock_at_issue());
        let queue = PostgresJobQueue::new(db.pool().clone(), clock.clone());
        let job_id = queue.enqueue(reminder_job(Duration::ZERO)).await.unwrap();

        let mut attempts = Vec::new();
        for _ in 0..5 {
            attempts.extend(
                queue
                    .claim_due(10, Duration::from_secs(60))
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|job| job.attempts),
            );
            clock.advance(ChronoDuration::seconds(61));
        }
        assert_eq!(attempts, vec![1, 2, 3]);

        let record = queue.job_record(job_id).await.unwrap().unwrap();
        assert_eq!(record.status, "FAILED");
        assert_eq!(record.attempts, 3);
        assert_eq!(record.last_error.as_deref(), Some(LEASE_EXPIRED_ERROR));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_retry_and_dead_letter_update_status() {
        let db = create_isolated_test_database().await.unwrap();
        let clock = Arc::new(TemporalFixtures::clock_at_issue());
        let queue = PostgresJobQueue::new(db.pool().clone(), clock.clone());
        let job_id = queue.enqueue(reminder_job(Duration::ZERO)).await.unwrap();

        queue.claim_due(1, Duration::from_secs(60)).await.unwrap();
        let retry_at = clock.now() + ChronoDuration::seconds(30);
        queue.retry(job_id, "smtp timeout", retry_at).await.unwrap();

        let record = queue.job_record(job_id).await.unwrap().unwrap();
        assert_eq!(record.status, "PENDING");
        assert_eq!(record.run_at, retry_at);
        assert_eq!(record.last_error.as_deref(), Some("smtp timeout"));

        clock.advance(ChronoDuration::seconds(30));
        queue.claim_due(1, Duration::from_secs(60)).await.unwrap();
        queue.dead_letter(job_id, "gave up").await.unwrap();

        let record = queue.job_record(job_id).await.unwrap().unwrap();
        assert_eq!(record.status, "FAILED");
        assert_eq!(record.attempts, 2);
        assert!(queue.claim_due(1, Duration::from_secs(60)).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_completed_job_is_not_redelivered() {
        let db = create_isolated_test_database().await.unwrap();
        let clock = Arc::new(TemporalFixtures::clock_at_issue());
        let queue = PostgresJobQueue::new(db.pool().clone(), clock.clone());
        let job_id = queue.enqueue(reminder_job(Duration::ZERO)).await.unwrap();

        queue.claim_due(1, Duration::from_secs(60)).await.unwrap();
        queue.complete(job_id).await.unwrap();

        clock.advance(ChronoDuration::hours(1));
        assert!(queue.claim_due(1, Duration::from_secs(60)).await.unwrap().is_empty());
        assert!(queue.complete(core_kernel::JobId::new()).await.unwrap_err().is_not_found());
    }
}

// ============================================================================
// Audit log
// ============================================================================

mod audit_log_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_records_entries_in_order() {
        let s = seeded().await;
        let audit = PostgresAuditLog::new(s.db.pool().clone());
        let invoice_id = InvoiceId::new();

        audit
            .record(
                AuditEntry::new(s.org.id, None, AuditAction::InvoiceSent, "invoice", invoice_id)
                    .at(TemporalFixtures::issued_at()),
            )
            .await
            .unwrap();
        audit
            .record(
                AuditEntry::new(s.org.id, None, AuditAction::ReminderSent, "invoice", invoice_id)
                    .with_data(serde_json::json!({ "days_offset": -3 }))
                    .at(TemporalFixtures::after_due()),
            )
            .await
            .unwrap();

        let rows = audit
            .entries_for(s.org.id, "invoice", &invoice_id.to_string())
            .await
            .unwrap();
        let actions: Vec<&str> = rows.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(actions, vec!["invoice.sent", "reminder.sent"]);
        assert_eq!(rows[1].data, Some(serde_json::json!({ "days_offset": -3 })));
        assert!(rows.iter().all(|r| r.actor_id.is_none()));
    }
}
