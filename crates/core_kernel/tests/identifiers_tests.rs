//! Tests for strongly-typed identifiers

use core_kernel::{InvoiceId, OrganizationId, LateFeePolicyId, ReminderRuleId, JobId};
use uuid::Uuid;

#[test]
fn test_prefixes() {
    assert!(InvoiceId::new().to_string().starts_with("INV-"));
    assert!(OrganizationId::new().to_string().starts_with("ORG-"));
    assert!(LateFeePolicyId::new().to_string().starts_with("LFP-"));
    assert!(ReminderRuleId::new().to_string().starts_with("RMR-"));
    assert!(JobId::new().to_string().starts_with("JOB-"));
}

#[test]
fn test_display_parse_round_trip() {
    let id = InvoiceId::new_v7();
    let parsed: InvoiceId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn test_wrong_prefix_is_rejected() {
    let id = OrganizationId::new();
    let as_invoice = id.to_string().parse::<InvoiceId>();
    assert!(as_invoice.is_err());
}

#[test]
fn test_serde_is_bare_uuid() {
    let uuid = Uuid::new_v4();
    let id = InvoiceId::from_uuid(uuid);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", uuid));
}

#[test]
fn test_v7_ids_are_time_ordered() {
    let a = JobId::new_v7();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = JobId::new_v7();
    assert!(a < b);
}
