//! Strongly-typed identifiers for domain entities
//!
//! Newtype wrappers around UUIDs keep an invoice id from being passed where a
//! policy id is expected. The display form carries a short prefix
//! (`INV-<uuid>`), and parsing accepts either form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Tenancy
define_id!(OrganizationId, "ORG");
define_id!(CustomerId, "CUS");
define_id!(UserId, "USR");

// Invoicing
define_id!(InvoiceId, "INV");
define_id!(LineItemId, "LIN");
define_id!(PaymentId, "PAY");
define_id!(CreditNoteId, "CRN");

// Automation policies and their audit records
define_id!(ReminderPolicyId, "RMP");
define_id!(ReminderRuleId, "RMR");
define_id!(LateFeePolicyId, "LFP");
define_id!(LateFeeApplicationId, "LFA");
define_id!(ReminderLogId, "RML");

// Infrastructure
define_id!(JobId, "JOB");
define_id!(AuditEventId, "AUD");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_id_display() {
        let id = InvoiceId::new();
        let display = id.to_string();
        assert!(display.starts_with("INV-"));
    }

    #[test]
    fn test_id_parsing() {
        let original = InvoiceId::new();
        let parsed: InvoiceId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_parse_without_prefix() {
        let uuid = Uuid::new_v4();
        let parsed: LateFeePolicyId = uuid.to_string().parse().unwrap();
        assert_eq!(parsed.as_uuid(), &uuid);
    }

    #[test]
    fn test_uuid_conversion() {
        let uuid = Uuid::new_v4();
        let invoice_id = InvoiceId::from(uuid);
        let back: Uuid = invoice_id.into();
        assert_eq!(uuid, back);
    }
}
