//! Tenants and their customers

use serde::{Deserialize, Serialize};

use core_kernel::{CustomerId, OrganizationId, Timezone};

/// The unit of data isolation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    /// All automated outbound communication is anchored to this zone
    pub timezone: Timezone,
    /// Reply-to address for outbound mail
    pub billing_email: Option<String>,
}

/// The buyer on an invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub email: Option<String>,
}

impl Customer {
    /// The buyer's email, if it is non-blank
    pub fn contact_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}
