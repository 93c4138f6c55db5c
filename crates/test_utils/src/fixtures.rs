//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common billing entities. These
//! fixtures are consistent and predictable; use [`RandomFixtures`] when a
//! test needs distinct tenants or customers.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use once_cell::sync::Lazy;

use core_kernel::{CustomerId, FixedClock, OrganizationId, Timezone};
use domain_billing::{Customer, Organization};

static NEW_YORK: Lazy<Timezone> = Lazy::new(|| Timezone::new(chrono_tz::America::New_York));
static BERLIN: Lazy<Timezone> = Lazy::new(|| Timezone::new(chrono_tz::Europe::Berlin));

/// Fixture for organization timezones
pub struct TimezoneFixtures;

impl TimezoneFixtures {
    /// America/New_York (observes DST)
    pub fn new_york() -> Timezone {
        *NEW_YORK
    }

    /// Europe/Berlin (observes DST)
    pub fn berlin() -> Timezone {
        *BERLIN
    }

    pub fn utc() -> Timezone {
        Timezone::new(chrono_tz::UTC)
    }
}

/// Fixture for calendar dates and instants
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Standard issue date (Mar 1, 2026)
    pub fn issue_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    /// Standard due date (Mar 31, 2026), 30 days after the issue date
    pub fn due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()
    }

    /// Mid-morning UTC on the issue date
    pub fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap()
    }

    /// Well past the standard due date in every fixture timezone
    pub fn after_due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 10, 15, 0, 0).unwrap()
    }

    /// A clock frozen at [`TemporalFixtures::issued_at`]
    pub fn clock_at_issue() -> FixedClock {
        FixedClock::new(Self::issued_at())
    }

    /// A clock frozen at [`TemporalFixtures::after_due`]
    pub fn clock_after_due() -> FixedClock {
        FixedClock::new(Self::after_due())
    }
}

/// Fixture for organizations
pub struct OrganizationFixtures;

impl OrganizationFixtures {
    /// Acme Corp, billing out of New York
    pub fn acme() -> Organization {
        Organization {
            id: OrganizationId::new(),
            name: "Acme Corp".to_string(),
            timezone: TimezoneFixtures::new_york(),
            billing_email: Some("billing@acme.test".to_string()),
        }
    }

    /// Globex GmbH, billing out of Berlin
    pub fn globex() -> Organization {
        Organization {
            id: OrganizationId::new(),
            name: "Globex GmbH".to_string(),
            timezone: TimezoneFixtures::berlin(),
            billing_email: None,
        }
    }
}

/// Fixture for customers
pub struct CustomerFixtures;

impl CustomerFixtures {
    /// A buyer with a contact email
    pub fn with_email(organization_id: OrganizationId) -> Customer {
        Customer {
            id: CustomerId::new(),
            organization_id,
            name: "Initech".to_string(),
            email: Some("ap@initech.test".to_string()),
        }
    }

    /// A buyer without any contact email
    pub fn without_email(organization_id: OrganizationId) -> Customer {
        Customer {
            email: None,
            ..Self::with_email(organization_id)
        }
    }

    /// A buyer whose email is only whitespace
    pub fn blank_email(organization_id: OrganizationId) -> Customer {
        Customer {
            email: Some("   ".to_string()),
            ..Self::with_email(organization_id)
        }
    }
}

/// Randomized tenants and buyers built with `fake`
pub struct RandomFixtures;

impl RandomFixtures {
    pub fn organization(timezone: Timezone) -> Organization {
        Organization {
            id: OrganizationId::new(),
            name: CompanyName().fake(),
            timezone,
            billing_email: Some(SafeEmail().fake()),
        }
    }

    pub fn customer(organization_id: OrganizationId) -> Customer {
        Customer {
            id: CustomerId::new(),
            organization_id,
            name: CompanyName().fake(),
            email: Some(SafeEmail().fake()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_date_is_thirty_days_after_issue() {
        let terms = TemporalFixtures::due_date() - TemporalFixtures::issue_date();
        assert_eq!(terms.num_days(), 30);
    }

    #[test]
    fn test_customer_contact_email() {
        let org = OrganizationFixtures::acme();
        assert_eq!(
            CustomerFixtures::with_email(org.id).contact_email(),
            Some("ap@initech.test")
        );
        assert_eq!(CustomerFixtures::without_email(org.id).contact_email(), None);
        assert_eq!(CustomerFixtures::blank_email(org.id).contact_email(), None);
    }

    #[test]
    fn test_random_customer_has_email() {
        let org = RandomFixtures::organization(TimezoneFixtures::utc());
        let customer = RandomFixtures::customer(org.id);
        assert!(customer.contact_email().is_some());
        assert_eq!(customer.organization_id, org.id);
    }
}
