use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use videostore_core::{CustomerId, DomainResult, Record, ValidationErrors, ViolationKind};

/// Contact information for a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A registered rental customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub contact: ContactInfo,
    pub registered_at: DateTime<Utc>,
    pub version: u64,
}

impl Record for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Input for registering a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
}

impl NewCustomer {
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", ViolationKind::Blank);
        }
        if let Some(phone) = &self.contact.phone
            && phone.trim().is_empty()
        {
            errors.add("phone", ViolationKind::Invalid);
        }
        errors
    }

    pub fn into_customer(self, id: CustomerId, registered_at: DateTime<Utc>) -> DomainResult<Customer> {
        self.validate().into_result()?;
        Ok(Customer {
            id,
            name: self.name,
            contact: self.contact,
            registered_at,
            version: 1,
        })
    }
}
