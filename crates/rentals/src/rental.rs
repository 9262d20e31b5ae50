use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use videostore_core::{
    CustomerId, DomainError, DomainResult, MovieId, Record, RentalId, ValidationErrors,
    ViolationKind,
};

/// Rental lifecycle derived from the `returned` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    /// Copy is checked out (`returned = false`). Initial state.
    Outstanding,
    /// Copy is back on the shelf (`returned = true`). Terminal.
    Returned,
}

/// One checked-out copy of a movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub movie_id: MovieId,
    pub customer_id: CustomerId,
    pub checkout_date: NaiveDate,
    pub due_date: NaiveDate,
    pub returned: bool,
    pub returned_on: Option<NaiveDate>,
    pub version: u64,
}

impl Rental {
    pub fn status(&self) -> RentalStatus {
        if self.returned {
            RentalStatus::Returned
        } else {
            RentalStatus::Outstanding
        }
    }

    pub fn is_outstanding(&self) -> bool {
        !self.returned
    }

    /// Outstanding and past its due date as of `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_outstanding() && today > self.due_date
    }

    /// `Outstanding → Returned`. Returns the updated record for the caller to persist.
    ///
    /// The transition is one-way: checking in an already returned rental is a conflict.
    pub fn check_in(&self, returned_on: NaiveDate) -> DomainResult<Rental> {
        if self.returned {
            return Err(DomainError::conflict(format!(
                "rental {} was already returned",
                self.id
            )));
        }
        if returned_on < self.checkout_date {
            return Err(DomainError::validation("returned_on", ViolationKind::Invalid));
        }

        let mut next = self.clone();
        next.returned = true;
        next.returned_on = Some(returned_on);
        Ok(next)
    }
}

impl Record for Rental {
    type Id = RentalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Checkout request: creates an outstanding rental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOut {
    pub movie_id: MovieId,
    pub customer_id: CustomerId,
    pub checkout_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl CheckOut {
    /// Field checks that need no stored state. Existence of the referenced
    /// movie and customer is checked by the caller against the store.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.due_date < self.checkout_date {
            errors.add("due_date", ViolationKind::Invalid);
        }
        errors
    }

    pub fn into_rental(self, id: RentalId) -> DomainResult<Rental> {
        self.validate().into_result()?;
        Ok(Rental {
            id,
            movie_id: self.movie_id,
            customer_id: self.customer_id,
            checkout_date: self.checkout_date,
            due_date: self.due_date,
            returned: false,
            returned_on: None,
            version: 1,
        })
    }
}
