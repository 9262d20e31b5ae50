//! Rental desk: application-level orchestration over a store.
//!
//! Every write follows the same pipeline:
//!
//! ```text
//! input
//!   ↓
//! 1. Field validation (pure, collects every violation)
//!   ↓
//! 2. Checks against committed state (external_id uniqueness, references exist)
//!   ↓
//! 3. Store write (constraints enforced again by the store, versions bumped)
//! ```
//!
//! The pre-flight uniqueness lookup in step 2 only produces a friendlier report.
//! The store's unique index stays authoritative: a unique violation surfacing
//! from step 3 is translated into the same `external_id` validation failure.
//!
//! Reads never cache. `available_inventory` recounts outstanding rentals on
//! every call, so a value read before a checkout or return is stale afterwards.

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::instrument;

use videostore_catalog::{Movie, MovieChanges, NewMovie};
use videostore_core::{
    CustomerId, DomainError, ExpectedVersion, MovieId, RentalId, ValidationErrors, Violation,
    ViolationKind,
};
use videostore_customers::{Customer, NewCustomer};
use videostore_rentals::{Availability, CheckOut, Rental};

use crate::repository::{Store, StoreError};

#[derive(Debug, Error)]
pub enum DeskError {
    /// Deterministic business failure (validation, not found, conflict).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Store failure that has no domain meaning (unreachable backend, failed query).
    #[error(transparent)]
    Store(StoreError),
}

impl DeskError {
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            DeskError::Domain(e) => e.validation_errors(),
            DeskError::Store(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DeskError::Domain(DomainError::NotFound))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DeskError::Domain(DomainError::Conflict(_)))
    }
}

impl From<StoreError> for DeskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { field } => {
                DeskError::Domain(DomainError::validation(field, ViolationKind::Taken))
            }
            StoreError::Concurrency(msg) | StoreError::ForeignKeyViolation(msg) => {
                DeskError::Domain(DomainError::conflict(msg))
            }
            StoreError::NotFound(_) => DeskError::Domain(DomainError::not_found()),
            other => DeskError::Store(other),
        }
    }
}

impl From<ValidationErrors> for DeskError {
    fn from(errors: ValidationErrors) -> Self {
        DeskError::Domain(DomainError::Validation(errors))
    }
}

pub type DeskResult<T> = Result<T, DeskError>;

fn must_exist() -> Violation {
    Violation::with_message(ViolationKind::Invalid, "must exist")
}

/// Movie, customer and rental operations over any [`Store`].
#[derive(Debug, Clone)]
pub struct RentalDesk<S> {
    store: S,
}

impl<S> RentalDesk<S>
where
    S: Store,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Movies ─────────────────────────────────────────────

    /// Add a movie to the catalog.
    ///
    /// Fails with a validation error keyed on `external_id` when it is missing
    /// or already used by another movie.
    #[instrument(skip(self, new), fields(external_id = ?new.external_id), err)]
    pub async fn register_movie(&self, new: NewMovie) -> DeskResult<Movie> {
        let mut errors = new.validate();
        if let Some(external_id) = new.external_id
            && self.store.find_movie_by_external_id(external_id).await?.is_some()
        {
            errors.add("external_id", ViolationKind::Taken);
        }
        if !errors.is_empty() {
            tracing::debug!(%errors, "movie rejected");
            return Err(errors.into());
        }

        let movie = new.into_movie(MovieId::new())?;
        let movie = self.store.insert_movie(movie).await?;
        tracing::info!(movie_id = %movie.id, inventory = movie.inventory, "movie registered");
        Ok(movie)
    }

    pub async fn movie(&self, id: MovieId) -> DeskResult<Movie> {
        self.store
            .get_movie(id)
            .await?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub async fn movies(&self) -> DeskResult<Vec<Movie>> {
        Ok(self.store.list_movies().await?)
    }

    /// Admin edit of metadata or inventory.
    #[instrument(skip(self, changes), fields(movie_id = %id, expected = ?expected), err)]
    pub async fn update_movie(
        &self,
        id: MovieId,
        changes: MovieChanges,
        expected: ExpectedVersion,
    ) -> DeskResult<Movie> {
        let current = self.movie(id).await?;
        expected.check(current.version)?;
        if changes.is_empty() {
            return Ok(current);
        }

        let candidate = current.with_changes(&changes);
        let mut errors = candidate.validate();
        if candidate.external_id != current.external_id
            && let Some(other) = self
                .store
                .find_movie_by_external_id(candidate.external_id)
                .await?
            && other.id != id
        {
            errors.add("external_id", ViolationKind::Taken);
        }
        if !errors.is_empty() {
            tracing::debug!(%errors, "movie edit rejected");
            return Err(errors.into());
        }

        Ok(self
            .store
            .update_movie(candidate, ExpectedVersion::Exact(current.version))
            .await?)
    }

    /// Remove a movie and its returned rentals. Refused while any copy is
    /// still checked out.
    #[instrument(skip(self), err)]
    pub async fn remove_movie(&self, id: MovieId) -> DeskResult<()> {
        self.movie(id).await?;
        let outstanding = self.store.count_outstanding(id).await?;
        if outstanding > 0 {
            return Err(DomainError::conflict(format!(
                "movie {id} has {outstanding} outstanding rental(s)"
            ))
            .into());
        }
        self.store.delete_movie(id).await?;
        Ok(())
    }

    // ── Customers ──────────────────────────────────────────

    #[instrument(skip(self, new), err)]
    pub async fn register_customer(&self, new: NewCustomer) -> DeskResult<Customer> {
        let customer = new.into_customer(CustomerId::new(), Utc::now())?;
        Ok(self.store.insert_customer(customer).await?)
    }

    pub async fn customer(&self, id: CustomerId) -> DeskResult<Customer> {
        self.store
            .get_customer(id)
            .await?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub async fn customers(&self) -> DeskResult<Vec<Customer>> {
        Ok(self.store.list_customers().await?)
    }

    // ── Rentals ────────────────────────────────────────────

    /// Check a copy out to a customer, creating an outstanding rental.
    ///
    /// Overbooking is not prevented: a checkout beyond the owned copies is
    /// recorded and logged.
    #[instrument(skip(self, cmd), fields(movie_id = %cmd.movie_id, customer_id = %cmd.customer_id), err)]
    pub async fn check_out(&self, cmd: CheckOut) -> DeskResult<Rental> {
        let mut errors = cmd.validate();
        if self.store.get_movie(cmd.movie_id).await?.is_none() {
            errors.push("movie", must_exist());
        }
        if self.store.get_customer(cmd.customer_id).await?.is_none() {
            errors.push("customer", must_exist());
        }
        if !errors.is_empty() {
            tracing::debug!(%errors, "checkout rejected");
            return Err(errors.into());
        }

        let rental = self
            .store
            .insert_rental(cmd.into_rental(RentalId::new())?)
            .await?;

        // The rental is committed; a failed re-read only loses the warning.
        match self.availability(rental.movie_id).await {
            Ok(availability) if availability.is_overbooked() => {
                tracing::warn!(
                    movie_id = %rental.movie_id,
                    inventory = availability.inventory,
                    outstanding = availability.outstanding,
                    "movie is overbooked"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(
                    rental_id = %rental.id,
                    error = %err,
                    "availability check after checkout failed"
                );
            }
        }
        Ok(rental)
    }

    /// Mark a rental returned (`Outstanding → Returned`).
    #[instrument(skip(self), err)]
    pub async fn check_in(&self, rental_id: RentalId, returned_on: NaiveDate) -> DeskResult<Rental> {
        let rental = self.rental(rental_id).await?;
        let returned = rental.check_in(returned_on)?;
        Ok(self
            .store
            .update_rental(returned, ExpectedVersion::Exact(rental.version))
            .await?)
    }

    pub async fn rental(&self, id: RentalId) -> DeskResult<Rental> {
        self.store
            .get_rental(id)
            .await?
            .ok_or_else(|| DomainError::not_found().into())
    }

    // ── Availability & associations ────────────────────────

    /// Copies currently on the shelf: `inventory - outstanding rentals`.
    pub async fn available_inventory(&self, movie_id: MovieId) -> DeskResult<i64> {
        Ok(self.availability(movie_id).await?.available)
    }

    /// Availability with its inputs, read from committed state.
    pub async fn availability(&self, movie_id: MovieId) -> DeskResult<Availability> {
        let movie = self.movie(movie_id).await?;
        let outstanding = self.store.count_outstanding(movie_id).await?;
        Ok(Availability::for_movie(&movie, outstanding))
    }

    pub async fn movie_rentals(&self, movie_id: MovieId) -> DeskResult<Vec<Rental>> {
        self.movie(movie_id).await?;
        Ok(self.store.rentals_for_movie(movie_id).await?)
    }

    pub async fn movie_customers(&self, movie_id: MovieId) -> DeskResult<Vec<Customer>> {
        self.movie(movie_id).await?;
        Ok(self.store.customers_for_movie(movie_id).await?)
    }

    pub async fn customer_rentals(&self, customer_id: CustomerId) -> DeskResult<Vec<Rental>> {
        self.customer(customer_id).await?;
        Ok(self.store.rentals_for_customer(customer_id).await?)
    }

    /// Outstanding rentals past their due date as of `today`.
    pub async fn overdue_rentals(&self, today: NaiveDate) -> DeskResult<Vec<Rental>> {
        let outstanding = self.store.list_outstanding().await?;
        Ok(outstanding
            .into_iter()
            .filter(|r| r.is_overdue(today))
            .collect())
    }
}
