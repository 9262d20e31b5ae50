//! Persistence boundary for movies, customers and rentals.
//!
//! The traits make no storage assumptions: `InMemoryStore` backs tests/dev and
//! `PostgresStore` backs production. Both enforce the same constraints:
//!
//! - `movies.external_id` is unique (`StoreError::UniqueViolation`)
//! - rentals reference existing movies and customers (`StoreError::ForeignKeyViolation`)
//! - updates carry an `ExpectedVersion` and bump the stored version by one
//!
//! Every read returns committed state at call time. Nothing here caches.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use videostore_catalog::Movie;
use videostore_core::{CustomerId, ExpectedVersion, MovieId, RentalId};
use videostore_customers::Customer;
use videostore_rentals::Rental;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation error.
///
/// Constraint errors (`UniqueViolation`, `ForeignKeyViolation`, `Concurrency`)
/// are deterministic. `Backend` covers an unreachable store or a failed query
/// and must be propagated to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {field}")]
    UniqueViolation { field: &'static str },

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait MovieRepository: Send + Sync {
    /// Insert a new movie. Fails with `UniqueViolation { field: "external_id" }` on a duplicate.
    async fn insert_movie(&self, movie: Movie) -> StoreResult<Movie>;

    async fn get_movie(&self, id: MovieId) -> StoreResult<Option<Movie>>;

    async fn find_movie_by_external_id(&self, external_id: i64) -> StoreResult<Option<Movie>>;

    async fn list_movies(&self) -> StoreResult<Vec<Movie>>;

    /// Replace a stored movie, returning it with its bumped version.
    async fn update_movie(&self, movie: Movie, expected: ExpectedVersion) -> StoreResult<Movie>;

    /// Delete a movie together with its returned rentals, in one write.
    /// Refused with `ForeignKeyViolation` while any of its rentals is outstanding.
    async fn delete_movie(&self, id: MovieId) -> StoreResult<()>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn insert_customer(&self, customer: Customer) -> StoreResult<Customer>;

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>>;

    async fn list_customers(&self) -> StoreResult<Vec<Customer>>;
}

#[async_trait]
pub trait RentalRepository: Send + Sync {
    async fn insert_rental(&self, rental: Rental) -> StoreResult<Rental>;

    async fn get_rental(&self, id: RentalId) -> StoreResult<Option<Rental>>;

    async fn update_rental(&self, rental: Rental, expected: ExpectedVersion) -> StoreResult<Rental>;

    /// All rentals (outstanding and returned) for a movie, oldest checkout first.
    async fn rentals_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Rental>>;

    async fn rentals_for_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Rental>>;

    /// Distinct customers that have rented a movie.
    async fn customers_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Customer>>;

    /// Count of rentals for a movie with `returned = false`.
    async fn count_outstanding(&self, movie_id: MovieId) -> StoreResult<u64>;

    async fn list_outstanding(&self) -> StoreResult<Vec<Rental>>;

    /// Remove every rental. Returns the number removed.
    async fn clear_rentals(&self) -> StoreResult<u64>;
}

/// Everything a `RentalDesk` needs, usable as `Arc<dyn Store>`.
pub trait Store: MovieRepository + CustomerRepository + RentalRepository {}

impl<S> Store for S where S: MovieRepository + CustomerRepository + RentalRepository + ?Sized {}

#[async_trait]
impl<S> MovieRepository for Arc<S>
where
    S: MovieRepository + ?Sized,
{
    async fn insert_movie(&self, movie: Movie) -> StoreResult<Movie> {
        (**self).insert_movie(movie).await
    }

    async fn get_movie(&self, id: MovieId) -> StoreResult<Option<Movie>> {
        (**self).get_movie(id).await
    }

    async fn find_movie_by_external_id(&self, external_id: i64) -> StoreResult<Option<Movie>> {
        (**self).find_movie_by_external_id(external_id).await
    }

    async fn list_movies(&self) -> StoreResult<Vec<Movie>> {
        (**self).list_movies().await
    }

    async fn update_movie(&self, movie: Movie, expected: ExpectedVersion) -> StoreResult<Movie> {
        (**self).update_movie(movie, expected).await
    }

    async fn delete_movie(&self, id: MovieId) -> StoreResult<()> {
        (**self).delete_movie(id).await
    }
}

#[async_trait]
impl<S> CustomerRepository for Arc<S>
where
    S: CustomerRepository + ?Sized,
{
    async fn insert_customer(&self, customer: Customer) -> StoreResult<Customer> {
        (**self).insert_customer(customer).await
    }

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        (**self).get_customer(id).await
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        (**self).list_customers().await
    }
}

#[async_trait]
impl<S> RentalRepository for Arc<S>
where
    S: RentalRepository + ?Sized,
{
    async fn insert_rental(&self, rental: Rental) -> StoreResult<Rental> {
        (**self).insert_rental(rental).await
    }

    async fn get_rental(&self, id: RentalId) -> StoreResult<Option<Rental>> {
        (**self).get_rental(id).await
    }

    async fn update_rental(&self, rental: Rental, expected: ExpectedVersion) -> StoreResult<Rental> {
        (**self).update_rental(rental, expected).await
    }

    async fn rentals_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Rental>> {
        (**self).rentals_for_movie(movie_id).await
    }

    async fn rentals_for_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Rental>> {
        (**self).rentals_for_customer(customer_id).await
    }

    async fn customers_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Customer>> {
        (**self).customers_for_movie(movie_id).await
    }

    async fn count_outstanding(&self, movie_id: MovieId) -> StoreResult<u64> {
        (**self).count_outstanding(movie_id).await
    }

    async fn list_outstanding(&self) -> StoreResult<Vec<Rental>> {
        (**self).list_outstanding().await
    }

    async fn clear_rentals(&self) -> StoreResult<u64> {
        (**self).clear_rentals().await
    }
}
