use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use videostore_catalog::Movie;
use videostore_core::{CustomerId, ExpectedVersion, MovieId, RentalId};
use videostore_customers::Customer;
use videostore_rentals::Rental;

use crate::repository::{
    CustomerRepository, MovieRepository, RentalRepository, StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct Tables {
    movies: HashMap<MovieId, Movie>,
    /// Unique index: external_id → movie.
    movies_by_external_id: HashMap<i64, MovieId>,
    customers: HashMap<CustomerId, Customer>,
    rentals: HashMap<RentalId, Rental>,
}

/// In-memory store.
///
/// Intended for tests/dev. Enforces the same constraints as the Postgres schema
/// (unique external_id, rental foreign keys, optimistic versions).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn check_version(expected: ExpectedVersion, actual: u64) -> StoreResult<()> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Concurrency(format!(
            "expected {expected:?}, found {actual}"
        )))
    }
}

fn sorted_rentals<'a>(rentals: impl Iterator<Item = &'a Rental>) -> Vec<Rental> {
    let mut out: Vec<Rental> = rentals.cloned().collect();
    out.sort_by_key(|r| (r.checkout_date, r.id));
    out
}

#[async_trait]
impl MovieRepository for InMemoryStore {
    async fn insert_movie(&self, mut movie: Movie) -> StoreResult<Movie> {
        let mut tables = self.write()?;
        if tables.movies.contains_key(&movie.id) {
            return Err(StoreError::AlreadyExists(format!("movie {}", movie.id)));
        }
        if tables.movies_by_external_id.contains_key(&movie.external_id) {
            return Err(StoreError::UniqueViolation { field: "external_id" });
        }

        movie.version = 1;
        tables.movies_by_external_id.insert(movie.external_id, movie.id);
        tables.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn get_movie(&self, id: MovieId) -> StoreResult<Option<Movie>> {
        Ok(self.read()?.movies.get(&id).cloned())
    }

    async fn find_movie_by_external_id(&self, external_id: i64) -> StoreResult<Option<Movie>> {
        let tables = self.read()?;
        Ok(tables
            .movies_by_external_id
            .get(&external_id)
            .and_then(|id| tables.movies.get(id))
            .cloned())
    }

    async fn list_movies(&self) -> StoreResult<Vec<Movie>> {
        let mut movies: Vec<Movie> = self.read()?.movies.values().cloned().collect();
        movies.sort_by_key(|m| m.id);
        Ok(movies)
    }

    async fn update_movie(&self, mut movie: Movie, expected: ExpectedVersion) -> StoreResult<Movie> {
        let mut tables = self.write()?;
        let (current_version, current_external_id) = match tables.movies.get(&movie.id) {
            Some(current) => (current.version, current.external_id),
            None => return Err(StoreError::NotFound(format!("movie {}", movie.id))),
        };
        check_version(expected, current_version)?;

        if movie.external_id != current_external_id {
            if tables.movies_by_external_id.contains_key(&movie.external_id) {
                return Err(StoreError::UniqueViolation { field: "external_id" });
            }
            tables.movies_by_external_id.remove(&current_external_id);
            tables.movies_by_external_id.insert(movie.external_id, movie.id);
        }

        movie.version = current_version + 1;
        tables.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn delete_movie(&self, id: MovieId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.movies.contains_key(&id) {
            return Err(StoreError::NotFound(format!("movie {id}")));
        }
        if tables
            .rentals
            .values()
            .any(|r| r.movie_id == id && r.is_outstanding())
        {
            return Err(StoreError::ForeignKeyViolation(format!(
                "movie {id} is referenced by outstanding rentals"
            )));
        }

        tables.rentals.retain(|_, r| r.movie_id != id);
        if let Some(movie) = tables.movies.remove(&id) {
            tables.movies_by_external_id.remove(&movie.external_id);
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for InMemoryStore {
    async fn insert_customer(&self, mut customer: Customer) -> StoreResult<Customer> {
        let mut tables = self.write()?;
        if tables.customers.contains_key(&customer.id) {
            return Err(StoreError::AlreadyExists(format!("customer {}", customer.id)));
        }
        customer.version = 1;
        tables.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        Ok(self.read()?.customers.get(&id).cloned())
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let mut customers: Vec<Customer> = self.read()?.customers.values().cloned().collect();
        customers.sort_by_key(|c| c.id);
        Ok(customers)
    }
}

#[async_trait]
impl RentalRepository for InMemoryStore {
    async fn insert_rental(&self, mut rental: Rental) -> StoreResult<Rental> {
        let mut tables = self.write()?;
        if tables.rentals.contains_key(&rental.id) {
            return Err(StoreError::AlreadyExists(format!("rental {}", rental.id)));
        }
        if !tables.movies.contains_key(&rental.movie_id) {
            return Err(StoreError::ForeignKeyViolation(format!(
                "movie {} does not exist",
                rental.movie_id
            )));
        }
        if !tables.customers.contains_key(&rental.customer_id) {
            return Err(StoreError::ForeignKeyViolation(format!(
                "customer {} does not exist",
                rental.customer_id
            )));
        }

        rental.version = 1;
        tables.rentals.insert(rental.id, rental.clone());
        Ok(rental)
    }

    async fn get_rental(&self, id: RentalId) -> StoreResult<Option<Rental>> {
        Ok(self.read()?.rentals.get(&id).cloned())
    }

    async fn update_rental(&self, mut rental: Rental, expected: ExpectedVersion) -> StoreResult<Rental> {
        let mut tables = self.write()?;
        let current = tables
            .rentals
            .get(&rental.id)
            .ok_or_else(|| StoreError::NotFound(format!("rental {}", rental.id)))?;
        check_version(expected, current.version)?;

        if current.movie_id != rental.movie_id || current.customer_id != rental.customer_id {
            return Err(StoreError::ForeignKeyViolation(
                "rental references cannot be reassigned".to_string(),
            ));
        }

        rental.version = current.version + 1;
        tables.rentals.insert(rental.id, rental.clone());
        Ok(rental)
    }

    async fn rentals_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Rental>> {
        let tables = self.read()?;
        Ok(sorted_rentals(
            tables.rentals.values().filter(|r| r.movie_id == movie_id),
        ))
    }

    async fn rentals_for_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Rental>> {
        let tables = self.read()?;
        Ok(sorted_rentals(
            tables.rentals.values().filter(|r| r.customer_id == customer_id),
        ))
    }

    async fn customers_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Customer>> {
        let tables = self.read()?;
        let mut ids: Vec<CustomerId> = tables
            .rentals
            .values()
            .filter(|r| r.movie_id == movie_id)
            .map(|r| r.customer_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| tables.customers.get(id).cloned())
            .collect())
    }

    async fn count_outstanding(&self, movie_id: MovieId) -> StoreResult<u64> {
        let tables = self.read()?;
        Ok(videostore_rentals::count_outstanding(
            tables.rentals.values(),
            movie_id,
        ))
    }

    async fn list_outstanding(&self) -> StoreResult<Vec<Rental>> {
        let tables = self.read()?;
        Ok(sorted_rentals(
            tables.rentals.values().filter(|r| r.is_outstanding()),
        ))
    }

    async fn clear_rentals(&self) -> StoreResult<u64> {
        let mut tables = self.write()?;
        let removed = tables.rentals.len() as u64;
        tables.rentals.clear();
        Ok(removed)
    }
}
