//! Postgres-backed store implementation.
//!
//! Constraints are enforced by the schema in `migrations/0001_init.sql`:
//! a unique index on `movies.external_id`, foreign keys from rentals to movies
//! and customers, and a `version` column bumped on every update.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` (`movies_external_id_key`) or `AlreadyExists` |
//! | Database (foreign key violation) | `23503` | `ForeignKeyViolation` |
//! | Database (check constraint violation) | `23514` | `Backend` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / network / other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Row};
use tracing::instrument;

use videostore_catalog::Movie;
use videostore_core::{CustomerId, ExpectedVersion, MovieId, RentalId};
use videostore_customers::{ContactInfo, Customer};
use videostore_rentals::Rental;

use crate::config::StoreConfig;
use crate::repository::{
    CustomerRepository, MovieRepository, RentalRepository, StoreError, StoreResult,
};

/// Schema applied by [`PostgresStore::migrate`].
pub const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

const EXTERNAL_ID_INDEX: &str = "movies_external_id_key";

const MOVIE_COLUMNS: &str = "id, title, overview, release_date, inventory, external_id, version";
const CUSTOMER_COLUMNS: &str = "id, name, phone, address, registered_at, version";
const RENTAL_COLUMNS: &str =
    "id, movie_id, customer_id, checkout_date, due_date, returned, returned_on, version";

/// Postgres-backed store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; the store can be shared
/// across tasks. Availability reads see whatever the pool's transaction
/// isolation level commits; two concurrent checkouts of the last copy are not
/// serialised here.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Backend("DATABASE_URL is not configured".to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Distinguish "missing" from "stale" after an update matched no row.
    async fn missing_or_stale(&self, table: &str, id: uuid::Uuid) -> StoreError {
        let query = format!("SELECT version FROM {table} WHERE id = $1");
        match sqlx::query(&query).bind(id).fetch_optional(&*self.pool).await {
            Ok(Some(row)) => match row.try_get::<i64, _>("version") {
                Ok(found) => StoreError::Concurrency(format!("{table} {id} is at version {found}")),
                Err(e) => map_sqlx_error("check_version", e),
            },
            Ok(None) => StoreError::NotFound(format!("{table} {id}")),
            Err(e) => map_sqlx_error("check_version", e),
        }
    }

    /// Explain why a rental update matched no row, in the same order the
    /// in-memory store checks: missing, stale version, reassigned references.
    async fn rental_update_rejected(&self, rental: &Rental, expected: ExpectedVersion) -> StoreError {
        let query = format!("SELECT {RENTAL_COLUMNS} FROM rentals WHERE id = $1");
        let current: Option<RentalRow> = match sqlx::query_as(&query)
            .bind(rental.id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
        {
            Ok(row) => row,
            Err(e) => return map_sqlx_error("check_version", e),
        };
        let Some(current) = current.map(Rental::from) else {
            return StoreError::NotFound(format!("rentals {}", rental.id));
        };
        if !expected.matches(current.version) {
            return StoreError::Concurrency(format!(
                "rentals {} is at version {}",
                rental.id, current.version
            ));
        }
        if current.movie_id != rental.movie_id || current.customer_id != rental.customer_id {
            return StoreError::ForeignKeyViolation(
                "rental references cannot be reassigned".to_string(),
            );
        }
        // The row changed between the update and this read.
        StoreError::Concurrency(format!("rentals {} was modified concurrently", rental.id))
    }
}

fn expected_param(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    }
}

/// movie_id/customer_id are immutable once checked out: an update that tries
/// to move them matches no row.
fn update_rental_sql() -> String {
    format!(
        r#"
        UPDATE rentals
        SET checkout_date = $2, due_date = $3, returned = $4, returned_on = $5,
            version = version + 1
        WHERE id = $1 AND ($6::bigint IS NULL OR version = $6)
          AND movie_id = $7 AND customer_id = $8
        RETURNING {RENTAL_COLUMNS}
        "#
    )
}

#[async_trait]
impl MovieRepository for PostgresStore {
    #[instrument(skip(self, movie), fields(movie_id = %movie.id, external_id = movie.external_id), err)]
    async fn insert_movie(&self, movie: Movie) -> StoreResult<Movie> {
        let query = format!(
            "INSERT INTO movies ({MOVIE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, 1) RETURNING {MOVIE_COLUMNS}"
        );
        let row: MovieRow = sqlx::query_as(&query)
            .bind(movie.id.as_uuid())
            .bind(&movie.title)
            .bind(&movie.overview)
            .bind(movie.release_date)
            .bind(movie.inventory)
            .bind(movie.external_id)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_movie", e))?;
        Ok(row.into())
    }

    async fn get_movie(&self, id: MovieId) -> StoreResult<Option<Movie>> {
        let query = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1");
        let row: Option<MovieRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_movie", e))?;
        Ok(row.map(Into::into))
    }

    async fn find_movie_by_external_id(&self, external_id: i64) -> StoreResult<Option<Movie>> {
        let query = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE external_id = $1");
        let row: Option<MovieRow> = sqlx::query_as(&query)
            .bind(external_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_movie_by_external_id", e))?;
        Ok(row.map(Into::into))
    }

    async fn list_movies(&self) -> StoreResult<Vec<Movie>> {
        let query = format!("SELECT {MOVIE_COLUMNS} FROM movies ORDER BY id");
        let rows: Vec<MovieRow> = sqlx::query_as(&query)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movies", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, movie), fields(movie_id = %movie.id, expected = ?expected), err)]
    async fn update_movie(&self, movie: Movie, expected: ExpectedVersion) -> StoreResult<Movie> {
        let query = format!(
            r#"
            UPDATE movies
            SET title = $2, overview = $3, release_date = $4, inventory = $5,
                external_id = $6, version = version + 1
            WHERE id = $1 AND ($7::bigint IS NULL OR version = $7)
            RETURNING {MOVIE_COLUMNS}
            "#
        );
        let row: Option<MovieRow> = sqlx::query_as(&query)
            .bind(movie.id.as_uuid())
            .bind(&movie.title)
            .bind(&movie.overview)
            .bind(movie.release_date)
            .bind(movie.inventory)
            .bind(movie.external_id)
            .bind(expected_param(expected))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_movie", e))?;

        match row {
            Some(row) => Ok(row.into()),
            None => Err(self.missing_or_stale("movies", *movie.id.as_uuid()).await),
        }
    }

    #[instrument(skip(self), err)]
    async fn delete_movie(&self, id: MovieId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Returned rentals go with the movie; outstanding ones keep the
        // foreign key in place and fail the movie delete below.
        sqlx::query("DELETE FROM rentals WHERE movie_id = $1 AND returned")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_returned_rentals", e))?;

        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_movie", e))?;
        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound(format!("movie {id}")));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for PostgresStore {
    async fn insert_customer(&self, customer: Customer) -> StoreResult<Customer> {
        let query = format!(
            "INSERT INTO customers ({CUSTOMER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, 1) RETURNING {CUSTOMER_COLUMNS}"
        );
        let row: CustomerRow = sqlx::query_as(&query)
            .bind(customer.id.as_uuid())
            .bind(&customer.name)
            .bind(customer.contact.phone.as_deref())
            .bind(customer.contact.address.as_deref())
            .bind(customer.registered_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_customer", e))?;
        Ok(row.into())
    }

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        let query = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1");
        let row: Option<CustomerRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;
        Ok(row.map(Into::into))
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let query = format!("SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY id");
        let rows: Vec<CustomerRow> = sqlx::query_as(&query)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_customers", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl RentalRepository for PostgresStore {
    #[instrument(skip(self, rental), fields(rental_id = %rental.id, movie_id = %rental.movie_id), err)]
    async fn insert_rental(&self, rental: Rental) -> StoreResult<Rental> {
        let query = format!(
            "INSERT INTO rentals ({RENTAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, 1) RETURNING {RENTAL_COLUMNS}"
        );
        let row: RentalRow = sqlx::query_as(&query)
            .bind(rental.id.as_uuid())
            .bind(rental.movie_id.as_uuid())
            .bind(rental.customer_id.as_uuid())
            .bind(rental.checkout_date)
            .bind(rental.due_date)
            .bind(rental.returned)
            .bind(rental.returned_on)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_rental", e))?;
        Ok(row.into())
    }

    async fn get_rental(&self, id: RentalId) -> StoreResult<Option<Rental>> {
        let query = format!("SELECT {RENTAL_COLUMNS} FROM rentals WHERE id = $1");
        let row: Option<RentalRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_rental", e))?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, rental), fields(rental_id = %rental.id, expected = ?expected), err)]
    async fn update_rental(&self, rental: Rental, expected: ExpectedVersion) -> StoreResult<Rental> {
        let query = update_rental_sql();
        let row: Option<RentalRow> = sqlx::query_as(&query)
            .bind(rental.id.as_uuid())
            .bind(rental.checkout_date)
            .bind(rental.due_date)
            .bind(rental.returned)
            .bind(rental.returned_on)
            .bind(expected_param(expected))
            .bind(rental.movie_id.as_uuid())
            .bind(rental.customer_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_rental", e))?;

        match row {
            Some(row) => Ok(row.into()),
            None => Err(self.rental_update_rejected(&rental, expected).await),
        }
    }

    async fn rentals_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Rental>> {
        let query = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE movie_id = $1 ORDER BY checkout_date, id"
        );
        let rows: Vec<RentalRow> = sqlx::query_as(&query)
            .bind(movie_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("rentals_for_movie", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn rentals_for_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Rental>> {
        let query = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE customer_id = $1 ORDER BY checkout_date, id"
        );
        let rows: Vec<RentalRow> = sqlx::query_as(&query)
            .bind(customer_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("rentals_for_customer", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn customers_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Customer>> {
        let rows: Vec<CustomerRow> = sqlx::query_as(
            r#"
            SELECT c.id, c.name, c.phone, c.address, c.registered_at, c.version
            FROM customers c
            WHERE EXISTS (
                SELECT 1 FROM rentals r WHERE r.customer_id = c.id AND r.movie_id = $1
            )
            ORDER BY c.id
            "#,
        )
        .bind(movie_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("customers_for_movie", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_outstanding(&self, movie_id: MovieId) -> StoreResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS outstanding FROM rentals WHERE movie_id = $1 AND NOT returned",
        )
        .bind(movie_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_outstanding", e))?;
        let outstanding: i64 = row
            .try_get("outstanding")
            .map_err(|e| map_sqlx_error("count_outstanding", e))?;
        Ok(outstanding.max(0) as u64)
    }

    async fn list_outstanding(&self) -> StoreResult<Vec<Rental>> {
        let query = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE NOT returned ORDER BY checkout_date, id"
        );
        let rows: Vec<RentalRow> = sqlx::query_as(&query)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_outstanding", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn clear_rentals(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM rentals")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear_rentals", e))?;
        Ok(result.rows_affected())
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => {
                    if db_err.constraint() == Some(EXTERNAL_ID_INDEX) {
                        StoreError::UniqueViolation { field: "external_id" }
                    } else {
                        StoreError::AlreadyExists(msg)
                    }
                }
                Some("23503") => StoreError::ForeignKeyViolation(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct MovieRow {
    id: uuid::Uuid,
    title: String,
    overview: String,
    release_date: Option<NaiveDate>,
    inventory: i64,
    external_id: i64,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for MovieRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovieRow {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            overview: row.try_get("overview")?,
            release_date: row.try_get("release_date")?,
            inventory: row.try_get("inventory")?,
            external_id: row.try_get("external_id")?,
            version: row.try_get("version")?,
        })
    }
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Movie {
            id: MovieId::from_uuid(row.id),
            title: row.title,
            overview: row.overview,
            release_date: row.release_date,
            inventory: row.inventory,
            external_id: row.external_id,
            version: row.version as u64,
        }
    }
}

#[derive(Debug)]
struct CustomerRow {
    id: uuid::Uuid,
    name: String,
    phone: Option<String>,
    address: Option<String>,
    registered_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for CustomerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CustomerRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            registered_at: row.try_get("registered_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: CustomerId::from_uuid(row.id),
            name: row.name,
            contact: ContactInfo {
                phone: row.phone,
                address: row.address,
            },
            registered_at: row.registered_at,
            version: row.version as u64,
        }
    }
}

#[derive(Debug)]
struct RentalRow {
    id: uuid::Uuid,
    movie_id: uuid::Uuid,
    customer_id: uuid::Uuid,
    checkout_date: NaiveDate,
    due_date: NaiveDate,
    returned: bool,
    returned_on: Option<NaiveDate>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for RentalRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RentalRow {
            id: row.try_get("id")?,
            movie_id: row.try_get("movie_id")?,
            customer_id: row.try_get("customer_id")?,
            checkout_date: row.try_get("checkout_date")?,
            due_date: row.try_get("due_date")?,
            returned: row.try_get("returned")?,
            returned_on: row.try_get("returned_on")?,
            version: row.try_get("version")?,
        })
    }
}

impl From<RentalRow> for Rental {
    fn from(row: RentalRow) -> Self {
        Rental {
            id: RentalId::from_uuid(row.id),
            movie_id: MovieId::from_uuid(row.movie_id),
            customer_id: CustomerId::from_uuid(row.customer_id),
            checkout_date: row.checkout_date,
            due_date: row.due_date,
            returned: row.returned,
            returned_on: row.returned_on,
            version: row.version as u64,
        }
    }
}
