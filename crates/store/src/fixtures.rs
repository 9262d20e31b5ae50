//! Deterministic seed data for tests and local development.
//!
//! Record IDs are fixed so repeated runs (and different stores) see the same
//! movies and customers.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use videostore_catalog::Movie;
use videostore_core::{CustomerId, MovieId};
use videostore_customers::{ContactInfo, Customer};

use crate::repository::{CustomerRepository, MovieRepository, StoreResult};

pub const MOVIE_ONE: MovieId = MovieId::from_uuid(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001));
pub const MOVIE_TWO: MovieId = MovieId::from_uuid(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0002));
pub const CUSTOMER_ONE: CustomerId =
    CustomerId::from_uuid(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0001_0001));
pub const CUSTOMER_TWO: CustomerId =
    CustomerId::from_uuid(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0001_0002));

/// Records created by [`seed`].
#[derive(Debug, Clone)]
pub struct Fixtures {
    pub movie_one: Movie,
    pub movie_two: Movie,
    pub customer_one: Customer,
    pub customer_two: Customer,
}

pub fn movie_one() -> Movie {
    Movie {
        id: MOVIE_ONE,
        title: "Psycho".to_string(),
        overview: "When larcenous real estate clerk Marion Crane goes on the lam.".to_string(),
        release_date: NaiveDate::from_ymd_opt(1960, 6, 16),
        inventory: 10,
        external_id: 1,
        version: 1,
    }
}

pub fn movie_two() -> Movie {
    Movie {
        id: MOVIE_TWO,
        title: "Jaws".to_string(),
        overview: "An insatiable great white shark terrorizes the townspeople of Amity Island.".to_string(),
        release_date: NaiveDate::from_ymd_opt(1975, 6, 20),
        inventory: 6,
        external_id: 2,
        version: 1,
    }
}

fn registered_at() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_500_000_000, 0).unwrap_or_default()
}

pub fn customer_one() -> Customer {
    Customer {
        id: CUSTOMER_ONE,
        name: "Shelley Rocha".to_string(),
        contact: ContactInfo {
            phone: Some("(322) 510-8695".to_string()),
            address: Some("Ap #292-5216 Ipsum Rd., Hillsboro, OR 24309".to_string()),
        },
        registered_at: registered_at(),
        version: 1,
    }
}

pub fn customer_two() -> Customer {
    Customer {
        id: CUSTOMER_TWO,
        name: "Curran Stout".to_string(),
        contact: ContactInfo {
            phone: Some("(908) 949-6758".to_string()),
            address: Some("Ap #658-1540 Erat Rd., San Francisco, CA 94267".to_string()),
        },
        registered_at: registered_at(),
        version: 1,
    }
}

/// Insert the fixture movies and customers. No rentals are seeded.
pub async fn seed<S>(store: &S) -> StoreResult<Fixtures>
where
    S: MovieRepository + CustomerRepository + ?Sized,
{
    let fixtures = Fixtures {
        movie_one: store.insert_movie(movie_one()).await?,
        movie_two: store.insert_movie(movie_two()).await?,
        customer_one: store.insert_customer(customer_one()).await?,
        customer_two: store.insert_customer(customer_two()).await?,
    };
    tracing::debug!("fixtures seeded");
    Ok(fixtures)
}
