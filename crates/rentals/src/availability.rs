//! Available inventory: owned copies minus outstanding rentals.
//!
//! The value is never stored. It is recomputed from committed rental state on
//! every read, so callers must re-query after any checkout or return.
//!
//! No lower bound is enforced: overbooking (more outstanding rentals than owned
//! copies) yields a negative value rather than being clamped at 0.

use serde::{Deserialize, Serialize};

use videostore_catalog::Movie;
use videostore_core::MovieId;

use crate::rental::Rental;

/// `inventory - outstanding`.
pub fn available_inventory(inventory: i64, outstanding: u64) -> i64 {
    let outstanding = i64::try_from(outstanding).unwrap_or(i64::MAX);
    inventory.saturating_sub(outstanding)
}

/// Number of outstanding (not returned) rentals for `movie_id`.
pub fn count_outstanding<'a>(rentals: impl IntoIterator<Item = &'a Rental>, movie_id: MovieId) -> u64 {
    rentals
        .into_iter()
        .filter(|r| r.movie_id == movie_id && r.is_outstanding())
        .count() as u64
}

/// Snapshot of a movie's availability at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub movie_id: MovieId,
    pub inventory: i64,
    pub outstanding: u64,
    pub available: i64,
}

impl Availability {
    pub fn for_movie(movie: &Movie, outstanding: u64) -> Self {
        Self {
            movie_id: movie.id,
            inventory: movie.inventory,
            outstanding,
            available: available_inventory(movie.inventory, outstanding),
        }
    }

    /// At least one copy on the shelf.
    pub fn can_rent(&self) -> bool {
        self.available > 0
    }

    /// More copies out than the store owns.
    pub fn is_overbooked(&self) -> bool {
        self.available < 0
    }
}
