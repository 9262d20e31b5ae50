use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use videostore_core::{DomainResult, MovieId, Record, ValidationErrors, ViolationKind};

/// A catalog title and the number of physical copies the store owns.
///
/// `version` is managed by the store: 1 after insert, +1 per committed update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub overview: String,
    pub release_date: Option<NaiveDate>,
    /// Total owned copies.
    pub inventory: i64,
    /// Reference into the external catalog. Unique across all movies.
    pub external_id: i64,
    pub version: u64,
}

impl Movie {
    /// Field-level validation of an already-built movie.
    ///
    /// Uniqueness of `external_id` needs persisted state and is checked by the store.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_title(&self.title, &mut errors);
        check_inventory(self.inventory, &mut errors);
        errors
    }

    /// Apply an admin edit, producing the candidate record (not yet validated).
    pub fn with_changes(&self, changes: &MovieChanges) -> Movie {
        let mut next = self.clone();
        if let Some(title) = &changes.title {
            next.title = title.clone();
        }
        if let Some(overview) = &changes.overview {
            next.overview = overview.clone();
        }
        if let Some(release_date) = changes.release_date {
            next.release_date = release_date;
        }
        if let Some(inventory) = changes.inventory {
            next.inventory = inventory;
        }
        if let Some(external_id) = changes.external_id {
            next.external_id = external_id;
        }
        next
    }
}

impl Record for Movie {
    type Id = MovieId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Input for adding a movie (bulk import or admin action).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovie {
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    pub inventory: i64,
    /// Required; kept optional here so a missing value is reported, not rejected at parse time.
    #[serde(default)]
    pub external_id: Option<i64>,
}

impl NewMovie {
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_title(&self.title, &mut errors);
        check_inventory(self.inventory, &mut errors);
        if self.external_id.is_none() {
            errors.add("external_id", ViolationKind::Blank);
        }
        errors
    }

    /// Validate and build the record to insert (version 1).
    pub fn into_movie(self, id: MovieId) -> DomainResult<Movie> {
        let errors = self.validate();
        let Some(external_id) = self.external_id else {
            return Err(errors.into());
        };
        errors.into_result()?;
        Ok(Movie {
            id,
            title: self.title,
            overview: self.overview,
            release_date: self.release_date,
            inventory: self.inventory,
            external_id,
            version: 1,
        })
    }
}

/// Partial admin edit. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieChanges {
    pub title: Option<String>,
    pub overview: Option<String>,
    /// `Some(None)` clears the release date.
    pub release_date: Option<Option<NaiveDate>>,
    pub inventory: Option<i64>,
    pub external_id: Option<i64>,
}

impl MovieChanges {
    pub fn is_empty(&self) -> bool {
        self == &MovieChanges::default()
    }
}

fn check_title(title: &str, errors: &mut ValidationErrors) {
    if title.trim().is_empty() {
        errors.add("title", ViolationKind::Blank);
    }
}

fn check_inventory(inventory: i64, errors: &mut ValidationErrors) {
    if inventory < 0 {
        errors.add("inventory", ViolationKind::Negative);
    }
}
