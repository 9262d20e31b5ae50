//! `videostore-core`: record-keeping building blocks shared by every crate.
//!
//! This crate contains **pure domain** primitives (no storage concerns).

pub mod error;
pub mod id;
pub mod record;
pub mod validation;

pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, MovieId, RentalId};
pub use record::{ExpectedVersion, Record};
pub use validation::{ValidationErrors, Violation, ViolationKind};
