//! Rentals module: checkout/return state and inventory availability.
//!
//! Deterministic domain logic only (no IO, no storage).

pub mod availability;
pub mod rental;

pub use availability::{Availability, available_inventory, count_outstanding};
pub use rental::{CheckOut, Rental, RentalStatus};
