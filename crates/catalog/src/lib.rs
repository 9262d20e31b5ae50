//! Movie catalog module.
//!
//! Movie records and their field validation, implemented as deterministic
//! domain logic (no IO, no storage).

pub mod movie;

pub use movie::{Movie, MovieChanges, NewMovie};
