//! Storage layer: repositories, store backends, the rental desk service,
//! configuration and fixtures.

pub mod config;
pub mod desk;
pub mod fixtures;
pub mod in_memory;
pub mod postgres;
pub mod repository;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, StoreBackend, StoreConfig};
pub use desk::{DeskError, DeskResult, RentalDesk};
pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    CustomerRepository, MovieRepository, RentalRepository, Store, StoreError, StoreResult,
};
