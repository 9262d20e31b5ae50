//! Customer records.

pub mod customer;

pub use customer::{ContactInfo, Customer, NewCustomer};
