//! `stocklink-core`: shared primitives for stock reconciliation.
//!
//! This crate contains **pure** building blocks (no IO, no async): identifiers,
//! quantity/divisor value objects and the domain error model.

pub mod error;
pub mod id;
pub mod quantity;

pub use error::{DomainError, DomainResult};
pub use id::{LocationId, NodeId, TenantId};
pub use quantity::{Divisor, Quantity, ValueObject};
