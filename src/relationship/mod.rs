//! Relationship cardinality and inverse-link synchronization.

pub mod cardinality;
mod sync;

pub use cardinality::{cardinality, Cardinality};
