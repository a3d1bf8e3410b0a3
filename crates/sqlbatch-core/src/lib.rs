//! sqlbatch core - shared abstractions for the SQL statement batcher
//!
//! This crate provides the types every other sqlbatch crate depends on:
//!
//! - `BatchError` - the error taxonomy for batching, merging and retrying
//! - `Adapter` / `BlockingAdapter` - the narrow contract the batcher uses to
//!   talk to a database it does not own
//! - `Savepoint` / `SavepointNamer` - savepoint identity and unique naming
//! - `Statement`, `Row`, `Metadata` - common value types

mod adapter;
mod error;
mod savepoint;
mod types;

pub use adapter::*;
pub use error::*;
pub use savepoint::*;
pub use types::*;
