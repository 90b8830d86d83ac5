//! Repository functions: one function per database operation.
//!
//! Every function takes a `&PgPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types: pure SQL.

pub mod templates;
pub mod instances;
pub mod actions;
