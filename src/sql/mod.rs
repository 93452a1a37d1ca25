//! PostgreSQL rendering of store queries: identifiers from the model, values as parameters.

mod builder;
pub mod params;
pub use builder::{aggregate, count, delete, insert, select, update, QueryBuf};
pub use params::PgBindValue;
