//! Backends for tests: a scripted in-memory database and an embedded Postgres server.

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "test-utils-postgres")]
pub mod postgres;

#[cfg(feature = "mock")]
pub use mock::{MockCall, MockDatabase, MockManager, MockSession};

#[cfg(feature = "test-utils-postgres")]
pub use postgres::EmbeddedPostgres;
