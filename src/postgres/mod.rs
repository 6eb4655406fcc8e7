//! `tokio-postgres` backend: parameter binding, row extraction, the session facade
//! and the bb8 manager.

mod manager;
mod params;
mod query;
mod session;

pub use manager::PgManager;
pub use query::{build_result_set, postgres_extract_value};
pub use session::PgSession;
