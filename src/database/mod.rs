pub mod manager;
pub mod postgres;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use postgres::PgPurgeStore;
pub use store::{PurgeStore, PurgeTransaction};
