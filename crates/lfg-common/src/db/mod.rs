pub mod migrations;
pub mod pool;
pub mod profiles;

pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, PoolSettings, create_pool_from_url, create_pool_from_url_checked};
pub use profiles::PgStore;
