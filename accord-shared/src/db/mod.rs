/// Database layer
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: embedded sqlx migrations
/// - `account_store`: PostgreSQL implementation of
///   [`crate::account::AccountStore`]
///
/// Models are in the `models` module at the crate root.
///
/// # Example
///
/// ```no_run
/// use accord_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::from_url(std::env::var("DATABASE_URL")?);
///     let pool = create_pool(config).await?;
///     accord_shared::db::migrations::run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod account_store;
pub mod migrations;
pub mod pool;
