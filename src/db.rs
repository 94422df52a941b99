use crate::config::AppConfig;
use crate::entities;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Type alias for the shared database connection pool.
pub type DbPool = DatabaseConnection;

/// Establish a connection pool to the database described by the app config.
pub async fn establish_connection(config: &AppConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(config.database_url.clone());
    options
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(!config.is_production());

    let pool = Database::connect(options).await?;
    info!("Database connection established");
    Ok(pool)
}

/// Create the schema from the entity definitions. Idempotent
/// (`IF NOT EXISTS`); works on both SQLite and Postgres backends.
pub async fn create_schema(db: &DbPool) -> Result<(), ServiceError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    macro_rules! create_table {
        ($entity:expr) => {{
            let mut stmt = schema.create_table_from_entity($entity);
            stmt.if_not_exists();
            db.execute(backend.build(&stmt)).await?;
        }};
    }

    create_table!(entities::category::Entity);
    create_table!(entities::location::Entity);
    create_table!(entities::material::Entity);
    create_table!(entities::loan_request::Entity);
    create_table!(entities::loan_request_item::Entity);
    create_table!(entities::loan::Entity);
    create_table!(entities::loan_extension::Entity);
    create_table!(entities::audit_log::Entity);

    info!("Database schema ensured");
    Ok(())
}
