pub mod preferences;
pub mod saved_routes;

pub use preferences::*;
pub use saved_routes::*;

use anyhow::{Context, Error};
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// Opens the database, creating it if needed, and runs the migrations
#[tracing::instrument(err)]
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, Error> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {database_url}"))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Error running migrations")?;

    Ok(pool)
}

/// A migrated database that lives as long as its single connection
#[cfg(test)]
pub(crate) async fn memory_pool() -> Result<Pool<Sqlite>, Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
