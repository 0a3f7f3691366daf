//! Process wide state, built once in `main` and handed to whatever needs it
use std::sync::Arc;

use anyhow::Error;
use sqlx::{Pool, Sqlite};
use tokio::sync::watch;
use tracing::info;

use crate::{config::Config, dal};

#[derive(Clone, Debug)]
pub struct AppContext {
    config: Arc<Config>,
    pool: Pool<Sqlite>,
    dark_mode: Arc<watch::Sender<bool>>,
}

impl AppContext {
    /// Seeds the shared dark mode flag from the stored preference
    pub async fn init(config: Config, pool: Pool<Sqlite>) -> Result<Self, Error> {
        let dark_mode = dal::get_dark_mode(&pool).await?;
        info!(dark_mode, "app context ready");

        Ok(AppContext {
            config: Arc::new(config),
            pool,
            dark_mode: Arc::new(watch::Sender::new(dark_mode)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn is_dark_mode(&self) -> bool {
        *self.dark_mode.borrow()
    }

    /// Every screen holding a receiver sees the change
    pub fn watch_dark_mode(&self) -> watch::Receiver<bool> {
        self.dark_mode.subscribe()
    }

    /// Persists the flag, then notifies the watchers
    pub async fn set_dark_mode(&self, enabled: bool) -> Result<(), Error> {
        dal::set_dark_mode(enabled, &self.pool).await?;
        self.dark_mode.send_replace(enabled);

        Ok(())
    }
}
