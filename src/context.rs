use std::path::{Path, PathBuf};

use crate::db::SqliteStore;
use crate::error::Result;
use crate::settings::{load_credentials, shellexpand_path, Settings};
use crate::store::TableStore;

/// Everything a command needs, built once up front.
pub struct AppContext {
    pub settings: Settings,
    pub store: Box<dyn TableStore>,
}

impl AppContext {
    /// `local` selects an SQLite file instead of the hosted store; otherwise
    /// credentials are read from `secrets` (or the configured secrets file)
    /// and their absence is fatal.
    pub fn init(settings: Settings, secrets: Option<&Path>, local: Option<&Path>) -> Result<Self> {
        if let Some(db) = local {
            log::info!("using local store {}", db.display());
            let store = SqliteStore::open(db)?;
            return Ok(Self::with_store(settings, Box::new(store)));
        }

        let secrets_path = secrets
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(shellexpand_path(&settings.secrets_file)));
        let credentials = load_credentials(&secrets_path)?;
        log::debug!("credentials loaded from {}", secrets_path.display());
        let store = remote_store(&credentials)?;
        Ok(Self::with_store(settings, store))
    }

    pub fn with_store(settings: Settings, store: Box<dyn TableStore>) -> Self {
        Self { settings, store }
    }

    pub fn store(&self) -> &dyn TableStore {
        self.store.as_ref()
    }
}

#[cfg(feature = "rest")]
fn remote_store(credentials: &crate::settings::Credentials) -> Result<Box<dyn TableStore>> {
    Ok(Box::new(crate::rest::RestStore::new(credentials)?))
}

#[cfg(not(feature = "rest"))]
fn remote_store(_credentials: &crate::settings::Credentials) -> Result<Box<dyn TableStore>> {
    Err(crate::error::SyncError::Other(
        "built without the `rest` feature; use --local <db>".to_string(),
    ))
}
