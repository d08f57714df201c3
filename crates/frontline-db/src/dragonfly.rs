//! `Dragonfly` (Redis-compatible) reference cache.
//!
//! Holds the JSON-encoded facility reference data between restarts so the
//! populator does not hit the upstream API on every boot.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `frontline:reference:facilities` | JSON | Facility metadata |
//! | `frontline:reference:links` | JSON | Lattice links |

use std::time::Duration;

use fred::prelude::*;
use fred::types::Expiration;
use frontline_core::cache::ReferenceCache;
use frontline_core::error::CacheError;

use crate::error::DbError;

/// Connection handle to a `Dragonfly` instance.
#[derive(Clone)]
pub struct DragonflyCache {
    client: Client,
}

impl std::fmt::Debug for DragonflyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragonflyCache").finish_non_exhaustive()
    }
}

impl DragonflyCache {
    /// Connect to `Dragonfly` at a `redis://host:port[/db]` URL.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed and
    /// [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    /// Close the connection.
    pub async fn quit(&self) {
        if let Err(e) = self.client.quit().await {
            tracing::warn!(error = %e, "Dragonfly quit failed");
        }
    }
}

fn backend(e: &fred::error::Error) -> CacheError {
    CacheError::Backend(e.to_string())
}

impl ReferenceCache for DragonflyCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.client.get(key).await.map_err(|e| backend(&e))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        let _: () = self
            .client
            .set(key, value.as_str(), Some(Expiration::EX(secs)), None, false)
            .await
            .map_err(|e| backend(&e))?;
        Ok(())
    }
}
