//! Schema caching (§4.8 items 2-3).
//!
//! [`ParsedSchemaCache`] holds compiled libxml2 validators in memory, keyed
//! by the SHA-256 of the entry XSD's bytes so repeated uploads of the same
//! schema to different temp paths still hit the cache. TTL reset on every
//! access is implemented with `moka`'s `time_to_idle`, not `time_to_live` —
//! a schema still in active use must not expire. Capacity and TTL come from
//! [`crate::config::EngineConfig`]'s cache section, read once at process
//! start (environment overrides only; a file-based override would need an
//! async read, which a lazily-initialized global cannot do).

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::libxml2::XmlSchemaPtr;

pub type CacheResult<T> = Result<T, EngineError>;

/// SHA-256 hex digest of `bytes`, used as the content-addressed key for the
/// validator cache (§4.8 item 2).
pub fn content_key(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("schema_{:x}", hasher.finalize())
}

/// In-memory cache of compiled libxml2 schema pointers, keyed by
/// [`content_key`]. `moka` collapses concurrent loads of the same key into
/// a single leader, so a schema is parsed at most once even under
/// concurrent warm-up calls.
pub struct ParsedSchemaCache {
    cache: moka::future::Cache<String, Arc<XmlSchemaPtr>>,
}

impl ParsedSchemaCache {
    pub fn new(max_capacity: u64) -> Self {
        Self::with_ttl(max_capacity, default_validator_ttl())
    }

    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(ttl)
            .build();
        Self { cache }
    }

    /// Get a parsed schema from the cache, or load/parse it if missing. The
    /// loader future only runs when the key is missing; concurrent requests
    /// for the same key wait on the single leader.
    pub async fn get_or_load<F, Fut, E>(&self, key: String, loader: F) -> Result<Arc<XmlSchemaPtr>, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Arc<XmlSchemaPtr>, E>>,
        E: Send + Sync + Clone + 'static,
    {
        self.cache.try_get_with(key, loader()).await.map_err(|e| (*e).clone())
    }

    pub async fn get(&self, key: &str) -> Option<Arc<XmlSchemaPtr>> {
        self.cache.get(key).await
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

fn default_validator_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Reads `CacheConfig` through the environment-override layer only — this
/// is a lazily-initialized global, so an async file read is not an option.
/// Embedders who need file-based cache tuning should call
/// `ConfigManager::load` themselves and construct their own
/// [`ParsedSchemaCache`] instead of going through the global.
fn env_cache_config() -> crate::config::CacheConfig {
    crate::config::ConfigManager::apply_environment_overrides(crate::config::EngineConfig::default())
        .map(|c| c.cache)
        .unwrap_or_default()
}

fn global_parsed_schema_cache() -> &'static ParsedSchemaCache {
    static CACHE: OnceLock<ParsedSchemaCache> = OnceLock::new();
    CACHE.get_or_init(|| {
        let config = env_cache_config();
        ParsedSchemaCache::with_ttl(config.max_memory_entries, Duration::from_secs(config.ttl_hours * 3600))
    })
}

/// Pre-populate the process-wide validator cache so the first user-visible
/// validation pays no cold-start cost (§4.8 item 3).
pub async fn warm_up_validator<F, Fut, E>(xsd_bytes: &[u8], loader: F) -> Result<(), E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Arc<XmlSchemaPtr>, E>>,
    E: Send + Sync + Clone + 'static,
{
    global_parsed_schema_cache().get_or_load(content_key(xsd_bytes), loader).await?;
    Ok(())
}

/// Look up an already-warmed validator without triggering a load.
pub async fn get_warmed_validator(xsd_bytes: &[u8]) -> Option<Arc<XmlSchemaPtr>> {
    global_parsed_schema_cache().get(&content_key(xsd_bytes)).await
}

/// Clear the process-wide validator cache (§4.8 item 2).
pub async fn dispose_validator_cache() {
    global_parsed_schema_cache().clear().await;
}

/// Error from [`get_or_parse_validator`]'s loader. Kept deliberately small
/// and `Clone` so it can live inside `moka`'s `try_get_with`, unlike
/// [`EngineError`] which carries non-`Clone` sources (`std::io::Error`,
/// `reqwest::Error`).
#[derive(Debug, Clone)]
pub struct ValidatorLoadError(pub String);

impl std::fmt::Display for ValidatorLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ValidatorLoadError> for EngineError {
    fn from(e: ValidatorLoadError) -> Self {
        EngineError::SchemaResolution(e.0)
    }
}

/// Compile-or-fetch an XSD's validator through the process-wide cache,
/// keyed by the content hash of `xsd_bytes`.
pub async fn get_or_parse_validator(xsd_bytes: &[u8]) -> Result<Arc<XmlSchemaPtr>, ValidatorLoadError> {
    let wrapper = crate::libxml2::LibXml2Wrapper::new();
    let owned = xsd_bytes.to_vec();
    global_parsed_schema_cache()
        .get_or_load(content_key(xsd_bytes), move || async move {
            wrapper.parse_schema_from_memory(&owned).map(Arc::new).map_err(|e| ValidatorLoadError(e.to_string()))
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_is_stable_and_distinct() {
        let a = content_key(b"schema a");
        let b = content_key(b"schema b");
        assert_ne!(a, b);
        assert_eq!(a, content_key(b"schema a"));
        assert!(a.starts_with("schema_"));
    }

    #[tokio::test]
    async fn parsed_schema_cache_resets_ttl_on_access() {
        let cache = ParsedSchemaCache::with_ttl(10, Duration::from_millis(200));
        let wrapper = crate::libxml2::LibXml2Wrapper::new();
        let xsd = br#"<?xml version="1.0"?><xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="root" type="xs:string"/></xs:schema>"#;
        let key = content_key(xsd);

        let schema: Result<Arc<XmlSchemaPtr>, String> = cache
            .get_or_load(key.clone(), || async {
                wrapper
                    .parse_schema_from_memory(xsd)
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .await;
        assert!(schema.is_ok());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get(&key).await.is_some());
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Still alive: the get() above reset the idle timer.
        cache.cache.run_pending_tasks().await;
        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn dispose_validator_cache_clears_the_global_cache() {
        let wrapper = crate::libxml2::LibXml2Wrapper::new();
        let xsd = br#"<?xml version="1.0"?><xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="root" type="xs:string"/></xs:schema>"#;

        let result: Result<(), String> = warm_up_validator(xsd, || async {
            wrapper
                .parse_schema_from_memory(xsd)
                .map(Arc::new)
                .map_err(|e| e.to_string())
        })
        .await;
        assert!(result.is_ok());
        assert!(get_warmed_validator(xsd).await.is_some());

        dispose_validator_cache().await;
        assert!(get_warmed_validator(xsd).await.is_none());
    }
}
