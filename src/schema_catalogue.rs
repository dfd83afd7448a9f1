//! Schema catalogue & resolver (§4.10).
//!
//! A static map from schema ID to [`SchemaEntry`], plus `ensure_schema`/
//! `resolve_entry_xsd`/`clear_cache` for turning an ID into the text of its
//! entry XSD on disk. Downloads are cached under the per-ID directory
//! `~/.cache/<app>/schemas/<id>`; a non-empty directory is treated as
//! already populated and is never re-downloaded. Only one `ensure_schema`
//! call per ID per process is expected — concurrent callers racing on the
//! same ID are not serialized here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tokio::time::{sleep, timeout};

use crate::config::{ConfigManager, NetworkConfig};
use crate::error::{EngineError, EngineResult};
use crate::logger::logger;

const APP_NAME: &str = "netex-validate";

/// Catalogue entry naming where a schema archive lives and which file
/// inside it is the entry point.
pub type SchemaEntry = crate::SchemaEntry;

const NETEX_ARCHIVE_ROOT: &str = "NeTEx-main";
const SIRI_ARCHIVE_ROOT: &str = "SIRI-main";

/// All schema IDs except `"custom"`, which has no catalogue entry since its
/// path is supplied directly by the caller.
pub const SCHEMA_IDS: &[&str] = &[
    "netex@1.2-nc",
    "netex@1.2",
    "netex@1.2.2-nc",
    "netex@1.2.2",
    "netex@1.2.3-nc",
    "netex@1.2.3",
    "netex@1.3.0-nc",
    "netex@1.3.0",
    "netex@1.3.1-nc",
    "netex@1.3.1",
    "epip@1.1.2",
    "siri@2.1",
    "siri@2.2",
];

fn netex_entry(tag: &'static str, entry_xsd: &'static str) -> SchemaEntry {
    SchemaEntry {
        label: tag,
        archive_url: netex_archive_url(tag),
        entry_xsd,
        archive_root_prefix: NETEX_ARCHIVE_ROOT,
    }
}

// `archive_url` must be `&'static str`; these are the stable per-tag URLs
// under the CEN NeTEx/SIRI GitHub mirrors.
fn netex_archive_url(tag: &str) -> &'static str {
    match tag {
        "netex@1.2-nc" | "netex@1.2" => "https://github.com/NeTEx-CEN/NeTEx/archive/refs/tags/v1.2.zip",
        "netex@1.2.2-nc" | "netex@1.2.2" => "https://github.com/NeTEx-CEN/NeTEx/archive/refs/tags/v1.2.2.zip",
        "netex@1.2.3-nc" | "netex@1.2.3" => "https://github.com/NeTEx-CEN/NeTEx/archive/refs/tags/v1.2.3.zip",
        "netex@1.3.0-nc" | "netex@1.3.0" => "https://github.com/NeTEx-CEN/NeTEx/archive/refs/tags/v1.3.0.zip",
        "netex@1.3.1-nc" | "netex@1.3.1" => "https://github.com/NeTEx-CEN/NeTEx/archive/refs/tags/v1.3.1.zip",
        "epip@1.1.2" => "https://github.com/NeTEx-CEN/EPIP/archive/refs/tags/v1.1.2.zip",
        _ => unreachable!("unmapped netex-family schema id"),
    }
}

/// Looks up the catalogue entry for a schema ID. Returns `None` for
/// `"custom"` and any unrecognized ID.
pub fn catalogue_entry(schema_id: &str) -> Option<SchemaEntry> {
    Some(match schema_id {
        "netex@1.2-nc" => netex_entry("netex@1.2-nc", "xsd/NeTEx_publication-NoConstraint.xsd"),
        "netex@1.2" => netex_entry("netex@1.2", "xsd/NeTEx_publication.xsd"),
        "netex@1.2.2-nc" => netex_entry("netex@1.2.2-nc", "xsd/NeTEx_publication-NoConstraint.xsd"),
        "netex@1.2.2" => netex_entry("netex@1.2.2", "xsd/NeTEx_publication.xsd"),
        "netex@1.2.3-nc" => netex_entry("netex@1.2.3-nc", "xsd/NeTEx_publication-NoConstraint.xsd"),
        "netex@1.2.3" => netex_entry("netex@1.2.3", "xsd/NeTEx_publication.xsd"),
        "netex@1.3.0-nc" => netex_entry("netex@1.3.0-nc", "xsd/NeTEx_publication-NoConstraint.xsd"),
        "netex@1.3.0" => netex_entry("netex@1.3.0", "xsd/NeTEx_publication.xsd"),
        "netex@1.3.1-nc" => netex_entry("netex@1.3.1-nc", "xsd/NeTEx_publication-NoConstraint.xsd"),
        "netex@1.3.1" => netex_entry("netex@1.3.1", "xsd/NeTEx_publication.xsd"),
        "epip@1.1.2" => SchemaEntry {
            label: "epip@1.1.2",
            archive_url: "https://github.com/NeTEx-CEN/EPIP/archive/refs/tags/v1.1.2.zip",
            entry_xsd: "xsd/EPIP_publication.xsd",
            archive_root_prefix: "EPIP-1.1.2",
        },
        "siri@2.1" => SchemaEntry {
            label: "siri@2.1",
            archive_url: "https://github.com/SIRI-CEN/SIRI/archive/refs/tags/v2.1.zip",
            entry_xsd: "xsd/siri.xsd",
            archive_root_prefix: SIRI_ARCHIVE_ROOT,
        },
        "siri@2.2" => SchemaEntry {
            label: "siri@2.2",
            archive_url: "https://github.com/SIRI-CEN/SIRI/archive/refs/tags/v2.2.zip",
            entry_xsd: "xsd/siri.xsd",
            archive_root_prefix: SIRI_ARCHIVE_ROOT,
        },
        _ => return None,
    })
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
        .join("schemas")
}

/// Cache root, honoring `EngineConfig::schema_cache_dir` when the caller set
/// one (file or `NETEX_VALIDATE_*` environment override), falling back to
/// the platform cache directory otherwise.
fn cache_root(config: &crate::config::EngineConfig) -> PathBuf {
    config.schema_cache_dir.clone().unwrap_or_else(default_cache_root)
}

fn schema_dir(schema_id: &str, config: &crate::config::EngineConfig) -> PathBuf {
    cache_root(config).join(sanitize_schema_id(schema_id))
}

/// Schema IDs contain `@` and `.`, which are fine on every target
/// filesystem this crate supports, but `/` is not — `epip@1.1.2` has none,
/// this exists purely as a defensive boundary for future schema IDs.
fn sanitize_schema_id(schema_id: &str) -> String {
    schema_id.replace('/', "_")
}

async fn directory_is_populated(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => entries.next_entry().await.ok().flatten().is_some(),
        Err(_) => false,
    }
}

/// Downloads and extracts the schema archive for `schema_id` if its cache
/// directory is empty, then returns that directory.
pub async fn ensure_schema(schema_id: &str) -> EngineResult<PathBuf> {
    let log = logger("xsd-validator");
    let entry = catalogue_entry(schema_id)
        .ok_or_else(|| EngineError::SchemaResolution(format!("unknown schema id `{}`", schema_id)))?;
    // A missing or invalid on-disk config falls back to defaults rather than
    // failing schema resolution outright; config problems shouldn't stop an
    // otherwise-working validation run.
    let config = ConfigManager::load().await.unwrap_or_default();
    let dir = schema_dir(schema_id, &config);

    if directory_is_populated(&dir).await {
        log.log(format_args!("schema cache hit for {}", schema_id));
        return Ok(dir);
    }
    log.log(format_args!("schema cache miss for {}, downloading {}", schema_id, entry.archive_url));

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| EngineError::SchemaResolution(format!("could not create schema cache directory: {}", e)))?;

    let archive_bytes = download_with_retry(entry.archive_url, &config.network).await?;

    let mut temp_file = tempfile::NamedTempFile::new()
        .map_err(|e| EngineError::Archive(format!("could not create temp file for schema archive: {}", e)))?;
    std::io::Write::write_all(&mut temp_file, &archive_bytes)
        .map_err(|e| EngineError::Archive(format!("could not write schema archive to disk: {}", e)))?;

    crate::archive::extract_all(temp_file.path(), &dir)?;

    Ok(dir)
}

/// Walks the extracted root looking for `entryXsd`, with or without the
/// expected `archiveRootPrefix`, falling back to searching each direct
/// child directory.
pub fn resolve_entry_xsd(schema_id: &str, extracted_root: &Path) -> EngineResult<PathBuf> {
    let entry = catalogue_entry(schema_id)
        .ok_or_else(|| EngineError::SchemaResolution(format!("unknown schema id `{}`", schema_id)))?;

    let candidates = [
        extracted_root.join(entry.entry_xsd),
        extracted_root.join(entry.archive_root_prefix).join(entry.entry_xsd),
    ];
    for candidate in &candidates {
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
    }

    if let Ok(mut children) = std::fs::read_dir(extracted_root) {
        while let Some(Ok(child)) = children.next() {
            let path = child.path();
            if path.is_dir() {
                let candidate = path.join(entry.entry_xsd);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
    }

    let listing = std::fs::read_dir(extracted_root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_else(|e| format!("<could not list directory: {}>", e));

    Err(EngineError::SchemaResolution(format!(
        "could not find entry XSD `{}` for `{}` under {}; directory contains: {}",
        entry.entry_xsd,
        schema_id,
        extracted_root.display(),
        listing
    )))
}

/// `ensure_schema` followed by `resolve_entry_xsd` and a read of the
/// resulting file's text; the combination most callers want.
pub async fn resolve_schema_text(schema_id: &str) -> EngineResult<String> {
    let dir = ensure_schema(schema_id).await?;
    let xsd_path = resolve_entry_xsd(schema_id, &dir)?;
    tokio::fs::read_to_string(&xsd_path)
        .await
        .map_err(|e| EngineError::SchemaResolution(format!("could not read entry XSD {}: {}", xsd_path.display(), e)))
}

pub async fn clear_cache(schema_id: &str) -> EngineResult<()> {
    let config = ConfigManager::load().await.unwrap_or_default();
    let dir = schema_dir(schema_id, &config);
    if dir.exists() {
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| EngineError::SchemaResolution(format!("could not clear cache for {}: {}", schema_id, e)))?;
    }
    Ok(())
}

pub async fn clear_all_caches() -> EngineResult<()> {
    let config = ConfigManager::load().await.unwrap_or_default();
    let root = cache_root(&config);
    if root.exists() {
        tokio::fs::remove_dir_all(&root)
            .await
            .map_err(|e| EngineError::SchemaResolution(format!("could not clear schema cache: {}", e)))?;
    }
    Ok(())
}

async fn download_with_retry(url: &str, network: &NetworkConfig) -> EngineResult<Vec<u8>> {
    let client = Client::builder()
        .user_agent(format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(EngineError::Network)?;

    let attempts = network.retry_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        let request = client.get(url).send();
        match timeout(Duration::from_secs(network.timeout_seconds), request).await {
            Ok(Ok(response)) if response.status().is_success() => {
                return response.bytes().await.map(|b| b.to_vec()).map_err(EngineError::Network);
            }
            Ok(Ok(response)) => {
                last_err = Some(EngineError::Network(response.error_for_status().unwrap_err()));
            }
            Ok(Err(e)) => last_err = Some(EngineError::Network(e)),
            Err(_) => last_err = Some(EngineError::SchemaResolution(format!("timed out downloading {}", url))),
        }
        if attempt + 1 < attempts {
            sleep(Duration::from_millis(network.retry_delay_ms * 2_u64.pow(attempt))).await;
        }
    }
    Err(last_err.unwrap_or_else(|| EngineError::SchemaResolution(format!("failed to download {}", url))))
}
