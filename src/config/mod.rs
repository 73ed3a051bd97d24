//! Process-wide server configuration.
//!
//! Built once at startup from environment variables layered over an
//! optional `config.json` on disk, then treated as immutable for the
//! lifetime of the process (§5's only shared mutable-free state).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::common::uuid_codec;
use crate::{Error, Result};

fn default_port() -> u16 {
    8000
}

/// On-disk shape of `config.json`. Every field is optional — a missing file
/// or a missing field falls back to the environment, then to a generated
/// default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileConfig {
    #[serde(rename = "UUID")]
    uuid: Option<String>,
    #[serde(rename = "PROXYIP")]
    proxy_ip: Option<String>,
    #[serde(rename = "CREDIT")]
    credit: Option<String>,
    #[serde(rename = "PORT")]
    port: Option<u16>,
}

/// Immutable, process-wide configuration. See spec's `ServerConfig` in the
/// data model: a 16-byte user UUID, an optional fallback upstream, an
/// opaque credit label, and the listen port.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub user_uuid: [u8; 16],
    pub fallback_upstream: Option<String>,
    pub credit: Option<String>,
    pub port: u16,
    /// Override for the DoH upstream endpoint. Not part of `config.json`'s
    /// shape (spec §3 fixes that to UUID/PROXYIP/CREDIT/PORT) — this is the
    /// injectable capability seam spec §9 asks for, set only via the
    /// `DOH_ENDPOINT` env var or directly by tests. `None` means
    /// `DoHResolver` falls back to its own built-in default.
    pub doh_endpoint: Option<String>,
}

impl ServerConfig {
    /// Build from environment variables layered over `config_path` (if it
    /// exists). Environment variables take precedence over the file.
    ///
    /// An invalid UUID coming from the environment is non-fatal — a fresh
    /// one is generated and the file is rewritten so restarts are stable.
    /// An invalid UUID coming from `config.json` (and not overridden by the
    /// environment) aborts startup: the file is assumed to be an operator's
    /// deliberate pin, and silently discarding it would be surprising.
    pub async fn load(config_path: impl AsRef<Path>, port_override: Option<u16>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let mut file = read_file_config(config_path).await;

        let env_uuid = std::env::var("UUID").ok().filter(|s| !s.is_empty());
        let uuid_bytes = match env_uuid {
            Some(text) => match uuid_codec::parse_validated(&text) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "UUID env var is not a valid v4 UUID, generating a fresh one");
                    *Uuid::new_v4().as_bytes()
                }
            },
            None => match file.uuid.as_deref() {
                Some(text) => uuid_codec::parse_validated(text).map_err(|e| {
                    Error::config(format!(
                        "config.json UUID is invalid and no UUID env override was given: {e}"
                    ))
                })?,
                None => *Uuid::new_v4().as_bytes(),
            },
        };

        let canonical = uuid_codec::format_canonical(&uuid_bytes);
        if file.uuid.as_deref() != Some(canonical.as_str()) {
            file.uuid = Some(canonical);
            if let Err(e) = write_file_config(config_path, &file).await {
                warn!(error = %e, path = %config_path.display(), "failed to persist config.json, continuing with in-memory config");
            }
        }

        let fallback_upstream = std::env::var("PROXYIP")
            .ok()
            .filter(|s| !s.is_empty())
            .or(file.proxy_ip.clone());

        let credit = std::env::var("CREDIT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(file.credit.clone());

        let port = port_override
            .or_else(|| std::env::var("PORT").ok().and_then(|s| s.parse().ok()))
            .or(file.port)
            .unwrap_or_else(default_port);

        let doh_endpoint = std::env::var("DOH_ENDPOINT").ok().filter(|s| !s.is_empty());

        Ok(Self {
            user_uuid: uuid_bytes,
            fallback_upstream,
            credit,
            port,
            doh_endpoint,
        })
    }
}

async fn read_file_config(path: &Path) -> FileConfig {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "config.json is not valid JSON, ignoring");
            FileConfig::default()
        }),
        Err(_) => FileConfig::default(),
    }
}

async fn write_file_config(path: &Path, config: &FileConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Default location of `config.json`, relative to the process's working
/// directory unless overridden on the command line.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.json")
}
