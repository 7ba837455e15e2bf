//! Service configuration from environment variables

use std::path::PathBuf;
use std::str::FromStr;

use crate::ApiError;

/// Backend holding rule files and answering runtime commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Files and runtime in memory
    Memory,
    /// Files under `RULES_DIR`, runtime in memory
    Fs,
    /// Files and runtime on the controller at `RUNTIME_URL`
    Http,
}

impl FromStr for StorageKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "fs" => Ok(StorageKind::Fs),
            "http" => Ok(StorageKind::Http),
            other => Err(ApiError::Config(format!("Unknown STORAGE_TYPE '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageKind,
    pub rules_dir: PathBuf,
    pub runtime_url: String,
    /// JSON catalog export loaded at startup
    pub catalog_file: Option<PathBuf>,
    pub catalog_cache_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            storage: StorageKind::Memory,
            rules_dir: PathBuf::from("./rules"),
            runtime_url: "http://localhost:3480".to_string(),
            catalog_file: None,
            catalog_cache_size: 256,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            storage: parse(&lookup, "STORAGE_TYPE")?.unwrap_or(defaults.storage),
            rules_dir: lookup("RULES_DIR").map(PathBuf::from).unwrap_or(defaults.rules_dir),
            runtime_url: lookup("RUNTIME_URL").unwrap_or(defaults.runtime_url),
            catalog_file: lookup("CATALOG_FILE").map(PathBuf::from),
            catalog_cache_size: parse(&lookup, "CATALOG_CACHE_SIZE")?
                .unwrap_or(defaults.catalog_cache_size),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ApiError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ApiError::Config(format!("Invalid {} '{}'", key, raw)))
        })
        .transpose()
}
