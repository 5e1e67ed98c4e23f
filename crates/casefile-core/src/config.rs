//! Configuration module
//!
//! Environment-driven configuration for the API process and its in-process
//! worker pool. The scanner on/off decision is an explicit config value
//! handed to the orchestrator at construction time; nothing in the pipeline
//! consults ambient process state for it.

use std::env;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Object storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    Local,
    S3,
}

impl StorageBackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(StorageBackendKind::Local),
            "s3" => Some(StorageBackendKind::S3),
            _ => None,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    // Database
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Storage
    pub storage_backend: StorageBackendKind,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    /// Base64-encoded 32-byte key; when set, uploads are encrypted at rest.
    pub encryption_key: Option<String>,
    // Upload limits
    pub max_file_size_bytes: usize,
    // Scanner (clamd)
    pub scanner_enabled: bool,
    pub clamd_host: String,
    pub clamd_port: u16,
    pub clamd_scan_timeout_secs: u64,
    pub clamd_ping_timeout_secs: u64,
    // Worker pool
    pub worker_max_jobs: usize,
    pub worker_poll_interval_ms: u64,
    // Rescan of failed scans
    pub rescan_interval_secs: u64,
    pub rescan_batch_size: i64,
    // Status push channel
    pub heartbeat_interval_secs: u64,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_FILE_SIZE_MB: usize = 50;
        const CLAMD_PORT: u16 = 3310;
        const CLAMD_SCAN_TIMEOUT_SECS: u64 = 60;
        const CLAMD_PING_TIMEOUT_SECS: u64 = 5;
        const WORKER_MAX_JOBS: usize = 4;
        const WORKER_POLL_INTERVAL_MS: u64 = 1000;
        const RESCAN_INTERVAL_SECS: u64 = 60;
        const RESCAN_BATCH_SIZE: i64 = 10;
        const HEARTBEAT_INTERVAL_SECS: u64 = 15;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let storage_backend_str =
            env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string());
        let storage_backend = StorageBackendKind::parse(&storage_backend_str).ok_or_else(|| {
            anyhow::anyhow!(
                "STORAGE_BACKEND must be 'local' or 's3', got '{}'",
                storage_backend_str
            )
        })?;

        let max_file_size_mb = env::var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| MAX_FILE_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_FILE_SIZE_MB);

        Ok(Config {
            environment,
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            encryption_key: env::var("ENCRYPTION_KEY").ok(),
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            scanner_enabled: env::var("CLAMD_ENABLED")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
            clamd_host: env::var("CLAMD_HOST").unwrap_or_else(|_| "localhost".to_string()),
            clamd_port: env::var("CLAMD_PORT")
                .unwrap_or_else(|_| CLAMD_PORT.to_string())
                .parse()
                .unwrap_or(CLAMD_PORT),
            clamd_scan_timeout_secs: env::var("CLAMD_SCAN_TIMEOUT_SECS")
                .unwrap_or_else(|_| CLAMD_SCAN_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CLAMD_SCAN_TIMEOUT_SECS),
            clamd_ping_timeout_secs: env::var("CLAMD_PING_TIMEOUT_SECS")
                .unwrap_or_else(|_| CLAMD_PING_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CLAMD_PING_TIMEOUT_SECS),
            worker_max_jobs: env::var("WORKER_MAX_JOBS")
                .unwrap_or_else(|_| WORKER_MAX_JOBS.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_JOBS),
            worker_poll_interval_ms: env::var("WORKER_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| WORKER_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(WORKER_POLL_INTERVAL_MS),
            rescan_interval_secs: env::var("RESCAN_INTERVAL_SECS")
                .unwrap_or_else(|_| RESCAN_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(RESCAN_INTERVAL_SECS),
            rescan_batch_size: env::var("RESCAN_BATCH_SIZE")
                .unwrap_or_else(|_| RESCAN_BATCH_SIZE.to_string())
                .parse()
                .unwrap_or(RESCAN_BATCH_SIZE),
            heartbeat_interval_secs: env::var("HEARTBEAT_INTERVAL_SECS")
                .unwrap_or_else(|_| HEARTBEAT_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(HEARTBEAT_INTERVAL_SECS),
        })
    }

    /// Validate the loaded configuration. Fails fast on combinations that
    /// would only surface as runtime errors much later.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.database_url.trim().is_empty() {
            return Err(anyhow::anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.is_production() && self.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        match self.storage_backend {
            StorageBackendKind::S3 => {
                if self.s3_bucket.is_none() || self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET and S3_REGION must be set when STORAGE_BACKEND=s3"
                    ));
                }
            }
            StorageBackendKind::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when STORAGE_BACKEND=local"
                    ));
                }
            }
        }

        if self.scanner_enabled && self.clamd_host.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "CLAMD_HOST cannot be empty when CLAMD_ENABLED=true"
            ));
        }

        if let Some(ref key) = self.encryption_key {
            let decoded = BASE64
                .decode(key)
                .map_err(|e| anyhow::anyhow!("ENCRYPTION_KEY is not valid base64: {}", e))?;
            if decoded.len() != 32 {
                return Err(anyhow::anyhow!(
                    "ENCRYPTION_KEY must decode to 32 bytes, got {}",
                    decoded.len()
                ));
            }
        }

        if self.worker_max_jobs == 0 {
            return Err(anyhow::anyhow!("WORKER_MAX_JOBS must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            environment: "development".to_string(),
            server_port: 4000,
            cors_origins: vec!["*".to_string()],
            database_url: "postgres://localhost/casefile".to_string(),
            db_max_connections: 20,
            db_timeout_seconds: 30,
            storage_backend: StorageBackendKind::Local,
            local_storage_path: Some("/tmp/casefile".to_string()),
            local_storage_base_url: Some("http://localhost:4000/files".to_string()),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            encryption_key: None,
            max_file_size_bytes: 50 * 1024 * 1024,
            scanner_enabled: false,
            clamd_host: "localhost".to_string(),
            clamd_port: 3310,
            clamd_scan_timeout_secs: 60,
            clamd_ping_timeout_secs: 5,
            worker_max_jobs: 4,
            worker_poll_interval_ms: 1000,
            rescan_interval_secs: 60,
            rescan_batch_size: 10,
            heartbeat_interval_secs: 15,
        }
    }

    #[test]
    fn valid_local_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn s3_backend_requires_bucket_and_region() {
        let mut config = base_config();
        config.storage_backend = StorageBackendKind::S3;
        assert!(config.validate().is_err());

        config.s3_bucket = Some("uploads".to_string());
        config.s3_region = Some("us-east-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn wildcard_cors_rejected_in_production() {
        let mut config = base_config();
        config.environment = "production".to_string();
        assert!(config.validate().is_err());

        config.cors_origins = vec!["https://cases.example.org".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn encryption_key_must_be_32_bytes() {
        let mut config = base_config();
        config.encryption_key = Some(BASE64.encode([0u8; 16]));
        assert!(config.validate().is_err());

        config.encryption_key = Some(BASE64.encode([0u8; 32]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn storage_backend_parses() {
        assert_eq!(
            StorageBackendKind::parse("S3"),
            Some(StorageBackendKind::S3)
        );
        assert_eq!(
            StorageBackendKind::parse("local"),
            Some(StorageBackendKind::Local)
        );
        assert_eq!(StorageBackendKind::parse("nfs"), None);
    }
}
