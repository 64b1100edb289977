/// Configuration management for the API server
///
/// Loads configuration from environment variables (and a `.env` file when
/// present) into a type-safe struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `API_PRODUCTION`: enables HSTS (default: false)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for permissive (default: *)
/// - `JWT_SECRET`: Secret key for JWT signing, at least 32 characters (required)
/// - `UPLOAD_DIR`: attachment root directory (default: ./uploads)
/// - `MAX_UPLOAD_BYTES`: request body limit for uploads (default: 10 MiB)
/// - `HUB_AUTH_GRACE_SECS`: time an anonymous socket has to authenticate (default: 10)
/// - `HUB_IDLE_TIMEOUT_SECS`: socket idle timeout (default: 90)
/// - `HUB_PING_INTERVAL_SECS`: server ping interval (default: 30)
/// - `HUB_CHANNEL_CAPACITY`: per-connection outbound queue size (default: 256)
///
/// # Example
///
/// ```no_run
/// use taskhub_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub uploads: UploadConfig,
    pub hub: HubConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Production mode turns on HSTS
    pub production: bool,

    /// Allowed CORS origins; `["*"]` means permissive
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for HS256 signing.
    ///
    /// Must be at least 32 characters. Generate with: `openssl rand -hex 32`
    pub secret: String,
}

/// Attachment storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

/// Realtime socket timing and buffering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub auth_grace_secs: u64,
    pub idle_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub channel_capacity: usize,
}

impl HubConfig {
    pub fn auth_grace(&self) -> Duration {
        Duration::from_secs(self.auth_grace_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            auth_grace_secs: 10,
            idle_timeout_secs: 90,
            ping_interval_secs: 30,
            channel_capacity: 256,
        }
    }
}

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Reads `key`, falling back to `default` when unset, and parses it.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL` or `JWT_SECRET` is missing
    /// - `JWT_SECRET` is shorter than 32 characters
    /// - A numeric or boolean variable doesn't parse
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let cors_origins = parse_origins(&env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()));

        let hub_defaults = HubConfig::default();

        Ok(Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("API_PORT", 8080)?,
                production: env_or("API_PRODUCTION", false)?,
                cors_origins: if cors_origins.is_empty() { vec!["*".to_string()] } else { cors_origins },
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            uploads: UploadConfig {
                dir: env_or("UPLOAD_DIR", PathBuf::from("./uploads"))?,
                max_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            },
            hub: HubConfig {
                auth_grace_secs: env_or("HUB_AUTH_GRACE_SECS", hub_defaults.auth_grace_secs)?,
                idle_timeout_secs: env_or("HUB_IDLE_TIMEOUT_SECS", hub_defaults.idle_timeout_secs)?,
                ping_interval_secs: env_or("HUB_PING_INTERVAL_SECS", hub_defaults.ping_interval_secs)?,
                channel_capacity: env_or("HUB_CHANNEL_CAPACITY", hub_defaults.channel_capacity)?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether CORS should allow any origin
    pub fn cors_permissive(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}
