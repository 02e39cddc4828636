/// Configuration management for Media Lounge
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "media_lounge=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub verification: VerificationConfig,
    pub email: Option<EmailConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL clients use to reach this server
    pub public_url: String,
    pub upload_limit: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub store: StoreConfig,
}

/// Object store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    Memory,
    Disk {
        location: PathBuf,
        tmp_location: PathBuf,
    },
    Sqlite {
        path: PathBuf,
    },
    Remote {
        base_url: String,
        token: Option<String>,
    },
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// Session token lifetime in seconds
    pub token_ttl: u64,
}

/// Signup verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Code lifetime in seconds
    pub code_ttl: u64,
    /// Seconds between expired-code sweeps
    pub sweep_interval: u64,
    /// Return the code in the send-code response (demo deployments only)
    pub expose_code: bool,
    /// Shared code cache; process memory when absent
    pub redis_url: Option<String>,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub global_requests_per_minute: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("LOUNGE_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("LOUNGE_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("LOUNGE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        let upload_limit = env_or("LOUNGE_UPLOAD_LIMIT", 50 * 1024 * 1024);

        let data_directory: PathBuf = env::var("LOUNGE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();

        let store = match env::var("LOUNGE_STORE")
            .unwrap_or_else(|_| "disk".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreConfig::Memory,
            "disk" => StoreConfig::Disk {
                location: env::var("LOUNGE_STORE_DISK_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("objects")),
                tmp_location: env::var("LOUNGE_STORE_DISK_TMP_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("tmp")),
            },
            "sqlite" => StoreConfig::Sqlite {
                path: env::var("LOUNGE_STORE_SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("objects.sqlite")),
            },
            "remote" => StoreConfig::Remote {
                base_url: env::var("LOUNGE_STORE_REMOTE_URL").map_err(|_| {
                    AppError::Validation("Remote store URL required".to_string())
                })?,
                token: env::var("LOUNGE_STORE_REMOTE_TOKEN").ok(),
            },
            other => {
                return Err(AppError::Validation(format!(
                    "Unknown store backend: {}",
                    other
                )))
            }
        };

        let jwt_secret = env::var("LOUNGE_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;
        let token_ttl = env_or("LOUNGE_TOKEN_TTL", 30 * 24 * 60 * 60);

        let verification = VerificationConfig {
            code_ttl: env_or("LOUNGE_VERIFICATION_TTL", 600),
            sweep_interval: env_or("LOUNGE_VERIFICATION_SWEEP_INTERVAL", 300),
            expose_code: env_or("LOUNGE_VERIFICATION_EXPOSE_CODE", false),
            redis_url: env::var("LOUNGE_REDIS_URL").ok(),
        };

        let email = if let Ok(smtp_url) = env::var("LOUNGE_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("LOUNGE_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| "noreply@localhost".to_string()),
            })
        } else {
            None
        };

        let rate_limit = RateLimitConfig {
            enabled: env_or("LOUNGE_RATE_LIMITS_ENABLED", true),
            global_requests_per_minute: env_or(
                "LOUNGE_RATE_LIMIT_GLOBAL_REQUESTS_PER_MINUTE",
                3000,
            ),
        };

        let logging = LoggingConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            json: env::var("LOUNGE_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                upload_limit,
            },
            storage: StorageConfig {
                data_directory,
                store,
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl,
            },
            verification,
            email,
            rate_limit,
            logging,
        })
    }

    /// Configuration for tests and local tooling: in-memory store, no email
    pub fn for_testing(jwt_secret: &str) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                public_url: "http://localhost:3000".to_string(),
                upload_limit: 10 * 1024 * 1024,
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                store: StoreConfig::Memory,
            },
            authentication: AuthConfig {
                jwt_secret: jwt_secret.to_string(),
                token_ttl: 3600,
            },
            verification: VerificationConfig {
                code_ttl: 600,
                sweep_interval: 300,
                expose_code: true,
                redis_url: None,
            },
            email: None,
            rate_limit: RateLimitConfig {
                enabled: false,
                global_requests_per_minute: 3000,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.verification.code_ttl == 0 || self.verification.sweep_interval == 0 {
            return Err(AppError::Validation(
                "Verification TTL and sweep interval must be positive".to_string(),
            ));
        }

        if self.service.upload_limit == 0 {
            return Err(AppError::Validation("Upload limit must be positive".to_string()));
        }

        Ok(())
    }
}
